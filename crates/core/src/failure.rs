// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure-cause taxonomy.
//!
//! Every rejection and every runtime failure in the kernel is expressed
//! as a [`FailureCause`] value: synchronous calls return it in `Err`,
//! asynchronous failures attach it to action history and carry it in
//! failure events. Services never panic across an async boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of a network operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkDirection {
    Sending,
    Receiving,
}

crate::simple_display! {
    NetworkDirection {
        Sending => "sending",
        Receiving => "receiving",
    }
}

/// What kind of network fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFault {
    Timeout,
    Failure,
}

crate::simple_display! {
    NetworkFault {
        Timeout => "timeout",
        Failure => "failure",
    }
}

/// The reason an operation was rejected or an execution failed.
///
/// Job, service, host, and file fields are names, not owning handles,
/// so causes stay cheap to clone and serialize into event payloads and
/// execution history.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    #[error("not enough resources on service {service}")]
    NotEnoughResources {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job: Option<String>,
        service: String,
    },
    #[error("service {service} does not support job {job}")]
    JobTypeNotSupported { job: String, service: String },
    #[error("job {job} was killed")]
    JobKilled { job: String },
    #[error("job {job} exceeded its wall-time")]
    JobTimeout { job: String },
    #[error("service {service} is down")]
    ServiceIsDown { service: String },
    #[error("host {host} failed")]
    HostError { host: String },
    #[error("file {file} not found at {location}")]
    FileNotFound { file: String, location: String },
    #[error("network {fault} while {direction} on {endpoint}")]
    NetworkError {
        direction: NetworkDirection,
        fault: NetworkFault,
        endpoint: String,
    },
    #[error("function {function} is not registered")]
    FunctionNotFound { function: String },
    #[error("not allowed on service {service}: {reason}")]
    NotAllowed { service: String, reason: String },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("dependency {parent} -> {child} would create a cycle")]
    CycleDetected { parent: String, child: String },
    #[error("actions {a} and {b} belong to different jobs")]
    CrossJob { a: String, b: String },
    #[error("fatal failure")]
    FatalFailure,
    #[error("a compute thread has died")]
    ComputeThreadHasDied,
}

impl FailureCause {
    /// Shorthand for an [`FailureCause::InvalidArgument`] cause.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        FailureCause::InvalidArgument { message: message.into() }
    }

    /// A receive timeout on the given endpoint.
    pub fn recv_timeout(endpoint: impl Into<String>) -> Self {
        FailureCause::NetworkError {
            direction: NetworkDirection::Receiving,
            fault: NetworkFault::Timeout,
            endpoint: endpoint.into(),
        }
    }

    /// A send failure on the given endpoint (peer gone).
    pub fn send_failure(endpoint: impl Into<String>) -> Self {
        FailureCause::NetworkError {
            direction: NetworkDirection::Sending,
            fault: NetworkFault::Failure,
            endpoint: endpoint.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FailureCause::NetworkError { fault: NetworkFault::Timeout, .. }
        )
    }

    pub fn while_sending(&self) -> bool {
        matches!(
            self,
            FailureCause::NetworkError { direction: NetworkDirection::Sending, .. }
        )
    }

    pub fn while_receiving(&self) -> bool {
        matches!(
            self,
            FailureCause::NetworkError { direction: NetworkDirection::Receiving, .. }
        )
    }
}

#[cfg(test)]
#[path = "failure_tests.rs"]
mod tests;
