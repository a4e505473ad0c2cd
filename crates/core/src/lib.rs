// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data model for the Gantry simulation kernel: actions, compound
//! jobs, failure causes, events, and service configuration.

pub mod action;
pub mod config;
pub mod event;
pub mod failure;
pub mod file;
pub mod id;
pub mod job;
mod macros;
pub mod parallel;

pub use action::{
    Action, ActionExecution, ActionId, ActionKind, ActionState, CustomFunction, CustomFuture,
};
pub use config::{
    BatchAlgorithm, CachingBehavior, HostSelection, QueueOrdering, ServiceConfig,
};
pub use event::{event_channel, Event, EventKind, EventQueue, EventSender};
pub use failure::{FailureCause, NetworkDirection, NetworkFault};
pub use file::{DataFile, FileLocation};
pub use job::{CompoundJob, JobState};
pub use parallel::ParallelModel;

crate::define_id! {
    /// Unique identifier for a compound job.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Unique identifier for a function invocation.
    pub struct InvocationId("inv-");
}
