// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service configuration.
//!
//! Services are configured with keyed string properties. Parsing is
//! strict: unknown keys and malformed values are both rejected with
//! `InvalidArgument` before the service starts.

use crate::FailureCause;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Batch dispatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchAlgorithm {
    Fcfs,
    Filler,
    EasyBackfill,
    ConservativeBackfill,
}

crate::simple_display! {
    BatchAlgorithm {
        Fcfs => "fcfs",
        Filler => "filler",
        EasyBackfill => "easy-backfill",
        ConservativeBackfill => "conservative-backfill",
    }
}

impl FromStr for BatchAlgorithm {
    type Err = FailureCause;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fcfs" => Ok(BatchAlgorithm::Fcfs),
            "filler" => Ok(BatchAlgorithm::Filler),
            "easy-backfill" => Ok(BatchAlgorithm::EasyBackfill),
            "conservative-backfill" => Ok(BatchAlgorithm::ConservativeBackfill),
            other => Err(FailureCause::invalid_argument(format!(
                "unknown batch scheduling algorithm: {other}"
            ))),
        }
    }
}

/// Pending-queue ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOrdering {
    Fcfs,
    Priority,
}

crate::simple_display! {
    QueueOrdering {
        Fcfs => "fcfs",
        Priority => "priority",
    }
}

impl FromStr for QueueOrdering {
    type Err = FailureCause;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fcfs" => Ok(QueueOrdering::Fcfs),
            "priority" => Ok(QueueOrdering::Priority),
            other => Err(FailureCause::invalid_argument(format!(
                "unknown queue ordering: {other}"
            ))),
        }
    }
}

/// Host pick within a job's allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostSelection {
    FirstFit,
    BestFit,
    RoundRobin,
}

crate::simple_display! {
    HostSelection {
        FirstFit => "FIRSTFIT",
        BestFit => "BESTFIT",
        RoundRobin => "ROUNDROBIN",
    }
}

impl FromStr for HostSelection {
    type Err = FailureCause;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIRSTFIT" => Ok(HostSelection::FirstFit),
            "BESTFIT" => Ok(HostSelection::BestFit),
            "ROUNDROBIN" => Ok(HostSelection::RoundRobin),
            other => Err(FailureCause::invalid_argument(format!(
                "unknown host selection algorithm: {other}"
            ))),
        }
    }
}

/// Node-storage eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CachingBehavior {
    Lru,
    None,
}

crate::simple_display! {
    CachingBehavior {
        Lru => "LRU",
        None => "NONE",
    }
}

impl FromStr for CachingBehavior {
    type Err = FailureCause;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LRU" => Ok(CachingBehavior::Lru),
            "NONE" => Ok(CachingBehavior::None),
            other => Err(FailureCause::invalid_argument(format!(
                "unknown caching behavior: {other}"
            ))),
        }
    }
}

/// Typed view of a service property table.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub batch_scheduling_algorithm: BatchAlgorithm,
    pub batch_queue_ordering: QueueOrdering,
    pub host_selection_algorithm: HostSelection,
    pub thread_startup_overhead: f64,
    pub simulate_computation_as_sleep: bool,
    pub container_startup_overhead: f64,
    pub caching_behavior: CachingBehavior,
    pub scratch_space_buffer_size: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            batch_scheduling_algorithm: BatchAlgorithm::Fcfs,
            batch_queue_ordering: QueueOrdering::Fcfs,
            host_selection_algorithm: HostSelection::FirstFit,
            thread_startup_overhead: 0.0,
            simulate_computation_as_sleep: true,
            container_startup_overhead: 0.0,
            caching_behavior: CachingBehavior::Lru,
            scratch_space_buffer_size: 0,
        }
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<f64, FailureCause> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| FailureCause::invalid_argument(format!("{key}: not a number: {value:?}")))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(FailureCause::invalid_argument(format!(
            "{key}: must be a non-negative number of seconds, got {value:?}"
        )));
    }
    Ok(parsed)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, FailureCause> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(FailureCause::invalid_argument(format!(
            "{key}: expected true or false, got {other:?}"
        ))),
    }
}

impl ServiceConfig {
    /// Parse a property table, starting from defaults.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, FailureCause> {
        let mut config = ServiceConfig::default();
        for (key, value) in properties {
            match key.as_str() {
                "BATCH_SCHEDULING_ALGORITHM" => {
                    config.batch_scheduling_algorithm = value.parse()?;
                }
                "BATCH_QUEUE_ORDERING_ALGORITHM" => {
                    config.batch_queue_ordering = value.parse()?;
                }
                "HOST_SELECTION_ALGORITHM" => {
                    config.host_selection_algorithm = value.parse()?;
                }
                "THREAD_STARTUP_OVERHEAD" => {
                    config.thread_startup_overhead = parse_seconds(key, value)?;
                }
                "SIMULATE_COMPUTATION_AS_SLEEP" => {
                    config.simulate_computation_as_sleep = parse_bool(key, value)?;
                }
                "CONTAINER_STARTUP_OVERHEAD" => {
                    config.container_startup_overhead = parse_seconds(key, value)?;
                }
                "CACHING_BEHAVIOR" => {
                    config.caching_behavior = value.parse()?;
                }
                "SCRATCH_SPACE_BUFFER_SIZE" => {
                    config.scratch_space_buffer_size = value.parse().map_err(|_| {
                        FailureCause::invalid_argument(format!(
                            "{key}: not a byte count: {value:?}"
                        ))
                    })?;
                }
                other => {
                    return Err(FailureCause::invalid_argument(format!(
                        "unknown configuration key: {other}"
                    )));
                }
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
