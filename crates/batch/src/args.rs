// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch submission arguments.
//!
//! Every batch job is submitted with `-N` (nodes), `-c` (cores per
//! node), and `-t` (wall-time in minutes). Absent or malformed values
//! are rejected before the job enters any queue.

use gantry_core::FailureCause;
use std::collections::HashMap;

/// Parsed and validated batch geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchArgs {
    pub num_nodes: u32,
    pub cores_per_node: u32,
    /// Wall-time in minutes, as submitted.
    pub wall_time_minutes: u64,
}

impl BatchArgs {
    pub fn new(num_nodes: u32, cores_per_node: u32, wall_time_minutes: u64) -> Self {
        Self { num_nodes, cores_per_node, wall_time_minutes }
    }

    /// Parse the `-N`/`-c`/`-t` mapping.
    pub fn parse(args: &HashMap<String, String>) -> Result<Self, FailureCause> {
        for key in args.keys() {
            if !matches!(key.as_str(), "-N" | "-c" | "-t") {
                return Err(FailureCause::invalid_argument(format!(
                    "unknown batch argument: {key}"
                )));
            }
        }
        Ok(Self {
            num_nodes: positive(args, "-N")? as u32,
            cores_per_node: positive(args, "-c")? as u32,
            wall_time_minutes: positive(args, "-t")?,
        })
    }

    /// The wall-time in simulated seconds.
    pub fn wall_time_seconds(&self) -> f64 {
        self.wall_time_minutes as f64 * 60.0
    }
}

fn positive(args: &HashMap<String, String>, key: &str) -> Result<u64, FailureCause> {
    let value = args.get(key).ok_or_else(|| {
        FailureCause::invalid_argument(format!("missing required batch argument {key}"))
    })?;
    let parsed: u64 = value.parse().map_err(|_| {
        FailureCause::invalid_argument(format!("invalid {key} value {value:?}"))
    })?;
    if parsed == 0 {
        return Err(FailureCause::invalid_argument(format!(
            "{key} must be a positive integer, got {value:?}"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
