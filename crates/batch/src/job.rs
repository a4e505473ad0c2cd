// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch jobs: a compound or pilot job wrapped with batch geometry.

use crate::args::BatchArgs;
use crate::pilot::PilotJob;
use gantry_core::{CompoundJob, EventSender};
use serde::Serialize;

/// Lifecycle of a batch job inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobState {
    Pending,
    Running,
    Completed,
    TimedOut,
    Killed,
    Failed,
}

impl BatchJobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchJobState::Pending | BatchJobState::Running)
    }
}

gantry_core::simple_display! {
    BatchJobState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        TimedOut => "timed_out",
        Killed => "killed",
        Failed => "failed",
    }
}

/// What was submitted.
#[derive(Clone)]
pub enum BatchJobKind {
    Standard(CompoundJob),
    Pilot(PilotJob),
}

impl BatchJobKind {
    pub fn name(&self) -> String {
        match self {
            BatchJobKind::Standard(job) => job.name(),
            BatchJobKind::Pilot(pilot) => pilot.name().to_string(),
        }
    }

    pub fn is_pilot(&self) -> bool {
        matches!(self, BatchJobKind::Pilot(_))
    }
}

/// One host's share of a batch allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub host: String,
    pub num_cores: u32,
    pub ram: u64,
}

/// A queued or running batch job. The job id is a per-service sequence
/// number seeded at service construction.
pub struct BatchJob {
    pub id: u64,
    pub kind: BatchJobKind,
    pub args: BatchArgs,
    /// Per-node RAM requirement, derived from the job's actions.
    pub ram_per_node: u64,
    pub arrival_date: f64,
    pub priority: f64,
    pub state: BatchJobState,
    pub allocated: Vec<Allocation>,
    pub start_date: Option<f64>,
    /// `start + wall-time`, set at dispatch.
    pub wall_deadline: Option<f64>,
    /// Where this job's events go.
    pub notify: EventSender,
}

impl BatchJob {
    pub fn new(
        id: u64,
        kind: BatchJobKind,
        args: BatchArgs,
        arrival_date: f64,
        notify: EventSender,
    ) -> Self {
        let ram_per_node = match &kind {
            BatchJobKind::Standard(job) => {
                job.actions().iter().map(|a| a.min_ram()).max().unwrap_or(0)
            }
            BatchJobKind::Pilot(_) => 0,
        };
        let priority = match &kind {
            BatchJobKind::Standard(job) => job.priority(),
            BatchJobKind::Pilot(_) => 0.0,
        };
        Self {
            id,
            kind,
            args,
            ram_per_node,
            arrival_date,
            priority,
            state: BatchJobState::Pending,
            allocated: Vec::new(),
            start_date: None,
            wall_deadline: None,
            notify,
        }
    }

    pub fn name(&self) -> String {
        self.kind.name()
    }

    /// Record dispatch: allocation, start date, wall deadline.
    pub fn mark_running(&mut self, allocated: Vec<Allocation>, now: f64) {
        self.state = BatchJobState::Running;
        self.allocated = allocated;
        self.start_date = Some(now);
        self.wall_deadline = Some(now + self.args.wall_time_seconds());
    }

    pub fn deadline_passed(&self, now: f64) -> bool {
        self.wall_deadline.is_some_and(|deadline| deadline <= now)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
