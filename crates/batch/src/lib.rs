// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch scheduling: queued jobs with wall-times dispatched onto
//! cluster hosts under FCFS, filler, or backfilling policies.

pub mod args;
pub mod job;
pub mod pilot;
pub mod schedule;
pub mod select;
pub mod service;

pub use args::BatchArgs;
pub use job::{Allocation, BatchJob, BatchJobKind, BatchJobState};
pub use pilot::{PilotJob, PilotState};
pub use schedule::{DispatchPolicy, FutureRelease, NativePolicy, PlanInput, Projection, QueuedJob};
pub use select::{select_hosts, RoundRobinPointer};
pub use service::{BatchResources, BatchScheduler, BatchSpec};
