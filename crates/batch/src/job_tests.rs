// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gantry_core::{event_channel, CompoundJob, ParallelModel};

fn standard(name: &str) -> BatchJobKind {
    BatchJobKind::Standard(CompoundJob::new(name))
}

#[test]
fn new_batch_job_is_pending() {
    let (notify, _queue) = event_channel();
    let job = BatchJob::new(1, standard("j"), BatchArgs::new(2, 4, 5), 0.0, notify);

    assert_eq!(job.id, 1);
    assert_eq!(job.state, BatchJobState::Pending);
    assert_eq!(job.name(), "j");
    assert!(job.allocated.is_empty());
    assert!(job.wall_deadline.is_none());
    assert!(!job.deadline_passed(1e9));
}

#[test]
fn ram_requirement_is_max_over_actions() {
    let (notify, _queue) = event_channel();
    let compound = CompoundJob::new("j");
    compound
        .add_compute_action("small", 1.0, 1, 1, 512, ParallelModel::default())
        .unwrap();
    compound
        .add_compute_action("large", 1.0, 1, 1, 4096, ParallelModel::default())
        .unwrap();

    let job = BatchJob::new(
        1,
        BatchJobKind::Standard(compound),
        BatchArgs::new(1, 1, 1),
        0.0,
        notify,
    );
    assert_eq!(job.ram_per_node, 4096);
}

#[test]
fn mark_running_sets_deadline_from_wall_time() {
    let (notify, _queue) = event_channel();
    let mut job = BatchJob::new(7, standard("j"), BatchArgs::new(1, 2, 5), 0.0, notify);

    job.mark_running(
        vec![Allocation { host: "h1".into(), num_cores: 2, ram: 0 }],
        10.0,
    );

    assert_eq!(job.state, BatchJobState::Running);
    assert_eq!(job.start_date, Some(10.0));
    assert_eq!(job.wall_deadline, Some(310.0));
    assert!(!job.deadline_passed(309.9));
    assert!(job.deadline_passed(310.0));
}

#[yare::parameterized(
    pending   = { BatchJobState::Pending, false },
    running   = { BatchJobState::Running, false },
    completed = { BatchJobState::Completed, true },
    timed_out = { BatchJobState::TimedOut, true },
    killed    = { BatchJobState::Killed, true },
    failed    = { BatchJobState::Failed, true },
)]
fn terminal_states(state: BatchJobState, expected: bool) {
    assert_eq!(state.is_terminal(), expected);
}
