// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ActionState;
use proptest::prelude::*;

fn run_to(action: &Action, state: ActionState, now: f64) {
    action.begin_execution("h1", "h1", 1, 0, now).unwrap();
    action.finish_execution(state, None, now + 1.0).unwrap();
}

#[test]
fn new_job_is_not_submitted() {
    let job = CompoundJob::new("analysis");
    assert_eq!(job.name(), "analysis");
    assert_eq!(job.state(), JobState::NotSubmitted);
    assert_eq!(job.priority(), 0.0);
    assert_eq!(job.num_actions(), 0);
    assert!(job.id().as_str().starts_with("job-"));
}

#[test]
fn duplicate_action_names_are_rejected() {
    let job = CompoundJob::new("j");
    job.add_sleep_action("a", 1.0).unwrap();
    let err = job.add_sleep_action("a", 2.0).unwrap_err();
    assert!(matches!(err, FailureCause::InvalidArgument { .. }));
}

#[test]
fn empty_action_name_is_rejected() {
    let job = CompoundJob::new("j");
    assert!(job.add_sleep_action("", 1.0).is_err());
}

#[test]
fn action_lookup_by_name() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    assert_eq!(job.action_by_name("a"), Some(a));
    assert_eq!(job.action_by_name("missing"), None);
}

#[test]
fn compute_action_validates_core_range() {
    let job = CompoundJob::new("j");
    assert!(job
        .add_compute_action("bad", 1.0, 4, 2, 0, ParallelModel::default())
        .is_err());
    assert!(job
        .add_compute_action("bad2", 1.0, 0, 2, 0, ParallelModel::default())
        .is_err());
    assert!(job
        .add_compute_action("bad3", -1.0, 1, 2, 0, ParallelModel::default())
        .is_err());
}

#[test]
fn dependency_rejects_cycles() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    let b = job.add_sleep_action("b", 1.0).unwrap();
    let c = job.add_sleep_action("c", 1.0).unwrap();
    job.add_dependency(&a, &b).unwrap();
    job.add_dependency(&b, &c).unwrap();

    let err = job.add_dependency(&c, &a).unwrap_err();
    assert!(matches!(err, FailureCause::CycleDetected { .. }));

    let err = job.add_dependency(&a, &a).unwrap_err();
    assert!(matches!(err, FailureCause::CycleDetected { .. }));
}

#[test]
fn dependency_rejects_cross_job_edges() {
    let job1 = CompoundJob::new("j1");
    let job2 = CompoundJob::new("j2");
    let a = job1.add_sleep_action("a", 1.0).unwrap();
    let b = job2.add_sleep_action("b", 1.0).unwrap();

    let err = job1.add_dependency(&a, &b).unwrap_err();
    assert!(matches!(err, FailureCause::CrossJob { .. }));
}

#[test]
fn adding_dependency_on_completed_parent_keeps_child_ready() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    let b = job.add_sleep_action("b", 1.0).unwrap();

    run_to(&a, ActionState::Completed, 0.0);
    job.add_dependency(&a, &b).unwrap();
    assert_eq!(b.state(), ActionState::Ready);
}

#[test]
fn ready_actions_sorted_by_priority() {
    let job = CompoundJob::new("j");
    let low = job.add_sleep_action("low", 1.0).unwrap();
    let high = job.add_sleep_action("high", 1.0).unwrap();
    let mid = job.add_sleep_action("mid", 1.0).unwrap();
    low.set_priority(1.0);
    high.set_priority(10.0);
    mid.set_priority(5.0);

    let names: Vec<String> = job.ready_actions().iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["high", "mid", "low"]);
}

#[test]
fn ready_actions_excludes_blocked_and_terminal() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    let b = job.add_sleep_action("b", 1.0).unwrap();
    job.add_dependency(&a, &b).unwrap();
    let done = job.add_sleep_action("done", 1.0).unwrap();
    run_to(&done, ActionState::Completed, 0.0);

    let ready = job.ready_actions();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0], a);
}

#[test]
fn derived_state_none_while_progress_possible() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    let b = job.add_sleep_action("b", 1.0).unwrap();
    job.add_dependency(&a, &b).unwrap();

    assert_eq!(job.derived_terminal_state(), None);
    a.begin_execution("h1", "h1", 1, 0, 0.0).unwrap();
    assert_eq!(job.derived_terminal_state(), None);
}

#[test]
fn derived_state_completed_when_all_actions_complete() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    let b = job.add_sleep_action("b", 1.0).unwrap();
    job.add_dependency(&a, &b).unwrap();

    run_to(&a, ActionState::Completed, 0.0);
    run_to(&b, ActionState::Completed, 1.0);
    assert_eq!(job.derived_terminal_state(), Some(JobState::Completed));
}

#[test]
fn derived_state_failed_once_nothing_can_progress() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    let b = job.add_sleep_action("b", 1.0).unwrap();
    job.add_dependency(&a, &b).unwrap();

    a.begin_execution("h1", "h1", 1, 0, 0.0).unwrap();
    a.finish_execution(ActionState::Failed, Some(FailureCause::FatalFailure), 1.0)
        .unwrap();

    // b was doomed by the failure propagation.
    assert_eq!(job.derived_terminal_state(), Some(JobState::Failed));
    assert_eq!(job.first_failure_cause(), Some(FailureCause::FatalFailure));
}

#[test]
fn partial_failure_with_independent_branch_still_progresses() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    let b = job.add_sleep_action("b", 1.0).unwrap();

    a.begin_execution("h1", "h1", 1, 0, 0.0).unwrap();
    a.finish_execution(ActionState::Failed, Some(FailureCause::FatalFailure), 1.0)
        .unwrap();

    // b is independent and still runnable: no terminal state yet.
    assert_eq!(job.derived_terminal_state(), None);
    run_to(&b, ActionState::Completed, 1.0);
    assert_eq!(job.derived_terminal_state(), Some(JobState::Failed));
}

#[test]
fn empty_job_derives_completed() {
    let job = CompoundJob::new("j");
    assert_eq!(job.derived_terminal_state(), Some(JobState::Completed));
}

#[test]
fn mark_unstarted_actions_terminalizes_pending_work() {
    let job = CompoundJob::new("j");
    let a = job.add_sleep_action("a", 1.0).unwrap();
    let b = job.add_sleep_action("b", 1.0).unwrap();
    job.add_dependency(&a, &b).unwrap();

    job.mark_unstarted_actions(ActionState::Killed);
    assert_eq!(a.state(), ActionState::Killed);
    assert_eq!(b.state(), ActionState::Killed);
    assert_eq!(job.derived_terminal_state(), Some(JobState::Failed));
}

#[test]
fn job_handles_share_state() {
    let job = CompoundJob::new("j");
    let clone = job.clone();
    clone.set_state(JobState::Running);
    assert_eq!(job.state(), JobState::Running);
    assert_eq!(job, clone);
}

#[test]
fn distinct_jobs_are_not_equal() {
    assert_ne!(CompoundJob::new("j"), CompoundJob::new("j"));
}

#[yare::parameterized(
    not_submitted = { JobState::NotSubmitted, false },
    submitted     = { JobState::Submitted, false },
    running       = { JobState::Running, false },
    completed     = { JobState::Completed, true },
    failed        = { JobState::Failed, true },
    discontinued  = { JobState::Discontinued, true },
)]
fn job_terminal_states(state: JobState, expected: bool) {
    assert_eq!(state.is_terminal(), expected);
}

fn arb_job_state() -> impl Strategy<Value = JobState> {
    prop_oneof![
        Just(JobState::NotSubmitted),
        Just(JobState::Submitted),
        Just(JobState::Running),
        Just(JobState::Completed),
        Just(JobState::Failed),
        Just(JobState::Discontinued),
    ]
}

proptest! {
    #[test]
    fn job_state_serde_roundtrip(state in arb_job_state()) {
        let json = serde_json::to_string(&state).unwrap();
        let parsed: JobState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(state, parsed);
    }

    /// Random DAG edges: every ready action has only completed parents.
    #[test]
    fn readiness_invariant_holds(edges in proptest::collection::vec((0u32..8, 0u32..8), 0..20)) {
        let job = CompoundJob::new("j");
        let actions: Vec<Action> = (0..8)
            .map(|i| job.add_sleep_action(&format!("a{i}"), 1.0).unwrap())
            .collect();
        for (from, to) in edges {
            // Cycle and self edges are rejected; that is fine here.
            let _ = job.add_dependency(&actions[from as usize], &actions[to as usize]);
        }
        for action in job.actions() {
            if action.state() == ActionState::Ready {
                for parent in action.parents() {
                    prop_assert_eq!(parent.state(), ActionState::Completed);
                }
            }
        }
    }
}
