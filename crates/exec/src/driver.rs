// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compound-job driver: pumps a job's DAG through its allocation.
//!
//! One driver per running job. It dispatches ready actions onto the
//! allocated execution services (within the per-host core/RAM grant),
//! reacts to completions by dispatching newly-ready actions, and ends
//! when the job's terminal state can be derived. The driver reports
//! exactly one [`DriverDone`]; whoever started it decides what event
//! that becomes.

use crate::executor::ExecutorDone;
use crate::service::ActionExecutionService;
use gantry_core::{Action, ActionState, CompoundJob, FailureCause, JobState};
use gantry_sim::{mailbox, request, Address, Mailbox};
use std::collections::HashMap;
use tokio::sync::oneshot;

/// The driver's single exit message.
#[derive(Debug, Clone)]
pub struct DriverDone {
    pub job: CompoundJob,
    pub state: JobState,
    pub cause: Option<FailureCause>,
}

/// One host's slice of the job's allocation.
#[derive(Clone)]
pub struct AllocationSlice {
    pub service: ActionExecutionService,
    pub num_cores: u32,
    pub ram: u64,
}

enum DriverMsg {
    Kill {
        cause: FailureCause,
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running job driver.
#[derive(Clone)]
pub struct JobDriver {
    addr: Address<DriverMsg>,
}

impl JobDriver {
    pub fn spawn(
        job: CompoundJob,
        allocation: Vec<AllocationSlice>,
        notify: Address<DriverDone>,
    ) -> JobDriver {
        let (addr, requests) = mailbox::<DriverMsg>(format!("driver-{}", job.name()));
        tokio::spawn(run(job, allocation, notify, requests));
        JobDriver { addr }
    }

    /// Kill the job: running executors die with `cause`, unstarted
    /// actions are marked killed. Resolves once every executor has
    /// reported. A driver that already finished is a no-op.
    pub async fn kill(&self, cause: FailureCause) {
        let _ = request(&self.addr, |reply| DriverMsg::Kill { cause, reply }).await;
    }
}

struct InFlight {
    slice: usize,
    num_cores: u32,
    ram: u64,
}

async fn run(
    job: CompoundJob,
    allocation: Vec<AllocationSlice>,
    notify: Address<DriverDone>,
    mut requests: Mailbox<DriverMsg>,
) {
    job.set_state(JobState::Running);
    tracing::info!(job = %job.name(), hosts = allocation.len(), "job driver starting");

    let (done_addr, mut dones) = mailbox::<ExecutorDone>(format!("driver-done-{}", job.name()));
    let mut free: Vec<(u32, u64)> =
        allocation.iter().map(|slice| (slice.num_cores, slice.ram)).collect();
    let mut inflight: HashMap<Action, InFlight> = HashMap::new();
    let mut first_cause: Option<FailureCause> = None;

    loop {
        dispatch_ready(&job, &allocation, &mut free, &mut inflight, &done_addr, &mut first_cause)
            .await;

        if inflight.is_empty() {
            if let Some(state) = job.derived_terminal_state() {
                finish(&job, &allocation, state, first_cause, &notify).await;
                return;
            }
        }

        tokio::select! {
            done = dones.recv() => {
                let Some(done) = done else { return };
                release(&mut free, &mut inflight, &done.action);
            }
            message = requests.recv() => {
                let Some(DriverMsg::Kill { cause, reply }) = message else { return };
                tracing::info!(job = %job.name(), cause = %cause, "job driver killing");
                for slice in &allocation {
                    let _ = slice.service.terminate_job(job.clone(), cause.clone()).await;
                }
                job.mark_unstarted_actions(ActionState::Killed);
                while !inflight.is_empty() {
                    let Some(done) = dones.recv().await else { break };
                    release(&mut free, &mut inflight, &done.action);
                }
                first_cause = Some(cause);
                let state = job.derived_terminal_state().unwrap_or(JobState::Failed);
                // The exit notice goes out before the kill is
                // acknowledged, so a terminator that awaited the kill
                // can rely on the notice being queued.
                finish(&job, &allocation, state, first_cause, &notify).await;
                let _ = reply.send(());
                return;
            }
        }
    }
}

fn release(free: &mut [(u32, u64)], inflight: &mut HashMap<Action, InFlight>, action: &Action) {
    if let Some(entry) = inflight.remove(action) {
        free[entry.slice].0 += entry.num_cores;
        free[entry.slice].1 += entry.ram;
    }
}

/// Dispatch every ready action that fits somewhere, highest priority
/// first, until nothing more fits.
async fn dispatch_ready(
    job: &CompoundJob,
    allocation: &[AllocationSlice],
    free: &mut [(u32, u64)],
    inflight: &mut HashMap<Action, InFlight>,
    done_addr: &Address<ExecutorDone>,
    first_cause: &mut Option<FailureCause>,
) {
    loop {
        let mut dispatched = false;
        for action in job.ready_actions() {
            if inflight.contains_key(&action) {
                continue;
            }
            let min_cores = action.min_num_cores();
            let max_cores = action.max_num_cores();
            let min_ram = action.min_ram();
            let fits_somewhere = allocation
                .iter()
                .any(|slice| slice.num_cores >= min_cores && slice.ram >= min_ram);
            if !fits_somewhere {
                tracing::warn!(
                    job = %job.name(),
                    action = %action.name(),
                    "action cannot fit this allocation"
                );
                let _ = action.mark_unstarted(ActionState::Failed);
                first_cause.get_or_insert(FailureCause::NotEnoughResources {
                    job: Some(job.name()),
                    service: allocation
                        .first()
                        .map(|slice| slice.service.name().to_string())
                        .unwrap_or_default(),
                });
                dispatched = true;
                break;
            }
            let Some(slice_idx) = free
                .iter()
                .position(|(cores, ram)| *cores >= min_cores && *ram >= min_ram)
            else {
                continue;
            };
            let grant_cores = max_cores.min(free[slice_idx].0);
            match allocation[slice_idx]
                .service
                .dispatch(action.clone(), grant_cores, min_ram, done_addr.clone())
                .await
            {
                Ok(()) => {
                    free[slice_idx].0 -= grant_cores;
                    free[slice_idx].1 -= min_ram;
                    inflight.insert(
                        action,
                        InFlight { slice: slice_idx, num_cores: grant_cores, ram: min_ram },
                    );
                    dispatched = true;
                    break;
                }
                Err(cause) => {
                    tracing::warn!(
                        job = %job.name(),
                        action = %action.name(),
                        cause = %cause,
                        "dispatch rejected"
                    );
                    let _ = action.mark_unstarted(ActionState::Failed);
                    first_cause.get_or_insert(cause);
                    dispatched = true;
                    break;
                }
            }
        }
        if !dispatched {
            return;
        }
    }
}

async fn finish(
    job: &CompoundJob,
    allocation: &[AllocationSlice],
    state: JobState,
    cause: Option<FailureCause>,
    notify: &Address<DriverDone>,
) {
    for slice in allocation {
        let _ = slice.service.release_job(job.clone()).await;
    }
    job.set_state(state);
    let cause = cause.or_else(|| job.first_failure_cause());
    tracing::info!(job = %job.name(), state = %state, "job driver finished");
    let _ = notify.send(DriverDone { job: job.clone(), state, cause });
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
