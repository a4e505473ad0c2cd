// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pilot jobs: a reserved container the submitter fills later.
//!
//! When the batch scheduler starts a pilot, it binds one action
//! execution service per allocated host and the pilot becomes a small
//! actor of its own: compound jobs injected through the handle run on
//! those services and report as ordinary standard-job events. On
//! expiry or termination the hosted jobs are killed with `JobKilled`
//! and their failure events are flushed before the shutdown completes,
//! so `PilotJobExpired` always trails them.

use gantry_core::{CompoundJob, Event, EventSender, FailureCause, JobState};
use gantry_exec::{AllocationSlice, DriverDone, JobDriver};
use gantry_sim::{mailbox, request, Address, Mailbox, SimClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Pilot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotState {
    Pending,
    Running,
    Expired,
}

gantry_core::simple_display! {
    PilotState {
        Pending => "pending",
        Running => "running",
        Expired => "expired",
    }
}

enum PilotMsg {
    Submit {
        job: CompoundJob,
    },
    Shutdown {
        cause: FailureCause,
        reply: oneshot::Sender<()>,
    },
}

struct PilotShared {
    state: PilotState,
    addr: Option<Address<PilotMsg>>,
}

/// Handle to a pilot job. Cheap to clone; usable for submission once
/// the `PilotJobStarted` event arrives.
#[derive(Clone)]
pub struct PilotJob {
    name: String,
    shared: Arc<Mutex<PilotShared>>,
}

impl PilotJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Mutex::new(PilotShared {
                state: PilotState::Pending,
                addr: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PilotState {
        self.shared.lock().state
    }

    /// Batch-service surface: the reservation is live.
    pub(crate) fn activate(
        &self,
        services: Vec<AllocationSlice>,
        notify: EventSender,
        clock: SimClock,
    ) {
        let (addr, requests) = mailbox::<PilotMsg>(format!("pilot-{}", self.name));
        let actor = PilotActor {
            name: self.name.clone(),
            clock,
            services,
            notify,
            active: HashMap::new(),
        };
        tokio::spawn(actor.run(requests));
        let mut shared = self.shared.lock();
        shared.state = PilotState::Running;
        shared.addr = Some(addr);
    }

    /// Inject a compound job into the reservation. Outcomes arrive as
    /// `StandardJobCompleted` / `StandardJobFailed` events.
    pub fn submit_job(&self, job: CompoundJob) -> Result<(), FailureCause> {
        let shared = self.shared.lock();
        if shared.state != PilotState::Running {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: format!("pilot is {}", shared.state),
            });
        }
        let Some(addr) = &shared.addr else {
            return Err(FailureCause::ServiceIsDown { service: self.name.clone() });
        };
        job.set_state(JobState::Submitted);
        addr.send(PilotMsg::Submit { job })
            .map_err(|_| FailureCause::ServiceIsDown { service: self.name.clone() })
    }

    /// Batch-service surface: kill hosted jobs (their failure events
    /// are delivered before this resolves) and stop the services.
    pub(crate) async fn shutdown(&self, cause: FailureCause) {
        let addr = {
            let mut shared = self.shared.lock();
            if shared.state == PilotState::Expired {
                return;
            }
            shared.state = PilotState::Expired;
            shared.addr.take()
        };
        let Some(addr) = addr else { return };
        tracing::info!(pilot = %self.name, cause = %cause, "pilot shutting down");
        let _ = request(&addr, |reply| PilotMsg::Shutdown { cause, reply }).await;
    }
}

impl std::fmt::Debug for PilotJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PilotJob")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

struct PilotActor {
    name: String,
    clock: SimClock,
    services: Vec<AllocationSlice>,
    notify: EventSender,
    active: HashMap<CompoundJob, JobDriver>,
}

impl PilotActor {
    async fn run(mut self, mut requests: Mailbox<PilotMsg>) {
        let (done_addr, mut dones) = mailbox::<DriverDone>(format!("pilot-{}-done", self.name));
        loop {
            tokio::select! {
                message = requests.recv() => match message {
                    None => break,
                    Some(PilotMsg::Submit { job }) => {
                        tracing::info!(pilot = %self.name, job = %job.name(), "job injected");
                        let driver =
                            JobDriver::spawn(job.clone(), self.services.clone(), done_addr.clone());
                        self.active.insert(job, driver);
                    }
                    Some(PilotMsg::Shutdown { cause, reply }) => {
                        for driver in self.active.values() {
                            driver.kill(cause.clone()).await;
                        }
                        // Killed drivers queued their exit notices
                        // before acknowledging: flush them all.
                        while !self.active.is_empty() {
                            let Some(done) = dones.recv().await else { break };
                            self.on_done(done);
                        }
                        for slice in &self.services {
                            let _ = slice.service.stop().await;
                        }
                        let _ = reply.send(());
                        break;
                    }
                },
                done = dones.recv() => match done {
                    None => break,
                    Some(done) => self.on_done(done),
                },
            }
        }
    }

    fn on_done(&mut self, done: DriverDone) {
        if self.active.remove(&done.job).is_none() {
            return;
        }
        let now = self.clock.now();
        let event = match done.state {
            JobState::Completed => Event::StandardJobCompleted { job: done.job, date: now },
            _ => Event::StandardJobFailed {
                job: done.job,
                cause: done.cause.unwrap_or(FailureCause::FatalFailure),
                date: now,
            },
        };
        self.notify.send(event);
    }
}

#[cfg(test)]
#[path = "pilot_tests.rs"]
mod tests;
