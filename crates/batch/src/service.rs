// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The batch scheduler actor.
//!
//! One mailbox, one loop. Each wakeup: reap jobs whose wall-deadline
//! passed (reaping happens-before any dispatch decision of the tick),
//! handle the drained messages, then run one scheduling pass that
//! dispatches while the configured policy admits the next candidate.

use crate::args::BatchArgs;
use crate::job::{Allocation, BatchJob, BatchJobKind, BatchJobState};
use crate::pilot::PilotJob;
use crate::schedule::{DispatchPolicy, FutureRelease, NativePolicy, PlanInput, QueuedJob};
use crate::select::{select_hosts, RoundRobinPointer};
use gantry_core::{
    CompoundJob, Event, EventSender, FailureCause, JobState, QueueOrdering, ServiceConfig,
};
use gantry_exec::{ActionExecutionService, AesSpec, AllocationSlice, DriverDone, JobDriver};
use gantry_sim::{
    mailbox, request, Address, Alarm, ExecutionHost, FileRegistry, Mailbox, SimClock,
    StorageDirectory,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Construction parameters for a batch scheduler.
pub struct BatchSpec {
    pub name: String,
    pub hosts: Vec<Arc<ExecutionHost>>,
    pub config: ServiceConfig,
    pub storages: StorageDirectory,
    pub registry: Option<FileRegistry>,
    /// External scheduler adapter; the native policy runs when absent.
    pub policy: Option<Box<dyn DispatchPolicy>>,
    pub supports_standard_jobs: bool,
    pub supports_pilot_jobs: bool,
}

impl BatchSpec {
    pub fn new(hosts: Vec<Arc<ExecutionHost>>) -> Self {
        Self {
            name: "batch".into(),
            hosts,
            config: ServiceConfig::default(),
            storages: StorageDirectory::new(),
            registry: None,
            policy: None,
            supports_standard_jobs: true,
            supports_pilot_jobs: true,
        }
    }

    gantry_core::setters! {
        into {
            name: String,
        }
        set {
            config: ServiceConfig,
            storages: StorageDirectory,
            supports_standard_jobs: bool,
            supports_pilot_jobs: bool,
        }
        option {
            registry: FileRegistry,
            policy: Box<dyn DispatchPolicy>,
        }
    }
}

/// Resource-information snapshot.
#[derive(Debug, Clone)]
pub struct BatchResources {
    pub num_hosts: u32,
    pub cores_per_host: u32,
    pub ram_per_host: u64,
    pub free_cores: Vec<(String, u32)>,
    pub num_pending: usize,
    pub num_running: usize,
}

enum BatchMsg {
    SubmitStandard {
        job: CompoundJob,
        args: HashMap<String, String>,
        notify: EventSender,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    SubmitPilot {
        pilot: PilotJob,
        args: HashMap<String, String>,
        notify: EventSender,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    TerminateStandard {
        job: CompoundJob,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    TerminatePilot {
        pilot: PilotJob,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    Resources {
        reply: oneshot::Sender<BatchResources>,
    },
    WallTimeAlarm {
        id: u64,
    },
    DriverDone(DriverDone),
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running batch scheduler.
#[derive(Clone)]
pub struct BatchScheduler {
    addr: Address<BatchMsg>,
    name: String,
}

impl BatchScheduler {
    pub fn start(spec: BatchSpec, clock: SimClock) -> Result<Self, FailureCause> {
        if spec.hosts.is_empty() {
            return Err(FailureCause::invalid_argument(
                "a batch scheduler needs at least one host",
            ));
        }
        let name = spec.name.clone();
        let (addr, requests) = mailbox::<BatchMsg>(&name);
        let (driver_addr, mut driver_rx) = mailbox::<DriverDone>(format!("{name}-drivers"));
        {
            let addr = addr.clone();
            tokio::spawn(async move {
                while let Some(done) = driver_rx.recv().await {
                    if addr.send(BatchMsg::DriverDone(done)).is_err() {
                        break;
                    }
                }
            });
        }
        let policy = spec.policy.unwrap_or_else(|| {
            Box::new(NativePolicy { algorithm: spec.config.batch_scheduling_algorithm })
        });
        let cores_per_host = spec.hosts.iter().map(|h| h.num_cores()).min().unwrap_or(0);
        let ram_per_host = spec.hosts.iter().map(|h| h.ram()).min().unwrap_or(0);
        let free_cores: IndexMap<String, u32> = spec
            .hosts
            .iter()
            .map(|h| (h.name().to_string(), h.num_cores()))
            .collect();
        let actor = BatchActor {
            name: name.clone(),
            clock,
            hosts: spec.hosts,
            cores_per_host,
            ram_per_host,
            free_cores,
            rr: RoundRobinPointer::default(),
            config: spec.config,
            storages: spec.storages,
            registry: spec.registry,
            policy,
            supports_standard_jobs: spec.supports_standard_jobs,
            supports_pilot_jobs: spec.supports_pilot_jobs,
            next_id: 1,
            pending: Vec::new(),
            running: HashMap::new(),
            self_addr: addr.clone(),
            driver_addr,
        };
        tokio::spawn(actor.run(requests));
        Ok(Self { addr, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn down(&self) -> FailureCause {
        FailureCause::ServiceIsDown { service: self.name.clone() }
    }

    /// Submit a standard (compound) job with `-N`/`-c`/`-t` arguments.
    /// Admission errors are returned synchronously; outcomes arrive as
    /// standard-job events on `notify`.
    pub async fn submit(
        &self,
        job: CompoundJob,
        args: &HashMap<String, String>,
        notify: EventSender,
    ) -> Result<(), FailureCause> {
        let args = args.clone();
        request(&self.addr, |reply| BatchMsg::SubmitStandard { job, args, notify, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Submit a pilot job; `PilotJobStarted` arrives when the
    /// reservation is live.
    pub async fn submit_pilot(
        &self,
        pilot: PilotJob,
        args: &HashMap<String, String>,
        notify: EventSender,
    ) -> Result<(), FailureCause> {
        let args = args.clone();
        request(&self.addr, |reply| BatchMsg::SubmitPilot { pilot, args, notify, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Terminate a standard job: pending jobs vanish silently, running
    /// jobs are killed; either way the submitter gets no event.
    pub async fn terminate(&self, job: &CompoundJob) -> Result<(), FailureCause> {
        let job = job.clone();
        request(&self.addr, |reply| BatchMsg::TerminateStandard { job, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Terminate a pilot job; a running pilot kills its hosted jobs
    /// and emits `PilotJobExpired`.
    pub async fn terminate_pilot(&self, pilot: &PilotJob) -> Result<(), FailureCause> {
        let pilot = pilot.clone();
        request(&self.addr, |reply| BatchMsg::TerminatePilot { pilot, reply })
            .await
            .map_err(|_| self.down())?
    }

    pub async fn resources(&self) -> Result<BatchResources, FailureCause> {
        request(&self.addr, |reply| BatchMsg::Resources { reply })
            .await
            .map_err(|_| self.down())
    }

    /// Shut the service down: every pending and running standard job
    /// fails with `JobKilled`, pilots expire, resources are freed.
    pub async fn stop(&self) -> Result<(), FailureCause> {
        request(&self.addr, |reply| BatchMsg::Stop { reply })
            .await
            .map_err(|_| self.down())
    }
}

struct RunningEntry {
    job: BatchJob,
    services: Vec<ActionExecutionService>,
    driver: Option<JobDriver>,
    alarm: Alarm,
}

struct BatchActor {
    name: String,
    clock: SimClock,
    hosts: Vec<Arc<ExecutionHost>>,
    cores_per_host: u32,
    ram_per_host: u64,
    free_cores: IndexMap<String, u32>,
    rr: RoundRobinPointer,
    config: ServiceConfig,
    storages: StorageDirectory,
    registry: Option<FileRegistry>,
    policy: Box<dyn DispatchPolicy>,
    supports_standard_jobs: bool,
    supports_pilot_jobs: bool,
    next_id: u64,
    pending: Vec<BatchJob>,
    running: HashMap<u64, RunningEntry>,
    self_addr: Address<BatchMsg>,
    driver_addr: Address<DriverDone>,
}

impl BatchActor {
    async fn run(mut self, mut mbox: Mailbox<BatchMsg>) {
        tracing::info!(service = %self.name, hosts = self.hosts.len(), "batch scheduler starting");
        'outer: loop {
            let Some(first) = mbox.recv().await else { break };
            self.reap_expired().await;
            let mut batch = vec![first];
            while let Some(queued) = mbox.try_recv() {
                batch.push(queued);
            }
            for message in batch {
                if let BatchMsg::Stop { reply } = message {
                    self.shutdown().await;
                    let _ = reply.send(());
                    break 'outer;
                }
                self.handle(message).await;
            }
            self.schedule_pass().await;
        }
        tracing::info!(service = %self.name, "batch scheduler terminated");
    }

    async fn handle(&mut self, message: BatchMsg) {
        match message {
            BatchMsg::SubmitStandard { job, args, notify, reply } => {
                let _ = reply.send(self.admit(BatchJobKind::Standard(job), &args, notify));
            }
            BatchMsg::SubmitPilot { pilot, args, notify, reply } => {
                let _ = reply.send(self.admit(BatchJobKind::Pilot(pilot), &args, notify));
            }
            BatchMsg::TerminateStandard { job, reply } => {
                let _ = reply.send(self.terminate_standard(job).await);
            }
            BatchMsg::TerminatePilot { pilot, reply } => {
                let _ = reply.send(self.terminate_pilot(pilot).await);
            }
            BatchMsg::Resources { reply } => {
                let _ = reply.send(BatchResources {
                    num_hosts: self.hosts.len() as u32,
                    cores_per_host: self.cores_per_host,
                    ram_per_host: self.ram_per_host,
                    free_cores: self
                        .free_cores
                        .iter()
                        .map(|(h, c)| (h.clone(), *c))
                        .collect(),
                    num_pending: self.pending.len(),
                    num_running: self.running.len(),
                });
            }
            BatchMsg::WallTimeAlarm { id } => {
                // The reap at the top of the tick did the work.
                tracing::debug!(service = %self.name, id, "wall-time alarm");
            }
            BatchMsg::DriverDone(done) => self.on_driver_done(done).await,
            BatchMsg::Stop { .. } => unreachable!("handled by the main loop"),
        }
    }

    /// Synchronous admission: argument and capacity checks, then the
    /// queue.
    fn admit(
        &mut self,
        kind: BatchJobKind,
        args: &HashMap<String, String>,
        notify: EventSender,
    ) -> Result<(), FailureCause> {
        let parsed = BatchArgs::parse(args)?;
        let name = kind.name();
        match &kind {
            BatchJobKind::Standard(_) if !self.supports_standard_jobs => {
                return Err(FailureCause::JobTypeNotSupported {
                    job: name,
                    service: self.name.clone(),
                });
            }
            BatchJobKind::Pilot(_) if !self.supports_pilot_jobs => {
                return Err(FailureCause::JobTypeNotSupported {
                    job: name,
                    service: self.name.clone(),
                });
            }
            _ => {}
        }
        let id = self.next_id;
        let job = BatchJob::new(id, kind, parsed, self.clock.now(), notify);
        if parsed.num_nodes > self.hosts.len() as u32
            || parsed.cores_per_node > self.cores_per_host
            || job.ram_per_node > self.ram_per_host
        {
            return Err(FailureCause::NotEnoughResources {
                job: Some(name),
                service: self.name.clone(),
            });
        }
        if let BatchJobKind::Standard(compound) = &job.kind {
            compound.set_state(JobState::Submitted);
        }
        self.next_id += 1;
        tracing::info!(
            service = %self.name,
            job = %job.name(),
            id,
            nodes = parsed.num_nodes,
            cores = parsed.cores_per_node,
            minutes = parsed.wall_time_minutes,
            "job queued"
        );
        self.pending.push(job);
        Ok(())
    }

    /// Queue order under the configured ordering.
    fn queue_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.pending.len()).collect();
        if self.config.batch_queue_ordering == QueueOrdering::Priority {
            order.sort_by(|a, b| {
                self.pending[*b]
                    .priority
                    .partial_cmp(&self.pending[*a].priority)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        order
    }

    /// One scheduling pass: plan against the projection, dispatch in
    /// plan order.
    async fn schedule_pass(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let order = self.queue_order();
        let queue: Vec<QueuedJob> = order
            .iter()
            .map(|&idx| {
                let job = &self.pending[idx];
                QueuedJob {
                    id: job.id,
                    num_nodes: job.args.num_nodes,
                    cores_per_node: job.args.cores_per_node,
                    wall_time: job.args.wall_time_seconds(),
                }
            })
            .collect();
        let running: Vec<FutureRelease> = self
            .running
            .values()
            .map(|entry| FutureRelease {
                deadline: entry.job.wall_deadline.unwrap_or(f64::MAX),
                allocation: entry
                    .job
                    .allocated
                    .iter()
                    .map(|a| (a.host.clone(), a.num_cores))
                    .collect(),
            })
            .collect();
        let plan = self.policy.plan(&PlanInput {
            queue: &queue,
            free_cores: &self.free_cores,
            running: &running,
            now: self.clock.now(),
        });
        for id in plan {
            self.dispatch(id).await;
        }
    }

    async fn dispatch(&mut self, id: u64) {
        let Some(idx) = self.pending.iter().position(|j| j.id == id) else { return };
        let (nodes, cores, ram) = {
            let job = &self.pending[idx];
            (job.args.num_nodes, job.args.cores_per_node, job.ram_per_node)
        };
        let Some(allocated) = select_hosts(
            self.config.host_selection_algorithm,
            &mut self.free_cores,
            &mut self.rr,
            nodes,
            cores,
            ram,
        ) else {
            tracing::warn!(service = %self.name, id, "planned job no longer fits");
            return;
        };

        let mut job = self.pending.remove(idx);
        let now = self.clock.now();
        job.mark_running(allocated.clone(), now);
        let deadline = job.wall_deadline.unwrap_or(now);
        tracing::info!(
            service = %self.name,
            job = %job.name(),
            id,
            hosts = allocated.len(),
            deadline,
            "dispatching"
        );

        let slices = self.build_slices(&allocated);
        let services: Vec<ActionExecutionService> =
            slices.iter().map(|s| s.service.clone()).collect();
        let alarm = Alarm::start(
            self.clock,
            deadline,
            self.self_addr.clone(),
            BatchMsg::WallTimeAlarm { id },
        );

        let driver = match &job.kind {
            BatchJobKind::Standard(compound) => {
                Some(JobDriver::spawn(compound.clone(), slices, self.driver_addr.clone()))
            }
            BatchJobKind::Pilot(pilot) => {
                pilot.activate(slices, job.notify.clone(), self.clock);
                job.notify.send(Event::PilotJobStarted {
                    pilot: pilot.name().to_string(),
                    date: now,
                });
                None
            }
        };
        self.running.insert(id, RunningEntry { job, services, driver, alarm });
    }

    /// One action-execution service per allocated host, sized to the
    /// job's per-node grant.
    fn build_slices(&self, allocated: &[Allocation]) -> Vec<AllocationSlice> {
        allocated
            .iter()
            .filter_map(|a| {
                let host = self.hosts.iter().find(|h| h.name() == a.host)?;
                let ram = if a.ram > 0 { a.ram } else { host.ram() };
                let mut spec = AesSpec::new(Arc::clone(host))
                    .num_cores(a.num_cores)
                    .ram(ram)
                    .config(self.config.clone())
                    .storages(self.storages.clone());
                if let Some(registry) = &self.registry {
                    spec = spec.registry(registry.clone());
                }
                let service = ActionExecutionService::start(spec, self.clock);
                Some(AllocationSlice { service, num_cores: a.num_cores, ram })
            })
            .collect()
    }

    fn release(&mut self, job: &BatchJob) {
        for allocation in &job.allocated {
            if let Some(free) = self.free_cores.get_mut(allocation.host.as_str()) {
                *free += allocation.num_cores;
            }
        }
    }

    async fn stop_services(services: &[ActionExecutionService]) {
        for service in services {
            let _ = service.stop().await;
        }
    }

    /// Kill every running job whose wall-deadline has passed.
    async fn reap_expired(&mut self) {
        let now = self.clock.now();
        let expired: Vec<u64> = self
            .running
            .iter()
            .filter(|(_, entry)| entry.job.deadline_passed(now))
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            let Some(mut entry) = self.running.remove(&id) else { continue };
            entry.alarm.cancel();
            tracing::info!(service = %self.name, job = %entry.job.name(), id, "wall-time exceeded");
            match &entry.job.kind {
                BatchJobKind::Standard(compound) => {
                    let cause = FailureCause::JobTimeout { job: compound.name() };
                    if let Some(driver) = &entry.driver {
                        driver.kill(cause.clone()).await;
                    }
                    entry.job.state = BatchJobState::TimedOut;
                    Self::stop_services(&entry.services).await;
                    entry.job.notify.send(Event::StandardJobFailed {
                        job: compound.clone(),
                        cause,
                        date: self.clock.now(),
                    });
                }
                BatchJobKind::Pilot(pilot) => {
                    pilot
                        .shutdown(FailureCause::JobKilled { job: pilot.name().to_string() })
                        .await;
                    entry.job.state = BatchJobState::TimedOut;
                    entry.job.notify.send(Event::PilotJobExpired {
                        pilot: pilot.name().to_string(),
                        date: self.clock.now(),
                    });
                }
            }
            self.release(&entry.job);
        }
    }

    async fn on_driver_done(&mut self, done: DriverDone) {
        let id = self.running.iter().find_map(|(id, entry)| {
            match &entry.job.kind {
                BatchJobKind::Standard(compound) if *compound == done.job => Some(*id),
                _ => None,
            }
        });
        // Unknown driver: the job was terminated or reaped first.
        let Some(id) = id else { return };
        let Some(mut entry) = self.running.remove(&id) else { return };
        entry.alarm.cancel();
        entry.job.state = match done.state {
            JobState::Completed => BatchJobState::Completed,
            _ => BatchJobState::Failed,
        };
        self.release(&entry.job);
        Self::stop_services(&entry.services).await;
        let now = self.clock.now();
        tracing::info!(
            service = %self.name,
            job = %done.job.name(),
            state = %done.state,
            "job finished"
        );
        match done.state {
            JobState::Completed => {
                entry.job.notify.send(Event::StandardJobCompleted { job: done.job, date: now });
            }
            _ => {
                entry.job.notify.send(Event::StandardJobFailed {
                    job: done.job,
                    cause: done.cause.unwrap_or(FailureCause::FatalFailure),
                    date: now,
                });
            }
        }
    }

    async fn terminate_standard(&mut self, job: CompoundJob) -> Result<(), FailureCause> {
        if let Some(idx) = self.pending.iter().position(|pending| {
            matches!(&pending.kind, BatchJobKind::Standard(compound) if *compound == job)
        }) {
            let mut pending = self.pending.remove(idx);
            pending.state = BatchJobState::Killed;
            job.set_state(JobState::Discontinued);
            tracing::info!(service = %self.name, job = %job.name(), "pending job removed");
            return Ok(());
        }
        let id = self.running.iter().find_map(|(id, entry)| {
            matches!(&entry.job.kind, BatchJobKind::Standard(compound) if *compound == job)
                .then_some(*id)
        });
        let Some(id) = id else {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: format!("job {} is not pending or running here", job.name()),
            });
        };
        let Some(mut entry) = self.running.remove(&id) else {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: "job vanished".into(),
            });
        };
        entry.alarm.cancel();
        if let Some(driver) = &entry.driver {
            driver.kill(FailureCause::JobKilled { job: job.name() }).await;
        }
        entry.job.state = BatchJobState::Killed;
        self.release(&entry.job);
        Self::stop_services(&entry.services).await;
        tracing::info!(service = %self.name, job = %job.name(), "running job terminated");
        Ok(())
    }

    async fn terminate_pilot(&mut self, pilot: PilotJob) -> Result<(), FailureCause> {
        if let Some(idx) = self.pending.iter().position(|pending| {
            matches!(&pending.kind, BatchJobKind::Pilot(p) if p.name() == pilot.name())
        }) {
            let mut pending = self.pending.remove(idx);
            pending.state = BatchJobState::Killed;
            return Ok(());
        }
        let id = self.running.iter().find_map(|(id, entry)| {
            matches!(&entry.job.kind, BatchJobKind::Pilot(p) if p.name() == pilot.name())
                .then_some(*id)
        });
        let Some(id) = id else {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: format!("pilot {} is not pending or running here", pilot.name()),
            });
        };
        let Some(mut entry) = self.running.remove(&id) else {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: "pilot vanished".into(),
            });
        };
        entry.alarm.cancel();
        pilot
            .shutdown(FailureCause::JobKilled { job: pilot.name().to_string() })
            .await;
        entry.job.state = BatchJobState::Killed;
        self.release(&entry.job);
        entry.job.notify.send(Event::PilotJobExpired {
            pilot: pilot.name().to_string(),
            date: self.clock.now(),
        });
        Ok(())
    }

    /// Fail everything and free everything.
    async fn shutdown(&mut self) {
        tracing::info!(service = %self.name, "batch scheduler shutting down");
        let now = self.clock.now();
        for pending in self.pending.drain(..) {
            match &pending.kind {
                BatchJobKind::Standard(compound) => {
                    compound.set_state(JobState::Failed);
                    pending.notify.send(Event::StandardJobFailed {
                        job: compound.clone(),
                        cause: FailureCause::JobKilled { job: compound.name() },
                        date: now,
                    });
                }
                BatchJobKind::Pilot(pilot) => {
                    pending.notify.send(Event::PilotJobExpired {
                        pilot: pilot.name().to_string(),
                        date: now,
                    });
                }
            }
        }
        let running: Vec<u64> = self.running.keys().copied().collect();
        for id in running {
            let Some(mut entry) = self.running.remove(&id) else { continue };
            entry.alarm.cancel();
            match &entry.job.kind {
                BatchJobKind::Standard(compound) => {
                    let cause = FailureCause::JobKilled { job: compound.name() };
                    if let Some(driver) = &entry.driver {
                        driver.kill(cause.clone()).await;
                    }
                    entry.job.state = BatchJobState::Killed;
                    Self::stop_services(&entry.services).await;
                    entry.job.notify.send(Event::StandardJobFailed {
                        job: compound.clone(),
                        cause,
                        date: self.clock.now(),
                    });
                }
                BatchJobKind::Pilot(pilot) => {
                    pilot
                        .shutdown(FailureCause::JobKilled { job: pilot.name().to_string() })
                        .await;
                    entry.job.state = BatchJobState::Killed;
                    entry.job.notify.send(Event::PilotJobExpired {
                        pilot: pilot.name().to_string(),
                        date: self.clock.now(),
                    });
                }
            }
            self.release(&entry.job);
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
