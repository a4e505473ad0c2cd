// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-host action execution service.
//!
//! Owns the host's core and RAM pools and the per-job scratch spaces.
//! Dispatch atomically debits the pools and spawns an executor; the
//! executor's completion notice credits them back and is forwarded to
//! the dispatcher's notify address. Only this actor mutates the pools.

use crate::executor::{ActionExecutor, ExecutorDone, ExecutorSpec};
use gantry_core::{
    Action, CompoundJob, FailureCause, JobId, ServiceConfig,
};
use gantry_sim::{
    mailbox, pause_gate, request, Address, ExecutionHost, FileRegistry, Mailbox, PauseControl,
    SimClock, SimStorage, StorageDirectory,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Scratch is carved out of the host's local disk; transfers to it run
/// at local-disk speed.
const SCRATCH_BANDWIDTH_BPS: f64 = 250_000_000.0;

/// Snapshot of the service's resource pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesResources {
    pub total_cores: u32,
    pub free_cores: u32,
    pub total_ram: u64,
    pub free_ram: u64,
}

/// Construction parameters; defaults cover the whole physical host.
pub struct AesSpec {
    pub name: String,
    pub host: Arc<ExecutionHost>,
    pub num_cores: u32,
    pub ram: u64,
    pub scratch_space: u64,
    pub config: ServiceConfig,
    pub storages: StorageDirectory,
    pub registry: Option<FileRegistry>,
}

impl AesSpec {
    pub fn new(host: Arc<ExecutionHost>) -> Self {
        Self {
            name: host.name().to_string(),
            num_cores: host.num_cores(),
            ram: host.ram(),
            scratch_space: host.disk_capacity("/").unwrap_or(0),
            host,
            config: ServiceConfig::default(),
            storages: StorageDirectory::new(),
            registry: None,
        }
    }

    gantry_core::setters! {
        into {
            name: String,
        }
        set {
            num_cores: u32,
            ram: u64,
            scratch_space: u64,
            config: ServiceConfig,
            storages: StorageDirectory,
        }
        option {
            registry: FileRegistry,
        }
    }
}

enum AesMsg {
    Dispatch {
        action: Action,
        num_cores: u32,
        ram: u64,
        notify: Address<ExecutorDone>,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    TerminateJob {
        job: CompoundJob,
        cause: FailureCause,
        reply: oneshot::Sender<()>,
    },
    ReleaseJob {
        job: CompoundJob,
        reply: oneshot::Sender<()>,
    },
    Resources {
        reply: oneshot::Sender<AesResources>,
    },
    Suspend {
        reply: oneshot::Sender<()>,
    },
    Resume {
        reply: oneshot::Sender<()>,
    },
    Relocate {
        host: Arc<ExecutionHost>,
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running action execution service.
#[derive(Clone, Debug)]
pub struct ActionExecutionService {
    addr: Address<AesMsg>,
    name: String,
}

impl ActionExecutionService {
    pub fn start(spec: AesSpec, clock: SimClock) -> Self {
        let name = spec.name.clone();
        let (addr, requests) = mailbox::<AesMsg>(&name);
        let (done_addr, dones) = mailbox::<ExecutorDone>(format!("{name}-done"));
        let (pause, _) = pause_gate();
        let actor = AesActor {
            name: name.clone(),
            host: Arc::clone(&spec.host),
            total_cores: spec.num_cores,
            free_cores: spec.num_cores,
            total_ram: spec.ram,
            free_ram: spec.ram,
            scratch_space: spec.scratch_space,
            config: spec.config,
            storages: spec.storages,
            registry: spec.registry,
            clock,
            done_addr,
            running: HashMap::new(),
            scratch: HashMap::new(),
            pause,
            down: false,
            stop_reply: None,
        };
        tokio::spawn(actor.run(requests, dones));
        Self { addr, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn down(&self) -> FailureCause {
        FailureCause::ServiceIsDown { service: self.name.clone() }
    }

    /// Dispatch one ready action with an explicit resource grant. The
    /// completion notice goes to `notify`.
    pub async fn dispatch(
        &self,
        action: Action,
        num_cores: u32,
        ram: u64,
        notify: Address<ExecutorDone>,
    ) -> Result<(), FailureCause> {
        request(&self.addr, |reply| AesMsg::Dispatch { action, num_cores, ram, notify, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Kill every running executor of `job` with `cause` and drop its
    /// scratch space.
    pub async fn terminate_job(
        &self,
        job: CompoundJob,
        cause: FailureCause,
    ) -> Result<(), FailureCause> {
        request(&self.addr, |reply| AesMsg::TerminateJob { job, cause, reply })
            .await
            .map_err(|_| self.down())
    }

    /// Job ended: destroy its scratch space.
    pub async fn release_job(&self, job: CompoundJob) -> Result<(), FailureCause> {
        request(&self.addr, |reply| AesMsg::ReleaseJob { job, reply })
            .await
            .map_err(|_| self.down())
    }

    pub async fn resources(&self) -> Result<AesResources, FailureCause> {
        request(&self.addr, |reply| AesMsg::Resources { reply })
            .await
            .map_err(|_| self.down())
    }

    /// Pause every hosted executor (VM suspend).
    pub async fn suspend(&self) -> Result<(), FailureCause> {
        request(&self.addr, |reply| AesMsg::Suspend { reply })
            .await
            .map_err(|_| self.down())
    }

    pub async fn resume(&self) -> Result<(), FailureCause> {
        request(&self.addr, |reply| AesMsg::Resume { reply })
            .await
            .map_err(|_| self.down())
    }

    /// Rebind to a new physical host (VM migration); open execution
    /// records move with it.
    pub async fn relocate(&self, host: Arc<ExecutionHost>) -> Result<(), FailureCause> {
        request(&self.addr, |reply| AesMsg::Relocate { host, reply })
            .await
            .map_err(|_| self.down())
    }

    /// Shut down: running executors are killed with `ServiceIsDown`,
    /// their completion notices still delivered, then the actor exits.
    pub async fn stop(&self) -> Result<(), FailureCause> {
        request(&self.addr, |reply| AesMsg::Stop { reply })
            .await
            .map_err(|_| self.down())
    }
}

struct RunningEntry {
    executor: ActionExecutor,
    num_cores: u32,
    ram: u64,
    notify: Address<ExecutorDone>,
}

struct AesActor {
    name: String,
    host: Arc<ExecutionHost>,
    total_cores: u32,
    free_cores: u32,
    total_ram: u64,
    free_ram: u64,
    scratch_space: u64,
    config: ServiceConfig,
    storages: StorageDirectory,
    registry: Option<FileRegistry>,
    clock: SimClock,
    done_addr: Address<ExecutorDone>,
    running: HashMap<Action, RunningEntry>,
    scratch: HashMap<JobId, SimStorage>,
    pause: PauseControl,
    down: bool,
    stop_reply: Option<oneshot::Sender<()>>,
}

impl AesActor {
    async fn run(mut self, mut requests: Mailbox<AesMsg>, mut dones: Mailbox<ExecutorDone>) {
        tracing::info!(service = %self.name, host = %self.host.name(), "action execution service starting");
        loop {
            tokio::select! {
                message = requests.recv() => match message {
                    Some(message) => {
                        if self.handle(message) {
                            break;
                        }
                    }
                    None => break,
                },
                done = dones.recv() => match done {
                    Some(done) => {
                        if self.on_done(done) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        tracing::info!(service = %self.name, "action execution service terminated");
    }

    /// Returns true when the actor should exit.
    fn handle(&mut self, message: AesMsg) -> bool {
        match message {
            AesMsg::Dispatch { action, num_cores, ram, notify, reply } => {
                let result = self.dispatch(action, num_cores, ram, notify);
                let _ = reply.send(result);
            }
            AesMsg::TerminateJob { job, cause, reply } => {
                for (action, entry) in self.running.iter() {
                    if action.job() == job {
                        entry.executor.kill(cause.clone());
                    }
                }
                self.drop_scratch(&job);
                let _ = reply.send(());
            }
            AesMsg::ReleaseJob { job, reply } => {
                self.drop_scratch(&job);
                let _ = reply.send(());
            }
            AesMsg::Resources { reply } => {
                let _ = reply.send(AesResources {
                    total_cores: self.total_cores,
                    free_cores: self.free_cores,
                    total_ram: self.total_ram,
                    free_ram: self.free_ram,
                });
            }
            AesMsg::Suspend { reply } => {
                self.pause.pause();
                let _ = reply.send(());
            }
            AesMsg::Resume { reply } => {
                self.pause.resume();
                let _ = reply.send(());
            }
            AesMsg::Relocate { host, reply } => {
                tracing::info!(service = %self.name, from = %self.host.name(), to = %host.name(), "relocating");
                self.host = host;
                for action in self.running.keys() {
                    action.relocate(self.host.name());
                }
                let _ = reply.send(());
            }
            AesMsg::Stop { reply } => {
                self.down = true;
                for entry in self.running.values() {
                    entry
                        .executor
                        .kill(FailureCause::ServiceIsDown { service: self.name.clone() });
                }
                if self.running.is_empty() {
                    let _ = reply.send(());
                    return true;
                }
                self.stop_reply = Some(reply);
            }
        }
        false
    }

    /// Returns true when the actor should exit (stop drained).
    fn on_done(&mut self, done: ExecutorDone) -> bool {
        if let Some(entry) = self.running.remove(&done.action) {
            self.free_cores += entry.num_cores;
            self.free_ram += entry.ram;
            tracing::debug!(
                service = %self.name,
                action = %done.action.name(),
                free_cores = self.free_cores,
                "executor reported"
            );
            if entry.notify.send(done).is_err() {
                tracing::debug!(service = %self.name, "dispatcher gone, completion dropped");
            }
        }
        if self.down && self.running.is_empty() {
            if let Some(reply) = self.stop_reply.take() {
                let _ = reply.send(());
            }
            return true;
        }
        false
    }

    fn dispatch(
        &mut self,
        action: Action,
        num_cores: u32,
        ram: u64,
        notify: Address<ExecutorDone>,
    ) -> Result<(), FailureCause> {
        if self.down {
            return Err(FailureCause::ServiceIsDown { service: self.name.clone() });
        }
        if num_cores == 0 {
            return Err(FailureCause::invalid_argument(format!(
                "cannot dispatch action {} with zero cores",
                action.name()
            )));
        }
        if num_cores > self.free_cores || ram > self.free_ram {
            return Err(FailureCause::NotEnoughResources {
                job: Some(action.job().name()),
                service: self.name.clone(),
            });
        }

        let scratch = if action.uses_scratch() {
            Some(self.scratch_for(&action.job())?)
        } else {
            None
        };

        let mut spec = ExecutorSpec::new(action.clone(), Arc::clone(&self.host))
            .execution_host(self.name.clone())
            .num_cores(num_cores)
            .ram(ram)
            .thread_startup_overhead(self.config.thread_startup_overhead)
            .simulate_computation_as_sleep(self.config.simulate_computation_as_sleep)
            .storages(self.storages.clone())
            .pause(self.pause.gate());
        if let Some(scratch) = scratch {
            spec = spec.scratch(scratch);
        }
        if let Some(registry) = &self.registry {
            spec = spec.registry(registry.clone());
        }

        let executor = ActionExecutor::spawn(spec, self.clock, self.done_addr.clone())?;
        self.free_cores -= num_cores;
        self.free_ram -= ram;
        tracing::info!(
            service = %self.name,
            action = %action.name(),
            cores = num_cores,
            ram,
            free_cores = self.free_cores,
            "dispatched"
        );
        self.running
            .insert(action, RunningEntry { executor, num_cores, ram, notify });
        Ok(())
    }

    /// The job's scratch space, created on first use.
    fn scratch_for(&mut self, job: &CompoundJob) -> Result<SimStorage, FailureCause> {
        if let Some(existing) = self.scratch.get(&job.id()) {
            return Ok(existing.clone());
        }
        let storage = SimStorage::new(
            format!("{}-scratch-{}", self.name, job.id()),
            "/scratch",
            self.scratch_space,
            SCRATCH_BANDWIDTH_BPS,
            gantry_core::CachingBehavior::None,
            self.clock,
        )?;
        tracing::debug!(service = %self.name, job = %job.name(), "scratch created");
        self.scratch.insert(job.id(), storage.clone());
        Ok(storage)
    }

    fn drop_scratch(&mut self, job: &CompoundJob) {
        if self.scratch.remove(&job.id()).is_some() {
            tracing::debug!(service = %self.name, job = %job.name(), "scratch destroyed");
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
