// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The virtualized-cluster VM manager actor.
//!
//! VMs are carved out of physical execution hosts. The accounting
//! invariant holds at every simulated instant: per physical host, the
//! cores and RAM of its VMs never exceed the host's. Creation
//! reserves, destruction releases, migration moves the reservation
//! atomically after the simulated transfer.

use crate::vm::{VirtualMachine, VmState};
use gantry_core::{
    CompoundJob, Event, EventSender, FailureCause, JobState, ServiceConfig,
};
use gantry_exec::{
    ActionExecutionService, AesSpec, AllocationSlice, DriverDone, JobDriver,
};
use gantry_sim::{
    mailbox, request, Address, ExecutionHost, FileRegistry, Mailbox, SimClock, StorageDirectory,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Migration cost model: the VM's RAM is shipped at this rate.
const MIGRATION_RATE_BPS: f64 = 1_000_000_000.0;

/// Construction parameters for a VM manager.
pub struct CloudSpec {
    pub name: String,
    pub execution_hosts: Vec<Arc<ExecutionHost>>,
    pub config: ServiceConfig,
    pub storages: StorageDirectory,
    pub registry: Option<FileRegistry>,
}

impl CloudSpec {
    pub fn new(execution_hosts: Vec<Arc<ExecutionHost>>) -> Self {
        Self {
            name: "cloud".into(),
            execution_hosts,
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
            config: ServiceConfig,
            storages: StorageDirectory,
        }
        option {
            registry: FileRegistry,
        }
    }
}

/// Per-host accounting snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUsage {
    pub host: String,
    pub total_cores: u32,
    pub used_cores: u32,
    pub total_ram: u64,
    pub used_ram: u64,
}

enum CloudMsg {
    CreateVm {
        num_cores: u32,
        ram: u64,
        physical_host: Option<String>,
        reply: oneshot::Sender<Result<String, FailureCause>>,
    },
    StartVm {
        vm: String,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    ShutdownVm {
        vm: String,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    SuspendVm {
        vm: String,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    ResumeVm {
        vm: String,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    DestroyVm {
        vm: String,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    MigrateVm {
        vm: String,
        destination: String,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    SubmitJob {
        vm: String,
        job: CompoundJob,
        notify: EventSender,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    VmState {
        vm: String,
        reply: oneshot::Sender<Result<VmState, FailureCause>>,
    },
    Usage {
        reply: oneshot::Sender<Vec<HostUsage>>,
    },
    DriverDone(DriverDone),
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running VM manager.
#[derive(Clone)]
pub struct CloudVMManager {
    addr: Address<CloudMsg>,
    name: String,
}

impl CloudVMManager {
    pub fn start(spec: CloudSpec, clock: SimClock) -> Result<Self, FailureCause> {
        if spec.execution_hosts.is_empty() {
            return Err(FailureCause::invalid_argument(
                "a VM manager needs at least one execution host",
            ));
        }
        let name = spec.name.clone();
        let (addr, requests) = mailbox::<CloudMsg>(&name);
        let (driver_addr, mut driver_rx) = mailbox::<DriverDone>(format!("{name}-drivers"));
        {
            let addr = addr.clone();
            tokio::spawn(async move {
                while let Some(done) = driver_rx.recv().await {
                    if addr.send(CloudMsg::DriverDone(done)).is_err() {
                        break;
                    }
                }
            });
        }
        let hosts: IndexMap<String, Arc<ExecutionHost>> = spec
            .execution_hosts
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h)))
            .collect();
        let used = hosts.keys().map(|h| (h.clone(), (0u32, 0u64))).collect();
        let actor = CloudActor {
            name: name.clone(),
            clock,
            hosts,
            used,
            config: spec.config,
            storages: spec.storages,
            registry: spec.registry,
            vms: IndexMap::new(),
            jobs: HashMap::new(),
            next_vm: 1,
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

    /// Create a VM (Down) bound to a physical host; the manager picks
    /// the first host that fits when none is named.
    pub async fn create_vm(
        &self,
        num_cores: u32,
        ram: u64,
        physical_host: Option<&str>,
    ) -> Result<String, FailureCause> {
        let physical_host = physical_host.map(str::to_string);
        request(&self.addr, |reply| CloudMsg::CreateVm { num_cores, ram, physical_host, reply })
            .await
            .map_err(|_| self.down())?
    }

    pub async fn start_vm(&self, vm: &str) -> Result<(), FailureCause> {
        let vm = vm.to_string();
        request(&self.addr, |reply| CloudMsg::StartVm { vm, reply })
            .await
            .map_err(|_| self.down())?
    }

    pub async fn shutdown_vm(&self, vm: &str) -> Result<(), FailureCause> {
        let vm = vm.to_string();
        request(&self.addr, |reply| CloudMsg::ShutdownVm { vm, reply })
            .await
            .map_err(|_| self.down())?
    }

    pub async fn suspend_vm(&self, vm: &str) -> Result<(), FailureCause> {
        let vm = vm.to_string();
        request(&self.addr, |reply| CloudMsg::SuspendVm { vm, reply })
            .await
            .map_err(|_| self.down())?
    }

    pub async fn resume_vm(&self, vm: &str) -> Result<(), FailureCause> {
        let vm = vm.to_string();
        request(&self.addr, |reply| CloudMsg::ResumeVm { vm, reply })
            .await
            .map_err(|_| self.down())?
    }

    pub async fn destroy_vm(&self, vm: &str) -> Result<(), FailureCause> {
        let vm = vm.to_string();
        request(&self.addr, |reply| CloudMsg::DestroyVm { vm, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Live-migrate a running VM; costs a sleep proportional to the
    /// VM's RAM.
    pub async fn migrate_vm(&self, vm: &str, destination: &str) -> Result<(), FailureCause> {
        let vm = vm.to_string();
        let destination = destination.to_string();
        request(&self.addr, |reply| CloudMsg::MigrateVm { vm, destination, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Run a compound job on a running VM; outcomes arrive as
    /// compound-job events on `notify`.
    pub async fn submit_job(
        &self,
        vm: &str,
        job: CompoundJob,
        notify: EventSender,
    ) -> Result<(), FailureCause> {
        let vm = vm.to_string();
        request(&self.addr, |reply| CloudMsg::SubmitJob { vm, job, notify, reply })
            .await
            .map_err(|_| self.down())?
    }

    pub async fn vm_state(&self, vm: &str) -> Result<VmState, FailureCause> {
        let vm = vm.to_string();
        request(&self.addr, |reply| CloudMsg::VmState { vm, reply })
            .await
            .map_err(|_| self.down())?
    }

    pub async fn usage(&self) -> Result<Vec<HostUsage>, FailureCause> {
        request(&self.addr, |reply| CloudMsg::Usage { reply })
            .await
            .map_err(|_| self.down())
    }

    pub async fn stop(&self) -> Result<(), FailureCause> {
        request(&self.addr, |reply| CloudMsg::Stop { reply })
            .await
            .map_err(|_| self.down())
    }
}

struct JobEntry {
    vm: String,
    driver: JobDriver,
    notify: EventSender,
}

struct CloudActor {
    name: String,
    clock: SimClock,
    hosts: IndexMap<String, Arc<ExecutionHost>>,
    /// Per host: (reserved cores, reserved ram).
    used: IndexMap<String, (u32, u64)>,
    config: ServiceConfig,
    storages: StorageDirectory,
    registry: Option<FileRegistry>,
    vms: IndexMap<String, VirtualMachine>,
    jobs: HashMap<CompoundJob, JobEntry>,
    next_vm: u64,
    driver_addr: Address<DriverDone>,
}

impl CloudActor {
    async fn run(mut self, mut requests: Mailbox<CloudMsg>) {
        tracing::info!(service = %self.name, hosts = self.hosts.len(), "VM manager starting");
        loop {
            let Some(message) = requests.recv().await else { break };
            if let CloudMsg::Stop { reply } = message {
                self.shutdown().await;
                let _ = reply.send(());
                break;
            }
            self.handle(message).await;
        }
        tracing::info!(service = %self.name, "VM manager terminated");
    }

    async fn handle(&mut self, message: CloudMsg) {
        match message {
            CloudMsg::CreateVm { num_cores, ram, physical_host, reply } => {
                let _ = reply.send(self.create_vm(num_cores, ram, physical_host));
            }
            CloudMsg::StartVm { vm, reply } => {
                let _ = reply.send(self.start_vm(&vm));
            }
            CloudMsg::ShutdownVm { vm, reply } => {
                let _ = reply.send(self.shutdown_vm(&vm).await);
            }
            CloudMsg::SuspendVm { vm, reply } => {
                let _ = reply.send(self.suspend_vm(&vm).await);
            }
            CloudMsg::ResumeVm { vm, reply } => {
                let _ = reply.send(self.resume_vm(&vm).await);
            }
            CloudMsg::DestroyVm { vm, reply } => {
                let _ = reply.send(self.destroy_vm(&vm));
            }
            CloudMsg::MigrateVm { vm, destination, reply } => {
                let _ = reply.send(self.migrate_vm(&vm, &destination).await);
            }
            CloudMsg::SubmitJob { vm, job, notify, reply } => {
                let _ = reply.send(self.submit_job(&vm, job, notify));
            }
            CloudMsg::VmState { vm, reply } => {
                let _ = reply.send(
                    self.vms
                        .get(&vm)
                        .map(|record| record.state)
                        .ok_or_else(|| self.unknown_vm(&vm)),
                );
            }
            CloudMsg::Usage { reply } => {
                let _ = reply.send(
                    self.hosts
                        .iter()
                        .map(|(name, host)| {
                            let (used_cores, used_ram) =
                                self.used.get(name).copied().unwrap_or((0, 0));
                            HostUsage {
                                host: name.clone(),
                                total_cores: host.num_cores(),
                                used_cores,
                                total_ram: host.ram(),
                                used_ram,
                            }
                        })
                        .collect(),
                );
            }
            CloudMsg::DriverDone(done) => self.on_driver_done(done),
            CloudMsg::Stop { .. } => unreachable!("handled by the main loop"),
        }
    }

    fn unknown_vm(&self, vm: &str) -> FailureCause {
        FailureCause::invalid_argument(format!("unknown VM: {vm}"))
    }

    fn free_on(&self, host: &str) -> (u32, u64) {
        let Some(record) = self.hosts.get(host) else { return (0, 0) };
        let (used_cores, used_ram) = self.used.get(host).copied().unwrap_or((0, 0));
        (record.num_cores() - used_cores, record.ram() - used_ram)
    }

    fn reserve(&mut self, host: &str, cores: u32, ram: u64) {
        if let Some((used_cores, used_ram)) = self.used.get_mut(host) {
            *used_cores += cores;
            *used_ram += ram;
        }
    }

    fn release(&mut self, host: &str, cores: u32, ram: u64) {
        if let Some((used_cores, used_ram)) = self.used.get_mut(host) {
            *used_cores = used_cores.saturating_sub(cores);
            *used_ram = used_ram.saturating_sub(ram);
        }
    }

    fn create_vm(
        &mut self,
        num_cores: u32,
        ram: u64,
        physical_host: Option<String>,
    ) -> Result<String, FailureCause> {
        if num_cores == 0 {
            return Err(FailureCause::invalid_argument("a VM needs at least one core"));
        }
        let host = match physical_host {
            Some(host) => {
                if !self.hosts.contains_key(&host) {
                    return Err(FailureCause::invalid_argument(format!(
                        "{host} is not an execution host of this service"
                    )));
                }
                let (free_cores, free_ram) = self.free_on(&host);
                if free_cores < num_cores || free_ram < ram {
                    return Err(FailureCause::NotEnoughResources {
                        job: None,
                        service: self.name.clone(),
                    });
                }
                host
            }
            None => self
                .hosts
                .keys()
                .find(|host| {
                    let (free_cores, free_ram) = self.free_on(host);
                    free_cores >= num_cores && free_ram >= ram
                })
                .cloned()
                .ok_or(FailureCause::NotEnoughResources {
                    job: None,
                    service: self.name.clone(),
                })?,
        };
        let name = format!("vm-{}", self.next_vm);
        self.next_vm += 1;
        self.reserve(&host, num_cores, ram);
        tracing::info!(service = %self.name, vm = %name, host = %host, cores = num_cores, "VM created");
        self.vms
            .insert(name.clone(), VirtualMachine::new(&name, num_cores, ram, &host));
        Ok(name)
    }

    fn start_vm(&mut self, vm: &str) -> Result<(), FailureCause> {
        let config = self.config.clone();
        let storages = self.storages.clone();
        let registry = self.registry.clone();
        let clock = self.clock;
        let name = self.name.clone();
        let missing = self.unknown_vm(vm);
        let Some(record) = self.vms.get_mut(vm) else { return Err(missing) };
        if record.state != VmState::Down {
            return Err(FailureCause::NotAllowed {
                service: name,
                reason: format!("cannot start VM {vm} from state {}", record.state),
            });
        }
        let Some(host) = self.hosts.get(&record.physical_host) else {
            return Err(FailureCause::HostError { host: record.physical_host.clone() });
        };
        let mut spec = AesSpec::new(Arc::clone(host))
            .name(record.name.clone())
            .num_cores(record.num_cores)
            .ram(record.ram)
            .config(config)
            .storages(storages);
        if let Some(registry) = registry {
            spec = spec.registry(registry);
        }
        record.service = Some(ActionExecutionService::start(spec, clock));
        record.state = VmState::Running;
        tracing::info!(service = %self.name, vm, "VM started");
        Ok(())
    }

    async fn shutdown_vm(&mut self, vm: &str) -> Result<(), FailureCause> {
        let state = self.vms.get(vm).map(|r| r.state).ok_or_else(|| self.unknown_vm(vm))?;
        if state != VmState::Running {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: format!("cannot shut down VM {vm} from state {state}"),
            });
        }
        // Hosted jobs die with the VM.
        let doomed: Vec<CompoundJob> = self
            .jobs
            .iter()
            .filter(|(_, entry)| entry.vm == vm)
            .map(|(job, _)| job.clone())
            .collect();
        for job in doomed {
            if let Some(entry) = self.jobs.get(&job) {
                entry.driver.kill(FailureCause::JobKilled { job: job.name() }).await;
            }
        }
        let Some(record) = self.vms.get_mut(vm) else { return Ok(()) };
        if let Some(service) = record.service.take() {
            let _ = service.stop().await;
        }
        record.state = VmState::Down;
        tracing::info!(service = %self.name, vm, "VM shut down");
        Ok(())
    }

    async fn suspend_vm(&mut self, vm: &str) -> Result<(), FailureCause> {
        let name = self.name.clone();
        let missing = self.unknown_vm(vm);
        let Some(record) = self.vms.get_mut(vm) else { return Err(missing) };
        if record.state != VmState::Running {
            return Err(FailureCause::NotAllowed {
                service: name,
                reason: format!("cannot suspend VM {vm} from state {}", record.state),
            });
        }
        if let Some(service) = &record.service {
            service.suspend().await?;
        }
        record.state = VmState::Suspended;
        tracing::info!(service = %self.name, vm, "VM suspended");
        Ok(())
    }

    async fn resume_vm(&mut self, vm: &str) -> Result<(), FailureCause> {
        let name = self.name.clone();
        let missing = self.unknown_vm(vm);
        let Some(record) = self.vms.get_mut(vm) else { return Err(missing) };
        if record.state != VmState::Suspended {
            return Err(FailureCause::NotAllowed {
                service: name,
                reason: format!("cannot resume VM {vm} from state {}", record.state),
            });
        }
        if let Some(service) = &record.service {
            service.resume().await?;
        }
        record.state = VmState::Running;
        tracing::info!(service = %self.name, vm, "VM resumed");
        Ok(())
    }

    fn destroy_vm(&mut self, vm: &str) -> Result<(), FailureCause> {
        let state = self.vms.get(vm).map(|r| r.state).ok_or_else(|| self.unknown_vm(vm))?;
        if state != VmState::Down {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: format!("cannot destroy VM {vm} from state {state}"),
            });
        }
        if let Some(record) = self.vms.shift_remove(vm) {
            self.release(&record.physical_host, record.num_cores, record.ram);
        }
        tracing::info!(service = %self.name, vm, "VM destroyed");
        Ok(())
    }

    async fn migrate_vm(&mut self, vm: &str, destination: &str) -> Result<(), FailureCause> {
        let (state, source, num_cores, ram) = {
            let record = self.vms.get(vm).ok_or_else(|| self.unknown_vm(vm))?;
            (record.state, record.physical_host.clone(), record.num_cores, record.ram)
        };
        if state != VmState::Running {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: format!("cannot migrate VM {vm} from state {state}"),
            });
        }
        let dest_host = self
            .hosts
            .get(destination)
            .cloned()
            .ok_or_else(|| FailureCause::invalid_argument(format!(
                "{destination} is not an execution host of this service"
            )))?;
        let (free_cores, free_ram) = self.free_on(destination);
        if free_cores < num_cores || free_ram < ram {
            return Err(FailureCause::NotEnoughResources {
                job: None,
                service: self.name.clone(),
            });
        }

        tracing::info!(service = %self.name, vm, from = %source, to = %destination, "migration started");
        self.clock.sleep(ram as f64 / MIGRATION_RATE_BPS).await;

        if !dest_host.is_up() {
            // The destination died under us: the VM goes down in place.
            if let Some(record) = self.vms.get_mut(vm) {
                if let Some(service) = record.service.take() {
                    let _ = service.stop().await;
                }
                record.state = VmState::Down;
            }
            return Err(FailureCause::HostError { host: destination.to_string() });
        }

        if let Some(record) = self.vms.get_mut(vm) {
            if let Some(service) = &record.service {
                service.relocate(Arc::clone(&dest_host)).await?;
            }
            record.physical_host = destination.to_string();
        }
        // Atomic hand-over: source frees, destination reserves.
        self.release(&source, num_cores, ram);
        self.reserve(destination, num_cores, ram);
        tracing::info!(service = %self.name, vm, to = %destination, "migration finished");
        Ok(())
    }

    fn submit_job(
        &mut self,
        vm: &str,
        job: CompoundJob,
        notify: EventSender,
    ) -> Result<(), FailureCause> {
        let Some(record) = self.vms.get(vm) else { return Err(self.unknown_vm(vm)) };
        if record.state != VmState::Running {
            return Err(FailureCause::ServiceIsDown { service: record.name.clone() });
        }
        let Some(service) = &record.service else {
            return Err(FailureCause::ServiceIsDown { service: record.name.clone() });
        };
        job.set_state(JobState::Submitted);
        let slice = AllocationSlice {
            service: service.clone(),
            num_cores: record.num_cores,
            ram: record.ram,
        };
        tracing::info!(service = %self.name, vm, job = %job.name(), "job submitted to VM");
        let driver = JobDriver::spawn(job.clone(), vec![slice], self.driver_addr.clone());
        self.jobs
            .insert(job, JobEntry { vm: vm.to_string(), driver, notify });
        Ok(())
    }

    fn on_driver_done(&mut self, done: DriverDone) {
        let Some(entry) = self.jobs.remove(&done.job) else { return };
        let now = self.clock.now();
        match done.state {
            JobState::Completed => {
                entry.notify.send(Event::CompoundJobCompleted { job: done.job, date: now });
            }
            _ => {
                entry.notify.send(Event::CompoundJobFailed {
                    job: done.job,
                    cause: done.cause.unwrap_or(FailureCause::FatalFailure),
                    date: now,
                });
            }
        }
    }

    /// Stop every VM; hosted jobs fail with `JobKilled`.
    async fn shutdown(&mut self) {
        tracing::info!(service = %self.name, "VM manager shutting down");
        let now = self.clock.now();
        for (job, entry) in self.jobs.drain() {
            entry.driver.kill(FailureCause::JobKilled { job: job.name() }).await;
            entry.notify.send(Event::CompoundJobFailed {
                job: job.clone(),
                cause: FailureCause::JobKilled { job: job.name() },
                date: now,
            });
        }
        for record in self.vms.values_mut() {
            if let Some(service) = record.service.take() {
                let _ = service.stop().await;
            }
            record.state = VmState::Down;
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
