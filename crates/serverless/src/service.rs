// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The serverless scheduler actor.
//!
//! Cold-start path of an invocation: the image is downloaded from the
//! origin to head-node storage, copied to a compute node's disk,
//! loaded into that node's RAM, and only then can the invocation
//! start, pinned to the image by an open handle. The control loop per
//! tick: admit FCFS, ask the scheduler, dispatch invocations first
//! (so their opens pin files before anything else churns the caches),
//! then initiate loads and copies.

use crate::function::{
    Function, FunctionInput, FunctionLimits, Invocation, RegisteredFunction,
};
use crate::scheduler::{
    HostView, InvocationScheduler, InvocationView, NativeScheduler, SchedulerView,
    SchedulingDecisions,
};
use gantry_core::{
    ActionState, CachingBehavior, CompoundJob, CustomFunction, DataFile, Event, EventSender,
    FailureCause, ServiceConfig,
};
use gantry_exec::{ActionExecutor, ExecutorDone, ExecutorSpec};
use gantry_sim::{
    mailbox, request, Address, ExecutionHost, FileHandle, Mailbox, SimClock, SimStorage,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;

const HEAD_STORAGE_BANDWIDTH_BPS: f64 = 1_000_000_000.0;
const NODE_DISK_BANDWIDTH_BPS: f64 = 250_000_000.0;
const NODE_RAM_BANDWIDTH_BPS: f64 = 10_000_000_000.0;

/// Construction parameters for a serverless scheduler.
pub struct ServerlessSpec {
    pub name: String,
    pub compute_hosts: Vec<Arc<ExecutionHost>>,
    /// Capacity of the head-node image store.
    pub head_storage_size: u64,
    /// Where function images are downloaded from.
    pub origin: SimStorage,
    pub config: ServiceConfig,
    /// Scheduling policy; the native one when absent.
    pub scheduler: Option<Arc<dyn InvocationScheduler>>,
}

impl ServerlessSpec {
    pub fn new(compute_hosts: Vec<Arc<ExecutionHost>>, origin: SimStorage) -> Self {
        Self {
            name: "serverless".into(),
            compute_hosts,
            head_storage_size: 1 << 34,
            origin,
            config: ServiceConfig::default(),
            scheduler: None,
        }
    }

    gantry_core::setters! {
        into {
            name: String,
        }
        set {
            head_storage_size: u64,
            config: ServiceConfig,
        }
        option {
            scheduler: Arc<dyn InvocationScheduler>,
        }
    }
}

enum SlsMsg {
    Register {
        function: Arc<Function>,
        limits: FunctionLimits,
        reply: oneshot::Sender<Result<RegisteredFunction, FailureCause>>,
    },
    Deregister {
        function: RegisteredFunction,
        reply: oneshot::Sender<Result<(), FailureCause>>,
    },
    Invoke {
        function: RegisteredFunction,
        input: FunctionInput,
        notify: EventSender,
        reply: oneshot::Sender<Result<Invocation, FailureCause>>,
    },
    AvailableCores {
        reply: oneshot::Sender<Vec<(String, u32)>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running serverless scheduler.
#[derive(Clone)]
pub struct ServerlessScheduler {
    addr: Address<SlsMsg>,
    name: String,
}

impl ServerlessScheduler {
    pub fn start(spec: ServerlessSpec, clock: SimClock) -> Result<Self, FailureCause> {
        if spec.compute_hosts.is_empty() {
            return Err(FailureCause::invalid_argument(
                "a serverless scheduler needs at least one compute host",
            ));
        }
        let name = spec.name.clone();
        let mut nodes = IndexMap::new();
        for host in &spec.compute_hosts {
            let Some(disk_capacity) = host.disk_capacity("/") else {
                return Err(FailureCause::invalid_argument(format!(
                    "compute host {} has no \"/\" mount point",
                    host.name()
                )));
            };
            let disk = SimStorage::new(
                format!("{}-disk-{}", name, host.name()),
                "/",
                disk_capacity,
                NODE_DISK_BANDWIDTH_BPS,
                spec.config.caching_behavior,
                clock,
            )?;
            let ram = SimStorage::new(
                format!("{}-ram-{}", name, host.name()),
                "/ram_disk",
                host.ram(),
                NODE_RAM_BANDWIDTH_BPS,
                spec.config.caching_behavior,
                clock,
            )?;
            nodes.insert(
                host.name().to_string(),
                ComputeNode {
                    host: Arc::clone(host),
                    disk,
                    ram,
                    available_cores: host.num_cores(),
                    being_copied: HashSet::new(),
                    being_loaded: HashSet::new(),
                },
            );
        }
        let head = SimStorage::new(
            format!("{name}-head"),
            "/",
            spec.head_storage_size,
            HEAD_STORAGE_BANDWIDTH_BPS,
            CachingBehavior::None,
            clock,
        )?;
        let head_host = Arc::new(ExecutionHost::new(format!("{name}-head"), 1, 1 << 34, 1e9));

        let (addr, requests) = mailbox::<SlsMsg>(&name);
        let (done_addr, dones) = mailbox::<ExecutorDone>(format!("{name}-done"));
        let actor = ServerlessActor {
            name: name.clone(),
            clock,
            config: spec.config,
            origin: spec.origin,
            head,
            head_host,
            nodes,
            scheduler: spec.scheduler.unwrap_or_else(|| Arc::new(NativeScheduler)),
            registered: Vec::new(),
            new_invocations: VecDeque::new(),
            admitted: HashMap::new(),
            being_downloaded: HashSet::new(),
            schedulable: Vec::new(),
            running: HashMap::new(),
            helpers: HashMap::new(),
            done_addr,
            sequence: 0,
        };
        tokio::spawn(actor.run(requests, dones));
        Ok(Self { addr, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn down(&self) -> FailureCause {
        FailureCause::ServiceIsDown { service: self.name.clone() }
    }

    /// Register a function with resource limits. Each call yields a
    /// distinct registration.
    pub async fn register_function(
        &self,
        function: Arc<Function>,
        limits: FunctionLimits,
    ) -> Result<RegisteredFunction, FailureCause> {
        request(&self.addr, |reply| SlsMsg::Register { function, limits, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Remove one registration; other registrations of the same
    /// function are unaffected.
    pub async fn deregister_function(
        &self,
        function: &RegisteredFunction,
    ) -> Result<(), FailureCause> {
        let function = function.clone();
        request(&self.addr, |reply| SlsMsg::Deregister { function, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Queue one invocation; completion arrives as a
    /// `FunctionInvocationComplete` event on `notify`.
    pub async fn invoke_function(
        &self,
        function: &RegisteredFunction,
        input: FunctionInput,
        notify: EventSender,
    ) -> Result<Invocation, FailureCause> {
        let function = function.clone();
        request(&self.addr, |reply| SlsMsg::Invoke { function, input, notify, reply })
            .await
            .map_err(|_| self.down())?
    }

    /// Free cores per compute node.
    pub async fn available_cores(&self) -> Result<Vec<(String, u32)>, FailureCause> {
        request(&self.addr, |reply| SlsMsg::AvailableCores { reply })
            .await
            .map_err(|_| self.down())
    }

    pub async fn stop(&self) -> Result<(), FailureCause> {
        request(&self.addr, |reply| SlsMsg::Stop { reply })
            .await
            .map_err(|_| self.down())
    }
}

struct ComputeNode {
    host: Arc<ExecutionHost>,
    disk: SimStorage,
    ram: SimStorage,
    available_cores: u32,
    being_copied: HashSet<DataFile>,
    being_loaded: HashSet<DataFile>,
}

/// An invocation making its way through the queues.
struct InvocationEntry {
    handle: Invocation,
    input: FunctionInput,
    notify: EventSender,
}

/// Pins and transient files of a dispatched invocation.
struct SandboxPins {
    host: String,
    sandbox_file: DataFile,
    sandbox_pin: FileHandle,
    ram_file: DataFile,
    ram_pin: FileHandle,
    image_pin: FileHandle,
}

struct RunningInvocation {
    entry: InvocationEntry,
    pins: SandboxPins,
    executor: ActionExecutor,
}

enum Helper {
    Download { image: DataFile },
    Copy { host: String, image: DataFile },
    Load { host: String, image: DataFile },
}

struct ServerlessActor {
    name: String,
    clock: SimClock,
    config: ServiceConfig,
    origin: SimStorage,
    head: SimStorage,
    head_host: Arc<ExecutionHost>,
    nodes: IndexMap<String, ComputeNode>,
    scheduler: Arc<dyn InvocationScheduler>,
    registered: Vec<RegisteredFunction>,
    new_invocations: VecDeque<InvocationEntry>,
    admitted: HashMap<DataFile, VecDeque<InvocationEntry>>,
    being_downloaded: HashSet<DataFile>,
    schedulable: Vec<InvocationEntry>,
    running: HashMap<gantry_core::Action, RunningInvocation>,
    helpers: HashMap<gantry_core::Action, Helper>,
    done_addr: Address<ExecutorDone>,
    sequence: u64,
}

impl ServerlessActor {
    async fn run(mut self, mut requests: Mailbox<SlsMsg>, mut dones: Mailbox<ExecutorDone>) {
        tracing::info!(service = %self.name, nodes = self.nodes.len(), "serverless scheduler starting");
        loop {
            let do_scheduling = tokio::select! {
                message = requests.recv() => match message {
                    None => break,
                    Some(SlsMsg::Stop { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(message) => {
                        self.handle(message);
                        true
                    }
                },
                done = dones.recv() => match done {
                    None => break,
                    Some(done) => self.on_done(done),
                },
            };
            if do_scheduling {
                self.tick();
            }
        }
        tracing::info!(service = %self.name, "serverless scheduler terminated");
    }

    fn handle(&mut self, message: SlsMsg) {
        match message {
            SlsMsg::Register { function, limits, reply } => {
                let _ = reply.send(self.register(function, limits));
            }
            SlsMsg::Deregister { function, reply } => {
                let found = self.registered.iter().position(|r| *r == function);
                let _ = reply.send(match found {
                    Some(idx) => {
                        self.registered.remove(idx);
                        Ok(())
                    }
                    None => Err(FailureCause::FunctionNotFound {
                        function: function.name().to_string(),
                    }),
                });
            }
            SlsMsg::Invoke { function, input, notify, reply } => {
                if !self.registered.iter().any(|r| *r == function) {
                    let _ = reply.send(Err(FailureCause::FunctionNotFound {
                        function: function.name().to_string(),
                    }));
                    return;
                }
                let handle = Invocation::new(function, self.clock.now());
                tracing::info!(
                    service = %self.name,
                    function = %handle.registered_function().name(),
                    invocation = %handle.id(),
                    "invocation queued"
                );
                let _ = reply.send(Ok(handle.clone()));
                self.new_invocations.push_back(InvocationEntry { handle, input, notify });
            }
            SlsMsg::AvailableCores { reply } => {
                let _ = reply.send(
                    self.nodes
                        .iter()
                        .map(|(name, node)| (name.clone(), node.available_cores))
                        .collect(),
                );
            }
            SlsMsg::Stop { .. } => unreachable!("handled by the main loop"),
        }
    }

    /// A function can only be registered if some compute host could
    /// ever run it.
    fn register(
        &mut self,
        function: Arc<Function>,
        limits: FunctionLimits,
    ) -> Result<RegisteredFunction, FailureCause> {
        let image_size = function.image().size();
        let disk_needed = image_size + limits.disk_space_limit;
        let ram_needed = image_size + limits.ram_limit;
        let max_disk = self.nodes.values().map(|n| n.disk.capacity()).max().unwrap_or(0);
        let max_ram = self.nodes.values().map(|n| n.ram.capacity()).max().unwrap_or(0);
        if disk_needed > max_disk {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: format!(
                    "no compute host has {disk_needed} bytes of disk for function {}",
                    function.name()
                ),
            });
        }
        if ram_needed > max_ram {
            return Err(FailureCause::NotAllowed {
                service: self.name.clone(),
                reason: format!(
                    "no compute host has {ram_needed} bytes of RAM for function {}",
                    function.name()
                ),
            });
        }
        let registered = RegisteredFunction::new(function, limits);
        tracing::info!(service = %self.name, function = %registered.name(), "function registered");
        self.registered.push(registered.clone());
        Ok(registered)
    }

    /// One scheduling tick, in the order that keeps pins ahead of
    /// cache churn.
    fn tick(&mut self) {
        self.admit();
        let schedulable: Vec<InvocationView> = self
            .schedulable
            .iter()
            .map(|entry| InvocationView {
                id: entry.handle.id(),
                function: entry.handle.registered_function().clone(),
            })
            .collect();
        let decisions = self.scheduler.schedule(&schedulable, &self.view());
        self.dispatch_invocations(&decisions);
        self.initiate_loads(&decisions);
        self.initiate_copies(&decisions);
    }

    /// FCFS admission with head-storage space reservation; stops at
    /// the first invocation whose image cannot be accommodated.
    fn admit(&mut self) {
        loop {
            let image = match self.new_invocations.front() {
                Some(front) => front.handle.registered_function().image().clone(),
                None => break,
            };
            if self.being_downloaded.contains(&image) {
                if let Some(entry) = self.new_invocations.pop_front() {
                    self.admitted.entry(image).or_default().push_back(entry);
                }
                continue;
            }
            if self.head.has_file(&image) {
                if let Some(entry) = self.new_invocations.pop_front() {
                    self.schedulable.push(entry);
                }
                continue;
            }
            // Reserve the space now; the transfer time is paid by the
            // download action.
            if self.head.free_space() >= image.size() && self.head.create_file(&image).is_ok() {
                self.being_downloaded.insert(image.clone());
                self.start_download(&image);
                if let Some(entry) = self.new_invocations.pop_front() {
                    self.admitted.entry(image).or_default().push_back(entry);
                }
                continue;
            }
            break;
        }
    }

    fn view(&self) -> SchedulerView {
        SchedulerView {
            hosts: self
                .nodes
                .iter()
                .map(|(name, node)| HostView {
                    name: name.clone(),
                    available_cores: node.available_cores,
                    images_on_disk: node.disk.files(),
                    images_in_ram: node.ram.files(),
                    being_copied: node.being_copied.iter().cloned().collect(),
                    being_loaded: node.being_loaded.iter().cloned().collect(),
                    free_disk: node.disk.free_space(),
                    free_ram: node.ram.free_space(),
                })
                .collect(),
        }
    }

    fn dispatch_invocations(&mut self, decisions: &SchedulingDecisions) {
        for (host, id) in &decisions.starts {
            let Some(pos) = self.schedulable.iter().position(|e| e.handle.id() == *id) else {
                continue;
            };
            let entry = self.schedulable.remove(pos);
            if let Err(entry) = self.dispatch_invocation(entry, host) {
                // Scheduling and LRU do not always agree; back in line.
                self.schedulable.insert(pos, entry);
            }
        }
    }

    /// Start one invocation on `host` if the image is hot, a core is
    /// free, and the sandbox and RAM allocations both fit. Rolls back
    /// cleanly on failure.
    fn dispatch_invocation(
        &mut self,
        entry: InvocationEntry,
        host: &str,
    ) -> Result<(), InvocationEntry> {
        let now = self.clock.now();
        let Some(node) = self.nodes.get_mut(host) else { return Err(entry) };
        let registered = entry.handle.registered_function().clone();
        let image = registered.image().clone();
        let limits = *registered.limits();

        if !node.ram.has_file(&image) {
            tracing::debug!(service = %self.name, host, image = %image, "image not loaded yet");
            return Err(entry);
        }
        if node.available_cores == 0 {
            tracing::debug!(service = %self.name, host, "no core free");
            return Err(entry);
        }
        let exec_host = Arc::clone(&node.host);

        // Private on-disk sandbox.
        let sandbox_file =
            DataFile::new(format!("sandbox-{}", entry.handle.id()), limits.disk_space_limit);
        if node.disk.create_file(&sandbox_file).is_err() {
            tracing::info!(service = %self.name, host, "no disk space for a sandbox");
            return Err(entry);
        }
        let Ok(sandbox_pin) = node.disk.open_file(&sandbox_file) else {
            let _ = node.disk.remove_file(&sandbox_file);
            return Err(entry);
        };

        // Private RAM allocation.
        let ram_file = DataFile::new(format!("ram-{}", entry.handle.id()), limits.ram_limit);
        if node.ram.create_file(&ram_file).is_err() {
            tracing::info!(service = %self.name, host, "no RAM for an invocation");
            drop(sandbox_pin);
            let _ = node.disk.remove_file(&sandbox_file);
            return Err(entry);
        }
        let Ok(ram_pin) = node.ram.open_file(&ram_file) else {
            let _ = node.ram.remove_file(&ram_file);
            drop(sandbox_pin);
            let _ = node.disk.remove_file(&sandbox_file);
            return Err(entry);
        };

        // Pin the image for the lifetime of the run.
        let Ok(image_pin) = node.ram.open_file(&image) else {
            drop(ram_pin);
            let _ = node.ram.remove_file(&ram_file);
            drop(sandbox_pin);
            let _ = node.disk.remove_file(&sandbox_file);
            return Err(entry);
        };

        let run = {
            let handle = entry.handle.clone();
            let input = entry.input.clone();
            let function = Arc::clone(registered.function());
            CustomFunction::new(move || {
                let handle = handle.clone();
                let input = input.clone();
                let function = Arc::clone(&function);
                Box::pin(async move {
                    let output = function.call(input).await?;
                    handle.set_output(output);
                    Ok(())
                })
            })
        };

        self.sequence += 1;
        let job = CompoundJob::new(format!("{}-invocation-{}", self.name, self.sequence));
        let action = match job.add_custom_action(
            &format!("run_{}", registered.name()),
            1,
            0,
            run,
        ) {
            Ok(action) => action,
            Err(_) => {
                drop(image_pin);
                drop(ram_pin);
                let _ = node.ram.remove_file(&ram_file);
                drop(sandbox_pin);
                let _ = node.disk.remove_file(&sandbox_file);
                return Err(entry);
            }
        };

        let spec = ExecutorSpec::new(action.clone(), exec_host)
            .startup_overhead(self.config.container_startup_overhead)
            .timeout(limits.time_limit);
        let executor = match ActionExecutor::spawn(spec, self.clock, self.done_addr.clone()) {
            Ok(executor) => executor,
            Err(cause) => {
                tracing::warn!(service = %self.name, host, cause = %cause, "cannot start invocation");
                drop(image_pin);
                drop(ram_pin);
                let _ = node.ram.remove_file(&ram_file);
                drop(sandbox_pin);
                let _ = node.disk.remove_file(&sandbox_file);
                return Err(entry);
            }
        };

        node.available_cores -= 1;
        entry.handle.mark_started(host, now);
        tracing::info!(
            service = %self.name,
            host,
            function = %registered.name(),
            invocation = %entry.handle.id(),
            "invocation dispatched"
        );
        let pins = SandboxPins {
            host: host.to_string(),
            sandbox_file,
            sandbox_pin,
            ram_file,
            ram_pin,
            image_pin,
        };
        self.running.insert(action, RunningInvocation { entry, pins, executor });
        Ok(())
    }

    fn initiate_loads(&mut self, decisions: &SchedulingDecisions) {
        for (host, image) in &decisions.loads {
            let Some(node) = self.nodes.get_mut(host) else { continue };
            if node.being_loaded.contains(image)
                || node.ram.has_file(image)
                || !node.disk.has_file(image)
            {
                continue;
            }
            node.being_loaded.insert(image.clone());
            let disk = node.disk.clone();
            let ram = node.ram.clone();
            let exec_host = Arc::clone(&node.host);
            let image_for_copy = image.clone();
            self.spawn_helper(
                &format!("load_image_{}_at_{}", image.id(), host),
                Helper::Load { host: host.clone(), image: image.clone() },
                CustomFunction::new(move || {
                    let disk = disk.clone();
                    let ram = ram.clone();
                    let image = image_for_copy.clone();
                    Box::pin(async move { disk.copy_file_to(&image, &ram).await })
                }),
                exec_host,
            );
        }
    }

    fn initiate_copies(&mut self, decisions: &SchedulingDecisions) {
        for (host, image) in &decisions.copies {
            let Some(node) = self.nodes.get_mut(host) else { continue };
            if node.being_copied.contains(image) || node.disk.has_file(image) {
                continue;
            }
            node.being_copied.insert(image.clone());
            let head = self.head.clone();
            let disk = node.disk.clone();
            let exec_host = Arc::clone(&node.host);
            let image_for_copy = image.clone();
            self.spawn_helper(
                &format!("copy_image_{}_to_{}", image.id(), host),
                Helper::Copy { host: host.clone(), image: image.clone() },
                CustomFunction::new(move || {
                    let head = head.clone();
                    let disk = disk.clone();
                    let image = image_for_copy.clone();
                    Box::pin(async move { head.copy_file_to(&image, &disk).await })
                }),
                exec_host,
            );
        }
    }

    fn start_download(&mut self, image: &DataFile) {
        tracing::info!(service = %self.name, image = %image, "image download started");
        let origin = self.origin.clone();
        let head = self.head.clone();
        let image_for_copy = image.clone();
        self.spawn_helper(
            &format!("download_image_{}", image.id()),
            Helper::Download { image: image.clone() },
            CustomFunction::new(move || {
                let origin = origin.clone();
                let head = head.clone();
                let image = image_for_copy.clone();
                Box::pin(async move { origin.copy_file_to(&image, &head).await })
            }),
            Arc::clone(&self.head_host),
        );
    }

    /// Run a transfer as a one-action custom job with an executor.
    fn spawn_helper(
        &mut self,
        label: &str,
        helper: Helper,
        run: CustomFunction,
        host: Arc<ExecutionHost>,
    ) {
        self.sequence += 1;
        let job = CompoundJob::new(format!("{}-helper-{}", self.name, self.sequence));
        let Ok(action) = job.add_custom_action(label, 1, 0, run) else { return };
        let spec = ExecutorSpec::new(action.clone(), host);
        match ActionExecutor::spawn(spec, self.clock, self.done_addr.clone()) {
            Ok(_executor) => {
                self.helpers.insert(action, helper);
            }
            Err(cause) => {
                tracing::warn!(service = %self.name, label, cause = %cause, "helper failed to start");
            }
        }
    }

    /// Returns whether this completion should trigger a scheduling
    /// tick.
    fn on_done(&mut self, done: ExecutorDone) -> bool {
        let success = done.action.state() == ActionState::Completed;
        if let Some(helper) = self.helpers.remove(&done.action) {
            return match helper {
                Helper::Download { image } => {
                    self.on_download_complete(image, success, done.action.failure_cause())
                }
                Helper::Copy { host, image } => {
                    if let Some(node) = self.nodes.get_mut(&host) {
                        node.being_copied.remove(&image);
                    }
                    if !success {
                        tracing::info!(service = %self.name, host, image = %image, "image copy failed");
                    }
                    success
                }
                Helper::Load { host, image } => {
                    if let Some(node) = self.nodes.get_mut(&host) {
                        node.being_loaded.remove(&image);
                    }
                    if !success {
                        tracing::info!(service = %self.name, host, image = %image, "image load failed");
                    }
                    success
                }
            };
        }
        if let Some(running) = self.running.remove(&done.action) {
            self.on_invocation_complete(running, success, done.action.failure_cause());
            return true;
        }
        true
    }

    fn on_download_complete(
        &mut self,
        image: DataFile,
        success: bool,
        cause: Option<FailureCause>,
    ) -> bool {
        self.being_downloaded.remove(&image);
        let mut queue = self.admitted.remove(&image).unwrap_or_default();
        if success {
            tracing::info!(service = %self.name, image = %image, "image downloaded");
            while let Some(entry) = queue.pop_front() {
                self.schedulable.push(entry);
            }
            return true;
        }
        // The origin could not produce the image: fail everything that
        // was waiting on it and give the reserved space back.
        let cause = cause.unwrap_or(FailureCause::FatalFailure);
        tracing::warn!(service = %self.name, image = %image, cause = %cause, "image download failed");
        let _ = self.head.remove_file(&image);
        let now = self.clock.now();
        while let Some(entry) = queue.pop_front() {
            entry.handle.mark_done(false, Some(cause.clone()), now);
            entry.notify.send(Event::FunctionInvocationComplete {
                invocation: entry.handle.id(),
                function: entry.handle.registered_function().name().to_string(),
                success: false,
                cause: Some(cause.clone()),
                date: now,
            });
        }
        true
    }

    fn on_invocation_complete(
        &mut self,
        running: RunningInvocation,
        success: bool,
        cause: Option<FailureCause>,
    ) {
        let RunningInvocation { entry, pins, executor: _ } = running;
        let now = self.clock.now();
        if let Some(node) = self.nodes.get_mut(&pins.host) {
            drop(pins.image_pin);
            drop(pins.ram_pin);
            let _ = node.ram.remove_file(&pins.ram_file);
            drop(pins.sandbox_pin);
            let _ = node.disk.remove_file(&pins.sandbox_file);
            node.available_cores += 1;
        }
        entry.handle.mark_done(success, cause.clone(), now);
        tracing::info!(
            service = %self.name,
            function = %entry.handle.registered_function().name(),
            invocation = %entry.handle.id(),
            success,
            "invocation finished"
        );
        entry.notify.send(Event::FunctionInvocationComplete {
            invocation: entry.handle.id(),
            function: entry.handle.registered_function().name().to_string(),
            success,
            cause,
            date: now,
        });
    }

    /// Fail everything in flight with `ServiceIsDown`.
    fn shutdown(&mut self) {
        tracing::info!(service = %self.name, "serverless scheduler shutting down");
        let now = self.clock.now();
        let cause = FailureCause::ServiceIsDown { service: self.name.clone() };
        let queued: Vec<InvocationEntry> = self
            .new_invocations
            .drain(..)
            .chain(self.admitted.drain().flat_map(|(_, queue)| queue))
            .chain(self.schedulable.drain(..))
            .collect();
        for entry in queued {
            entry.handle.mark_done(false, Some(cause.clone()), now);
            entry.notify.send(Event::FunctionInvocationComplete {
                invocation: entry.handle.id(),
                function: entry.handle.registered_function().name().to_string(),
                success: false,
                cause: Some(cause.clone()),
                date: now,
            });
        }
        for (_, running) in self.running.drain() {
            running.executor.kill(cause.clone());
            running.entry.handle.mark_done(false, Some(cause.clone()), now);
            running.entry.notify.send(Event::FunctionInvocationComplete {
                invocation: running.entry.handle.id(),
                function: running.entry.handle.registered_function().name().to_string(),
                success: false,
                cause: Some(cause.clone()),
                date: now,
            });
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
