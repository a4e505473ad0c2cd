// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action executors: one actor per started action.
//!
//! The executor simulates its action's time cost (compute split across
//! threads, sleep, storage transfer, custom body, MPI co-actors), then
//! reports exactly one [`ExecutorDone`] on its reply address, whatever
//! happened. Kills are asynchronous: the target wakes up, records a
//! terminal state with a cause, and still reports.

use gantry_core::{
    Action, ActionKind, ActionState, FailureCause, FileLocation,
};
use gantry_sim::{
    signal_barrier, Address, ExecutionHost, FileRegistry, PauseGate, SimClock, SimStorage,
    StorageDirectory,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Completion notice: the one message every executor sends on exit.
#[derive(Debug, Clone)]
pub struct ExecutorDone {
    pub action: Action,
}

/// Everything an executor needs to run one action.
pub struct ExecutorSpec {
    pub action: Action,
    /// Host label recorded in history (a VM name, or the physical host).
    pub execution_host: String,
    pub host: Arc<ExecutionHost>,
    pub num_cores: u32,
    pub ram: u64,
    pub thread_startup_overhead: f64,
    pub simulate_computation_as_sleep: bool,
    /// Extra startup cost paid before the work (container cold start).
    pub startup_overhead: f64,
    /// Relative deadline; firing kills the action with `JobTimeout`.
    pub timeout: Option<f64>,
    pub storages: StorageDirectory,
    pub scratch: Option<SimStorage>,
    pub registry: Option<FileRegistry>,
    /// Suspend gate shared by every executor of a suspendable service.
    pub pause: Option<PauseGate>,
}

impl ExecutorSpec {
    pub fn new(action: Action, host: Arc<ExecutionHost>) -> Self {
        let num_cores = action.min_num_cores();
        let ram = action.min_ram();
        Self {
            action,
            execution_host: host.name().to_string(),
            host,
            num_cores,
            ram,
            thread_startup_overhead: 0.0,
            simulate_computation_as_sleep: true,
            startup_overhead: 0.0,
            timeout: None,
            storages: StorageDirectory::new(),
            scratch: None,
            registry: None,
            pause: None,
        }
    }

    gantry_core::setters! {
        into {
            execution_host: String,
        }
        set {
            num_cores: u32,
            ram: u64,
            thread_startup_overhead: f64,
            simulate_computation_as_sleep: bool,
            startup_overhead: f64,
            storages: StorageDirectory,
        }
        option {
            timeout: f64,
            scratch: SimStorage,
            registry: FileRegistry,
            pause: PauseGate,
        }
    }
}

/// Handle to a running executor; used only to kill it.
#[derive(Debug)]
pub struct ActionExecutor {
    token: CancellationToken,
    kill_cause: Arc<Mutex<Option<FailureCause>>>,
    action: Action,
}

impl ActionExecutor {
    /// Validate the resource grant, flip the action to `Started`, and
    /// launch the executor actor.
    pub fn spawn(
        spec: ExecutorSpec,
        clock: SimClock,
        reply: Address<ExecutorDone>,
    ) -> Result<ActionExecutor, FailureCause> {
        let action = spec.action.clone();
        let job_name = action.job().name();

        if spec.num_cores == 0 {
            return Err(FailureCause::invalid_argument(format!(
                "cannot run action {} with zero cores",
                action.name()
            )));
        }
        if spec.num_cores < action.min_num_cores() || spec.num_cores > action.max_num_cores() {
            return Err(FailureCause::invalid_argument(format!(
                "action {} needs [{}, {}] cores, got {}",
                action.name(),
                action.min_num_cores(),
                action.max_num_cores(),
                spec.num_cores
            )));
        }
        if spec.ram < action.min_ram() {
            return Err(FailureCause::NotEnoughResources {
                job: Some(job_name),
                service: spec.execution_host.clone(),
            });
        }
        if !spec.host.is_up() {
            return Err(FailureCause::HostError { host: spec.host.name().to_string() });
        }

        action.begin_execution(
            &spec.execution_host,
            spec.host.name(),
            spec.num_cores,
            spec.ram,
            clock.now(),
        )?;

        tracing::info!(
            action = %action.name(),
            kind = action.kind_label(),
            host = %spec.execution_host,
            cores = spec.num_cores,
            "executor starting"
        );

        let token = CancellationToken::new();
        let kill_cause: Arc<Mutex<Option<FailureCause>>> = Arc::new(Mutex::new(None));
        let task_token = token.clone();
        let task_cause = Arc::clone(&kill_cause);
        tokio::spawn(run(spec, clock, reply, task_token, task_cause));

        Ok(ActionExecutor { token, kill_cause, action })
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Asynchronous kill: the executor wakes up, records `cause`, and
    /// still sends its `ExecutorDone`.
    pub fn kill(&self, cause: FailureCause) {
        *self.kill_cause.lock() = Some(cause);
        self.token.cancel();
    }
}

async fn run(
    spec: ExecutorSpec,
    clock: SimClock,
    reply: Address<ExecutorDone>,
    token: CancellationToken,
    kill_cause: Arc<Mutex<Option<FailureCause>>>,
) {
    let action = spec.action.clone();
    let job_name = action.job().name();
    let timeout = spec.timeout;
    let host = Arc::clone(&spec.host);

    let deadline = async {
        match timeout {
            Some(t) => clock.sleep(t).await,
            None => std::future::pending().await,
        }
    };
    let work = simulate(&spec, clock);
    tokio::pin!(work);

    let outcome: Result<(), FailureCause> = tokio::select! {
        biased;
        _ = token.cancelled() => {
            Err(kill_cause
                .lock()
                .take()
                .unwrap_or(FailureCause::JobKilled { job: job_name.clone() }))
        }
        _ = deadline => Err(FailureCause::JobTimeout { job: job_name.clone() }),
        result = &mut work => result,
    };

    // A dead host surfaces even if the work itself "finished".
    let outcome = match outcome {
        Ok(()) if !host.is_up() => {
            Err(FailureCause::HostError { host: host.name().to_string() })
        }
        other => other,
    };

    let final_state = match &outcome {
        Ok(()) => ActionState::Completed,
        Err(
            FailureCause::JobKilled { .. }
            | FailureCause::JobTimeout { .. }
            | FailureCause::ServiceIsDown { .. },
        ) => ActionState::Killed,
        Err(_) => ActionState::Failed,
    };

    match &outcome {
        Ok(()) => tracing::info!(action = %action.name(), "executor done"),
        Err(cause) => {
            tracing::info!(action = %action.name(), cause = %cause, state = %final_state, "executor terminated")
        }
    }

    if let Err(err) = action.finish_execution(final_state, outcome.err(), clock.now()) {
        tracing::warn!(action = %action.name(), error = %err, "could not record terminal state");
    }

    if reply.send(ExecutorDone { action }).is_err() {
        tracing::debug!(mailbox = %reply.name(), "executor cannot report back");
    }
}

/// Pause-aware sleep.
async fn snooze(clock: SimClock, seconds: f64, gate: &mut Option<PauseGate>) {
    match gate {
        Some(gate) => clock.sleep_pausable(seconds, gate).await,
        None => clock.sleep(seconds).await,
    }
}

async fn simulate(spec: &ExecutorSpec, clock: SimClock) -> Result<(), FailureCause> {
    let mut gate = spec.pause.clone();
    snooze(clock, spec.startup_overhead, &mut gate).await;

    match spec.action.kind() {
        ActionKind::Compute { flops, model, .. } => {
            let work = model.work_per_thread(flops, spec.num_cores);
            if spec.simulate_computation_as_sleep {
                // One sleep: all startup overheads, then the longest thread.
                snooze(
                    clock,
                    spec.num_cores as f64 * spec.thread_startup_overhead,
                    &mut gate,
                )
                .await;
                let longest = work.into_iter().fold(0.0, f64::max);
                snooze(clock, longest / spec.host.flop_rate(), &mut gate).await;
                Ok(())
            } else {
                compute_with_threads(spec, clock, work, &mut gate).await
            }
        }
        ActionKind::Sleep { duration } => {
            snooze(clock, duration, &mut gate).await;
            Ok(())
        }
        ActionKind::FileRead { location, num_bytes } => {
            let storage = resolve_storage(spec, &location)?;
            storage.read_file(location.file(), num_bytes).await
        }
        ActionKind::FileWrite { location } => {
            let storage = resolve_storage(spec, &location)?;
            storage.write_file(location.file()).await
        }
        ActionKind::FileCopy { src, dst } => {
            let src_storage = resolve_storage(spec, &src)?;
            let dst_storage = resolve_storage(spec, &dst)?;
            src_storage.copy_file_to(src.file(), &dst_storage).await
        }
        ActionKind::FileDelete { location } => {
            let storage = resolve_storage(spec, &location)?;
            storage.remove_file(location.file())
        }
        ActionKind::FileRegistryAdd { location } => {
            resolve_registry(spec)?.add_entry(&location);
            Ok(())
        }
        ActionKind::FileRegistryDelete { location } => {
            resolve_registry(spec)?.remove_entry(&location)
        }
        ActionKind::Custom { run, .. } => run.call().await,
        ActionKind::Mpi { num_processes, cores_per_process: _, flops_per_process } => {
            // One co-actor per process, joined at the barrier. Each
            // process's work is charged at the host flop rate.
            let (sender, barrier) = signal_barrier(num_processes as usize);
            let duration = flops_per_process / spec.host.flop_rate();
            let startup = spec.thread_startup_overhead;
            for _ in 0..num_processes {
                let sender = sender.clone();
                let mut process_gate = spec.pause.clone();
                tokio::spawn(async move {
                    snooze(clock, startup + duration, &mut process_gate).await;
                    sender.signal();
                });
            }
            drop(sender);
            if barrier.wait().await {
                Ok(())
            } else {
                Err(FailureCause::ComputeThreadHasDied)
            }
        }
    }
}

/// Compute-thread mode: one actor per core, started sequentially with
/// the per-thread overhead, joined at the barrier.
async fn compute_with_threads(
    spec: &ExecutorSpec,
    clock: SimClock,
    work: Vec<f64>,
    gate: &mut Option<PauseGate>,
) -> Result<(), FailureCause> {
    tracing::debug!(
        action = %spec.action.name(),
        threads = work.len(),
        "launching compute threads"
    );
    let (sender, barrier) = signal_barrier(work.len());
    let flop_rate = spec.host.flop_rate();
    for flops in work {
        snooze(clock, spec.thread_startup_overhead, gate).await;
        let sender = sender.clone();
        let mut thread_gate = spec.pause.clone();
        tokio::spawn(async move {
            snooze(clock, flops / flop_rate, &mut thread_gate).await;
            sender.signal();
        });
    }
    drop(sender);
    if barrier.wait().await {
        Ok(())
    } else {
        Err(FailureCause::ComputeThreadHasDied)
    }
}

fn resolve_storage(
    spec: &ExecutorSpec,
    location: &FileLocation,
) -> Result<SimStorage, FailureCause> {
    match location {
        FileLocation::Service { service, .. } => spec.storages.get(service).ok_or_else(|| {
            FailureCause::invalid_argument(format!("unknown storage service: {service}"))
        }),
        FileLocation::Scratch { .. } => spec.scratch.clone().ok_or_else(|| {
            FailureCause::NotAllowed {
                service: spec.execution_host.clone(),
                reason: "no scratch space bound to this execution".into(),
            }
        }),
    }
}

fn resolve_registry(spec: &ExecutorSpec) -> Result<&FileRegistry, FailureCause> {
    spec.registry.as_ref().ok_or_else(|| FailureCause::NotAllowed {
        service: spec.execution_host.clone(),
        reason: "no file registry configured".into(),
    })
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
