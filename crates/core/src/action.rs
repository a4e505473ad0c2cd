// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actions: the smallest unit of simulated work.
//!
//! An action lives in its compound job's arena and is referenced from
//! outside through an [`Action`] handle (job + arena index). All state
//! lives behind the job's mutex, which is the per-job monitor: handles
//! are cheap clones, and every read or write takes the lock.
//!
//! State machine: `NotReady -> Ready` (all parents completed),
//! `Ready -> Started`, `Started -> Completed | Failed | Killed`.
//! A new execution record is pushed on every start; a completed action
//! never runs again.

use crate::file::FileLocation;
use crate::job::CompoundJob;
use crate::parallel::ParallelModel;
use crate::FailureCause;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Index of an action inside its job's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub(crate) u32);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Lifecycle state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Blocked on at least one uncompleted parent.
    NotReady,
    /// Eligible for dispatch.
    Ready,
    /// An executor is running it.
    Started,
    /// Ran to completion.
    Completed,
    /// Terminated by a kill (user termination, service shutdown).
    Killed,
    /// Terminated by a failure.
    Failed,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Completed | ActionState::Killed | ActionState::Failed
        )
    }
}

crate::simple_display! {
    ActionState {
        NotReady => "not_ready",
        Ready => "ready",
        Started => "started",
        Completed => "completed",
        Killed => "killed",
        Failed => "failed",
    }
}

/// Future returned by a custom action body.
pub type CustomFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), FailureCause>> + Send>>;

/// User-provided body of a custom action, invoked inside the executor.
#[derive(Clone)]
pub struct CustomFunction(Arc<dyn Fn() -> CustomFuture + Send + Sync>);

impl CustomFunction {
    pub fn new(f: impl Fn() -> CustomFuture + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self) -> CustomFuture {
        (self.0)()
    }
}

impl std::fmt::Debug for CustomFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustomFunction(..)")
    }
}

/// What an action does, with its kind-specific payload.
#[derive(Debug, Clone)]
pub enum ActionKind {
    Compute {
        flops: f64,
        min_cores: u32,
        max_cores: u32,
        min_ram: u64,
        model: ParallelModel,
    },
    Sleep {
        duration: f64,
    },
    FileRead {
        location: FileLocation,
        /// Bytes to read; defaults to the whole file.
        num_bytes: Option<u64>,
    },
    FileWrite {
        location: FileLocation,
    },
    FileCopy {
        src: FileLocation,
        dst: FileLocation,
    },
    FileDelete {
        location: FileLocation,
    },
    FileRegistryAdd {
        location: FileLocation,
    },
    FileRegistryDelete {
        location: FileLocation,
    },
    Custom {
        run: CustomFunction,
        min_cores: u32,
        min_ram: u64,
    },
    Mpi {
        num_processes: u32,
        cores_per_process: u32,
        flops_per_process: f64,
    },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Compute { .. } => "compute",
            ActionKind::Sleep { .. } => "sleep",
            ActionKind::FileRead { .. } => "file_read",
            ActionKind::FileWrite { .. } => "file_write",
            ActionKind::FileCopy { .. } => "file_copy",
            ActionKind::FileDelete { .. } => "file_delete",
            ActionKind::FileRegistryAdd { .. } => "file_registry_add",
            ActionKind::FileRegistryDelete { .. } => "file_registry_delete",
            ActionKind::Custom { .. } => "custom",
            ActionKind::Mpi { .. } => "mpi",
        }
    }

    pub fn min_num_cores(&self) -> u32 {
        match self {
            ActionKind::Compute { min_cores, .. } => *min_cores,
            ActionKind::Custom { min_cores, .. } => (*min_cores).max(1),
            ActionKind::Mpi { num_processes, cores_per_process, .. } => {
                num_processes * cores_per_process
            }
            _ => 1,
        }
    }

    pub fn max_num_cores(&self) -> u32 {
        match self {
            ActionKind::Compute { max_cores, .. } => *max_cores,
            _ => self.min_num_cores(),
        }
    }

    pub fn min_ram(&self) -> u64 {
        match self {
            ActionKind::Compute { min_ram, .. } => *min_ram,
            ActionKind::Custom { min_ram, .. } => *min_ram,
            _ => 0,
        }
    }

    /// Whether any file location of this action resolves to job scratch.
    pub fn uses_scratch(&self) -> bool {
        match self {
            ActionKind::FileRead { location, .. }
            | ActionKind::FileWrite { location }
            | ActionKind::FileDelete { location }
            | ActionKind::FileRegistryAdd { location }
            | ActionKind::FileRegistryDelete { location } => location.uses_scratch(),
            ActionKind::FileCopy { src, dst } => src.uses_scratch() || dst.uses_scratch(),
            _ => false,
        }
    }
}

/// One execution attempt of an action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionExecution {
    pub start_date: f64,
    pub end_date: Option<f64>,
    /// Final state of this attempt; `Started` while still running.
    pub state: ActionState,
    /// Host the action ran on, possibly a virtual one.
    pub execution_host: String,
    /// Physical host underneath.
    pub physical_host: String,
    pub num_cores_allocated: u32,
    pub ram_allocated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_cause: Option<FailureCause>,
}

/// Handle to one action of a compound job.
#[derive(Clone)]
pub struct Action {
    pub(crate) job: CompoundJob,
    pub(crate) id: ActionId,
}

impl Action {
    pub fn name(&self) -> String {
        self.job.inner.lock().action(self.id).name.clone()
    }

    pub fn job(&self) -> CompoundJob {
        self.job.clone()
    }

    pub fn state(&self) -> ActionState {
        self.job.inner.lock().action(self.id).state
    }

    pub fn kind(&self) -> ActionKind {
        self.job.inner.lock().action(self.id).kind.clone()
    }

    pub fn kind_label(&self) -> &'static str {
        self.job.inner.lock().action(self.id).kind.label()
    }

    pub fn priority(&self) -> f64 {
        self.job.inner.lock().action(self.id).priority
    }

    pub fn set_priority(&self, priority: f64) {
        self.job.inner.lock().action_mut(self.id).priority = priority;
    }

    pub fn min_num_cores(&self) -> u32 {
        self.job.inner.lock().action(self.id).kind.min_num_cores()
    }

    pub fn max_num_cores(&self) -> u32 {
        self.job.inner.lock().action(self.id).kind.max_num_cores()
    }

    pub fn min_ram(&self) -> u64 {
        self.job.inner.lock().action(self.id).kind.min_ram()
    }

    pub fn uses_scratch(&self) -> bool {
        self.job.inner.lock().action(self.id).kind.uses_scratch()
    }

    pub fn set_service_arg(&self, key: impl Into<String>, value: impl Into<String>) {
        self.job
            .inner
            .lock()
            .action_mut(self.id)
            .service_args
            .insert(key.into(), value.into());
    }

    pub fn service_arg(&self, key: &str) -> Option<String> {
        self.job.inner.lock().action(self.id).service_args.get(key).cloned()
    }

    pub fn parents(&self) -> Vec<Action> {
        let ids: Vec<ActionId> =
            self.job.inner.lock().action(self.id).parents.iter().copied().collect();
        ids.into_iter().map(|id| Action { job: self.job.clone(), id }).collect()
    }

    pub fn children(&self) -> Vec<Action> {
        let ids: Vec<ActionId> =
            self.job.inner.lock().action(self.id).children.iter().copied().collect();
        ids.into_iter().map(|id| Action { job: self.job.clone(), id }).collect()
    }

    /// Recompute readiness from parent states.
    pub fn update_state(&self) {
        self.job.inner.lock().update_ready(self.id);
    }

    pub fn execution_history(&self) -> Vec<ActionExecution> {
        self.job.inner.lock().action(self.id).history.clone()
    }

    /// The most recent execution record, if the action ever started.
    pub fn current_execution(&self) -> Option<ActionExecution> {
        self.job.inner.lock().action(self.id).history.last().cloned()
    }

    pub fn start_date(&self) -> Option<f64> {
        self.current_execution().map(|r| r.start_date)
    }

    pub fn end_date(&self) -> Option<f64> {
        self.current_execution().and_then(|r| r.end_date)
    }

    pub fn failure_cause(&self) -> Option<FailureCause> {
        self.current_execution().and_then(|r| r.failure_cause)
    }

    /// Executor surface: transition `Ready -> Started` and push a fresh
    /// execution record.
    pub fn begin_execution(
        &self,
        execution_host: &str,
        physical_host: &str,
        num_cores: u32,
        ram: u64,
        now: f64,
    ) -> Result<(), FailureCause> {
        let mut inner = self.job.inner.lock();
        let data = inner.action_mut(self.id);
        match data.state {
            ActionState::Ready => {}
            other => {
                return Err(FailureCause::invalid_argument(format!(
                    "cannot start action {} from state {}",
                    data.name, other
                )));
            }
        }
        data.state = ActionState::Started;
        data.history.push(ActionExecution {
            start_date: now,
            end_date: None,
            state: ActionState::Started,
            execution_host: execution_host.to_string(),
            physical_host: physical_host.to_string(),
            num_cores_allocated: num_cores,
            ram_allocated: ram,
            failure_cause: None,
        });
        Ok(())
    }

    /// Executor surface: close the open execution record with a terminal
    /// state. Completion unlocks children; failure or kill dooms every
    /// descendant that can no longer run.
    pub fn finish_execution(
        &self,
        final_state: ActionState,
        cause: Option<FailureCause>,
        now: f64,
    ) -> Result<(), FailureCause> {
        if !final_state.is_terminal() {
            return Err(FailureCause::invalid_argument(format!(
                "finish_execution requires a terminal state, got {final_state}"
            )));
        }
        let mut inner = self.job.inner.lock();
        {
            let data = inner.action_mut(self.id);
            if data.state != ActionState::Started {
                return Err(FailureCause::invalid_argument(format!(
                    "cannot finish action {} from state {}",
                    data.name, data.state
                )));
            }
            data.state = final_state;
            if let Some(record) = data.history.last_mut() {
                record.end_date = Some(now);
                record.state = final_state;
                record.failure_cause = cause;
            }
        }
        match final_state {
            ActionState::Completed => inner.on_completed(self.id),
            ActionState::Failed | ActionState::Killed => inner.doom_descendants(self.id),
            _ => {}
        }
        Ok(())
    }

    /// Service surface: terminalize an action that never started (its
    /// dispatch was rejected, or its job was torn down first). Failure
    /// and kill doom descendants exactly as a failed execution would.
    pub fn mark_unstarted(&self, state: ActionState) -> Result<(), FailureCause> {
        if !state.is_terminal() {
            return Err(FailureCause::invalid_argument(format!(
                "mark_unstarted requires a terminal state, got {state}"
            )));
        }
        let mut inner = self.job.inner.lock();
        let data = inner.action_mut(self.id);
        if !matches!(data.state, ActionState::NotReady | ActionState::Ready) {
            return Err(FailureCause::invalid_argument(format!(
                "cannot mark action {} terminal from state {}",
                data.name, data.state
            )));
        }
        data.state = state;
        if matches!(state, ActionState::Failed | ActionState::Killed) {
            inner.doom_descendants(self.id);
        }
        Ok(())
    }

    /// Update the physical host of the open execution record (VM
    /// migration while the action runs).
    pub fn relocate(&self, physical_host: &str) {
        let mut inner = self.job.inner.lock();
        let data = inner.action_mut(self.id);
        if data.state == ActionState::Started {
            if let Some(record) = data.history.last_mut() {
                record.physical_host = physical_host.to_string();
            }
        }
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.job == other.job && self.id == other.id
    }
}

impl Eq for Action {}

impl std::hash::Hash for Action {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.job.inner).hash(state);
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
