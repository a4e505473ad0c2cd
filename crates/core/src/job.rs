// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compound jobs: DAGs of actions submitted as a unit.
//!
//! The job owns the action arena; dependency edges are arena indices,
//! so the graph has no cyclic ownership. The job-level terminal state
//! is always derived from action states, never stored independently of
//! them: completed iff every action completed, failed iff some action
//! terminated otherwise and nothing can still progress.

use crate::action::{Action, ActionExecution, ActionId, ActionKind, ActionState, CustomFunction};
use crate::file::FileLocation;
use crate::parallel::ParallelModel;
use crate::{FailureCause, JobId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Lifecycle state of a compound job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotSubmitted,
    Submitted,
    Running,
    Completed,
    Failed,
    /// Removed from its service without a terminal event (silent
    /// termination of a pending job).
    Discontinued,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Discontinued
        )
    }
}

crate::simple_display! {
    JobState {
        NotSubmitted => "not_submitted",
        Submitted => "submitted",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Discontinued => "discontinued",
    }
}

pub(crate) struct ActionData {
    pub(crate) name: String,
    pub(crate) kind: ActionKind,
    pub(crate) priority: f64,
    pub(crate) service_args: HashMap<String, String>,
    pub(crate) parents: BTreeSet<ActionId>,
    pub(crate) children: BTreeSet<ActionId>,
    pub(crate) state: ActionState,
    pub(crate) history: Vec<ActionExecution>,
}

pub(crate) struct JobInner {
    pub(crate) id: JobId,
    pub(crate) name: String,
    pub(crate) state: JobState,
    pub(crate) priority: f64,
    pub(crate) actions: Vec<ActionData>,
    pub(crate) by_name: HashMap<String, ActionId>,
}

impl JobInner {
    pub(crate) fn action(&self, id: ActionId) -> &ActionData {
        &self.actions[id.0 as usize]
    }

    pub(crate) fn action_mut(&mut self, id: ActionId) -> &mut ActionData {
        &mut self.actions[id.0 as usize]
    }

    /// `NotReady -> Ready` when every parent has completed.
    pub(crate) fn update_ready(&mut self, id: ActionId) {
        let data = self.action(id);
        if data.state != ActionState::NotReady {
            return;
        }
        let all_parents_done = data
            .parents
            .iter()
            .all(|p| self.action(*p).state == ActionState::Completed);
        if all_parents_done {
            self.action_mut(id).state = ActionState::Ready;
        }
    }

    pub(crate) fn on_completed(&mut self, id: ActionId) {
        let children: Vec<ActionId> = self.action(id).children.iter().copied().collect();
        for child in children {
            self.update_ready(child);
        }
    }

    /// Mark every not-yet-terminal descendant of a failed/killed action
    /// as failed: with one parent lost they can never become ready.
    pub(crate) fn doom_descendants(&mut self, id: ActionId) {
        let mut stack: Vec<ActionId> = self.action(id).children.iter().copied().collect();
        while let Some(next) = stack.pop() {
            let data = self.action(next);
            if data.state.is_terminal() {
                continue;
            }
            stack.extend(data.children.iter().copied());
            self.action_mut(next).state = ActionState::Failed;
        }
    }

    /// Whether `to` is reachable from `from` along child edges.
    pub(crate) fn reachable(&self, from: ActionId, to: ActionId) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(next) = stack.pop() {
            if next == to {
                return true;
            }
            if seen.insert(next) {
                stack.extend(self.action(next).children.iter().copied());
            }
        }
        false
    }
}

/// A DAG of actions owned and submitted as a unit.
///
/// Cheap to clone; all clones share the same state behind the per-job
/// mutex (the job monitor of the concurrency model).
#[derive(Clone)]
pub struct CompoundJob {
    pub(crate) inner: Arc<Mutex<JobInner>>,
}

impl CompoundJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(JobInner {
                id: JobId::new(),
                name: name.into(),
                state: JobState::NotSubmitted,
                priority: 0.0,
                actions: Vec::new(),
                by_name: HashMap::new(),
            })),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.lock().id
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().state
    }

    /// Service surface: record a lifecycle transition.
    pub fn set_state(&self, state: JobState) {
        self.inner.lock().state = state;
    }

    pub fn priority(&self) -> f64 {
        self.inner.lock().priority
    }

    pub fn set_priority(&self, priority: f64) {
        self.inner.lock().priority = priority;
    }

    fn insert_action(&self, name: &str, kind: ActionKind) -> Result<Action, FailureCause> {
        if name.is_empty() {
            return Err(FailureCause::invalid_argument("action name cannot be empty"));
        }
        let mut inner = self.inner.lock();
        if inner.by_name.contains_key(name) {
            return Err(FailureCause::invalid_argument(format!(
                "job {} already has an action named {}",
                inner.name, name
            )));
        }
        let id = ActionId(inner.actions.len() as u32);
        inner.actions.push(ActionData {
            name: name.to_string(),
            kind,
            priority: 0.0,
            service_args: HashMap::new(),
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            state: ActionState::NotReady,
            history: Vec::new(),
        });
        inner.by_name.insert(name.to_string(), id);
        // No parents yet: immediately eligible.
        inner.update_ready(id);
        Ok(Action { job: self.clone(), id })
    }

    pub fn add_compute_action(
        &self,
        name: &str,
        flops: f64,
        min_cores: u32,
        max_cores: u32,
        min_ram: u64,
        model: ParallelModel,
    ) -> Result<Action, FailureCause> {
        if flops < 0.0 {
            return Err(FailureCause::invalid_argument("flops cannot be negative"));
        }
        if min_cores == 0 || min_cores > max_cores {
            return Err(FailureCause::invalid_argument(format!(
                "invalid core range [{min_cores}, {max_cores}]"
            )));
        }
        self.insert_action(
            name,
            ActionKind::Compute { flops, min_cores, max_cores, min_ram, model },
        )
    }

    pub fn add_sleep_action(&self, name: &str, duration: f64) -> Result<Action, FailureCause> {
        if duration < 0.0 {
            return Err(FailureCause::invalid_argument("sleep duration cannot be negative"));
        }
        self.insert_action(name, ActionKind::Sleep { duration })
    }

    pub fn add_file_read_action(
        &self,
        name: &str,
        location: FileLocation,
        num_bytes: Option<u64>,
    ) -> Result<Action, FailureCause> {
        if let Some(n) = num_bytes {
            if n > location.file().size() {
                return Err(FailureCause::invalid_argument(format!(
                    "cannot read {n} bytes from a {}-byte file",
                    location.file().size()
                )));
            }
        }
        self.insert_action(name, ActionKind::FileRead { location, num_bytes })
    }

    pub fn add_file_write_action(
        &self,
        name: &str,
        location: FileLocation,
    ) -> Result<Action, FailureCause> {
        self.insert_action(name, ActionKind::FileWrite { location })
    }

    pub fn add_file_copy_action(
        &self,
        name: &str,
        src: FileLocation,
        dst: FileLocation,
    ) -> Result<Action, FailureCause> {
        self.insert_action(name, ActionKind::FileCopy { src, dst })
    }

    pub fn add_file_delete_action(
        &self,
        name: &str,
        location: FileLocation,
    ) -> Result<Action, FailureCause> {
        self.insert_action(name, ActionKind::FileDelete { location })
    }

    pub fn add_file_registry_add_action(
        &self,
        name: &str,
        location: FileLocation,
    ) -> Result<Action, FailureCause> {
        self.insert_action(name, ActionKind::FileRegistryAdd { location })
    }

    pub fn add_file_registry_delete_action(
        &self,
        name: &str,
        location: FileLocation,
    ) -> Result<Action, FailureCause> {
        self.insert_action(name, ActionKind::FileRegistryDelete { location })
    }

    pub fn add_custom_action(
        &self,
        name: &str,
        min_cores: u32,
        min_ram: u64,
        run: CustomFunction,
    ) -> Result<Action, FailureCause> {
        self.insert_action(name, ActionKind::Custom { run, min_cores, min_ram })
    }

    pub fn add_mpi_action(
        &self,
        name: &str,
        num_processes: u32,
        cores_per_process: u32,
        flops_per_process: f64,
    ) -> Result<Action, FailureCause> {
        if num_processes == 0 || cores_per_process == 0 {
            return Err(FailureCause::invalid_argument(
                "MPI actions need at least one process and one core per process",
            ));
        }
        self.insert_action(
            name,
            ActionKind::Mpi { num_processes, cores_per_process, flops_per_process },
        )
    }

    /// Establish a happens-before edge: `parent` must complete before
    /// `child` becomes ready.
    pub fn add_dependency(&self, parent: &Action, child: &Action) -> Result<(), FailureCause> {
        if parent.job != *self || child.job != *self {
            return Err(FailureCause::CrossJob {
                a: parent.name(),
                b: child.name(),
            });
        }
        let mut inner = self.inner.lock();
        if parent.id == child.id || inner.reachable(child.id, parent.id) {
            return Err(FailureCause::CycleDetected {
                parent: inner.action(parent.id).name.clone(),
                child: inner.action(child.id).name.clone(),
            });
        }
        inner.action_mut(parent.id).children.insert(child.id);
        inner.action_mut(child.id).parents.insert(parent.id);
        if inner.action(parent.id).state != ActionState::Completed {
            let child_data = inner.action_mut(child.id);
            if child_data.state == ActionState::Ready {
                child_data.state = ActionState::NotReady;
            }
        }
        Ok(())
    }

    pub fn actions(&self) -> Vec<Action> {
        let len = self.inner.lock().actions.len() as u32;
        (0..len).map(|i| Action { job: self.clone(), id: ActionId(i) }).collect()
    }

    pub fn action_by_name(&self, name: &str) -> Option<Action> {
        let id = self.inner.lock().by_name.get(name).copied()?;
        Some(Action { job: self.clone(), id })
    }

    pub fn num_actions(&self) -> usize {
        self.inner.lock().actions.len()
    }

    /// Actions eligible for dispatch, highest priority first (stable
    /// within equal priority).
    pub fn ready_actions(&self) -> Vec<Action> {
        let inner = self.inner.lock();
        let mut ready: Vec<(f64, ActionId)> = inner
            .actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.state == ActionState::Ready)
            .map(|(i, a)| (a.priority, ActionId(i as u32)))
            .collect();
        drop(inner);
        ready.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ready
            .into_iter()
            .map(|(_, id)| Action { job: self.clone(), id })
            .collect()
    }

    /// The derived terminal state, if the job can no longer progress.
    ///
    /// `Completed` iff every action completed; `Failed` iff every action
    /// is terminal and at least one is not completed. `None` while any
    /// action is not-ready, ready, or started.
    pub fn derived_terminal_state(&self) -> Option<JobState> {
        let inner = self.inner.lock();
        let mut all_completed = true;
        for action in &inner.actions {
            if !action.state.is_terminal() {
                return None;
            }
            all_completed &= action.state == ActionState::Completed;
        }
        Some(if all_completed { JobState::Completed } else { JobState::Failed })
    }

    /// First failure cause found in the action history, for job-level
    /// failure events.
    pub fn first_failure_cause(&self) -> Option<FailureCause> {
        let inner = self.inner.lock();
        inner.actions.iter().find_map(|a| {
            if a.state == ActionState::Failed || a.state == ActionState::Killed {
                a.history.last().and_then(|r| r.failure_cause.clone())
            } else {
                None
            }
        })
    }

    /// Service surface: force every unstarted action into a terminal
    /// state (job killed or service shut down before they ran).
    pub fn mark_unstarted_actions(&self, state: ActionState) {
        debug_assert!(state.is_terminal());
        let mut inner = self.inner.lock();
        for action in inner.actions.iter_mut() {
            if matches!(action.state, ActionState::NotReady | ActionState::Ready) {
                action.state = state;
            }
        }
    }
}

impl PartialEq for CompoundJob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for CompoundJob {}

impl std::hash::Hash for CompoundJob {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl std::fmt::Debug for CompoundJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CompoundJob")
            .field("name", &inner.name)
            .field("state", &inner.state)
            .field("actions", &inner.actions.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
