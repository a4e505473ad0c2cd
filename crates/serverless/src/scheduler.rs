// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The invocation-scheduling seam.
//!
//! Each tick the service hands the scheduler the schedulable
//! invocations and a snapshot of the system; the scheduler answers
//! with three lists: images to copy (head → node disk), images to
//! load (node disk → node RAM), and invocations to start. The service
//! implements those decisions as far as reality allows.

use crate::function::RegisteredFunction;
use gantry_core::{DataFile, InvocationId};
use std::collections::HashSet;

/// A schedulable invocation, as the scheduler sees it.
#[derive(Debug, Clone)]
pub struct InvocationView {
    pub id: InvocationId,
    pub function: RegisteredFunction,
}

impl InvocationView {
    pub fn image(&self) -> &DataFile {
        self.function.image()
    }
}

/// One compute node, as the scheduler sees it.
#[derive(Debug, Clone)]
pub struct HostView {
    pub name: String,
    pub available_cores: u32,
    pub images_on_disk: Vec<DataFile>,
    pub images_in_ram: Vec<DataFile>,
    pub being_copied: Vec<DataFile>,
    pub being_loaded: Vec<DataFile>,
    pub free_disk: u64,
    pub free_ram: u64,
}

impl HostView {
    pub fn has_on_disk(&self, image: &DataFile) -> bool {
        self.images_on_disk.contains(image)
    }

    pub fn has_in_ram(&self, image: &DataFile) -> bool {
        self.images_in_ram.contains(image)
    }

    pub fn is_copying(&self, image: &DataFile) -> bool {
        self.being_copied.contains(image)
    }

    pub fn is_loading(&self, image: &DataFile) -> bool {
        self.being_loaded.contains(image)
    }
}

/// System snapshot handed to the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerView {
    pub hosts: Vec<HostView>,
}

/// What the scheduler wants done this tick.
#[derive(Debug, Clone, Default)]
pub struct SchedulingDecisions {
    /// Images to copy from head storage to a node's disk.
    pub copies: Vec<(String, DataFile)>,
    /// Images to load from a node's disk into its RAM.
    pub loads: Vec<(String, DataFile)>,
    /// Invocations to start, in order.
    pub starts: Vec<(String, InvocationId)>,
}

/// Pluggable invocation scheduler. The native implementation below is
/// the default; an external scheduler adapter implements this trait.
pub trait InvocationScheduler: Send + Sync {
    fn schedule(
        &self,
        schedulable: &[InvocationView],
        view: &SchedulerView,
    ) -> SchedulingDecisions;
}

/// Default policy: start where the image is already hot, otherwise
/// move the image one tier closer (disk → RAM, else head → disk of
/// the emptiest node).
#[derive(Debug, Default)]
pub struct NativeScheduler;

impl InvocationScheduler for NativeScheduler {
    fn schedule(
        &self,
        schedulable: &[InvocationView],
        view: &SchedulerView,
    ) -> SchedulingDecisions {
        let mut decisions = SchedulingDecisions::default();
        let mut cores: Vec<u32> = view.hosts.iter().map(|h| h.available_cores).collect();
        let mut planned_copies: HashSet<(String, String)> = HashSet::new();
        let mut planned_loads: HashSet<(String, String)> = HashSet::new();

        for invocation in schedulable {
            let image = invocation.image();

            // Start wherever the image is hot and a core is free.
            if let Some(idx) = view
                .hosts
                .iter()
                .enumerate()
                .filter(|(idx, host)| host.has_in_ram(image) && cores[*idx] > 0)
                .max_by_key(|(idx, _)| cores[*idx])
                .map(|(idx, _)| idx)
            {
                cores[idx] -= 1;
                decisions
                    .starts
                    .push((view.hosts[idx].name.clone(), invocation.id));
                continue;
            }

            // Warm a node that has the image on disk.
            if let Some(host) = view
                .hosts
                .iter()
                .find(|host| host.has_on_disk(image) && !host.is_loading(image))
            {
                let key = (host.name.clone(), image.id().to_string());
                if planned_loads.insert(key) {
                    decisions.loads.push((host.name.clone(), image.clone()));
                }
                continue;
            }

            // Image is nowhere near a node yet: copy to the node with
            // the most free disk, unless a copy is already on the way.
            if view.hosts.iter().any(|host| host.is_copying(image)) {
                continue;
            }
            if let Some(host) = view.hosts.iter().max_by_key(|host| host.free_disk) {
                let key = (host.name.clone(), image.id().to_string());
                if planned_copies.insert(key) {
                    decisions.copies.push((host.name.clone(), image.clone()));
                }
            }
        }
        decisions
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
