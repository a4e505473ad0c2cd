// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform model: the simulated hosts services run on.
//!
//! Hosts are registered in a fixed order that host-selection
//! algorithms depend on (FIRSTFIT scans it, ROUNDROBIN rotates over
//! it), so the table is insertion-ordered.

use gantry_core::FailureCause;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One simulated machine: cores, RAM, disks, flop rate, and an on/off
/// switch for failure injection.
#[derive(Debug)]
pub struct ExecutionHost {
    name: String,
    num_cores: u32,
    ram: u64,
    flop_rate: f64,
    disks: IndexMap<String, u64>,
    up: AtomicBool,
}

impl ExecutionHost {
    pub fn new(name: impl Into<String>, num_cores: u32, ram: u64, flop_rate: f64) -> Self {
        Self {
            name: name.into(),
            num_cores,
            ram,
            flop_rate,
            disks: IndexMap::new(),
            up: AtomicBool::new(true),
        }
    }

    /// Attach a disk partition (mount point and capacity in bytes).
    pub fn with_disk(mut self, mount: impl Into<String>, capacity: u64) -> Self {
        self.disks.insert(mount.into(), capacity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_cores(&self) -> u32 {
        self.num_cores
    }

    pub fn ram(&self) -> u64 {
        self.ram
    }

    pub fn flop_rate(&self) -> f64 {
        self.flop_rate
    }

    pub fn disk_capacity(&self, mount: &str) -> Option<u64> {
        self.disks.get(mount).copied()
    }

    pub fn disks(&self) -> impl Iterator<Item = (&str, u64)> {
        self.disks.iter().map(|(m, c)| (m.as_str(), *c))
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Failure injection: executors discover this and surface
    /// `HostError` on exit.
    pub fn turn_off(&self) {
        self.up.store(false, Ordering::SeqCst);
    }

    pub fn turn_on(&self) {
        self.up.store(true, Ordering::SeqCst);
    }
}

/// The registration-ordered host table.
#[derive(Debug, Clone, Default)]
pub struct Platform {
    hosts: IndexMap<String, Arc<ExecutionHost>>,
}

impl Platform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_host(&mut self, host: ExecutionHost) -> Result<Arc<ExecutionHost>, FailureCause> {
        if host.name().is_empty() {
            return Err(FailureCause::invalid_argument("host name cannot be empty"));
        }
        if self.hosts.contains_key(host.name()) {
            return Err(FailureCause::invalid_argument(format!(
                "duplicate host name: {}",
                host.name()
            )));
        }
        let host = Arc::new(host);
        self.hosts.insert(host.name().to_string(), Arc::clone(&host));
        Ok(host)
    }

    pub fn host(&self, name: &str) -> Option<Arc<ExecutionHost>> {
        self.hosts.get(name).cloned()
    }

    pub fn get_host(&self, name: &str) -> Result<Arc<ExecutionHost>, FailureCause> {
        self.host(name)
            .ok_or_else(|| FailureCause::invalid_argument(format!("unknown host: {name}")))
    }

    /// Hosts in registration order.
    pub fn hosts(&self) -> Vec<Arc<ExecutionHost>> {
        self.hosts.values().cloned().collect()
    }

    pub fn num_hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hosts.contains_key(name)
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
