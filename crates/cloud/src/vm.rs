// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Virtual machine records.
//!
//! Lifecycle: `Down -> Running` (start binds a hosted execution
//! service) `-> Suspended -> Running -> Down`; destroy is legal only
//! from `Down`. The record keeps its physical-host binding and its
//! share of that host's cores and RAM from creation to destruction.

use gantry_exec::ActionExecutionService;
use serde::Serialize;

/// VM lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Down,
    Running,
    Suspended,
}

gantry_core::simple_display! {
    VmState {
        Down => "down",
        Running => "running",
        Suspended => "suspended",
    }
}

/// One virtual machine, owned by the manager actor.
pub struct VirtualMachine {
    pub name: String,
    pub num_cores: u32,
    pub ram: u64,
    pub physical_host: String,
    pub state: VmState,
    /// The hosted execution service; present while Running or
    /// Suspended.
    pub service: Option<ActionExecutionService>,
}

impl VirtualMachine {
    pub fn new(
        name: impl Into<String>,
        num_cores: u32,
        ram: u64,
        physical_host: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            num_cores,
            ram,
            physical_host: physical_host.into(),
            state: VmState::Down,
            service: None,
        }
    }
}

impl std::fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("host", &self.physical_host)
            .field("cores", &self.num_cores)
            .finish()
    }
}

#[cfg(test)]
#[path = "vm_tests.rs"]
mod tests;
