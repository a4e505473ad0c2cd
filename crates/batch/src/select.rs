// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host selection: map a job's geometry onto concrete hosts.
//!
//! All three algorithms either reserve `num_nodes` hosts with
//! `cores_per_node` free cores each and return the allocation, or
//! leave the free-core table exactly as they found it.

use crate::job::Allocation;
use gantry_core::HostSelection;
use indexmap::IndexMap;

/// Rotating pointer for ROUNDROBIN, owned by the scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinPointer(pub usize);

/// Try to reserve an allocation. On success the free-core table is
/// debited; on shortfall it is untouched and `None` is returned.
pub fn select_hosts(
    algorithm: HostSelection,
    free_cores: &mut IndexMap<String, u32>,
    pointer: &mut RoundRobinPointer,
    num_nodes: u32,
    cores_per_node: u32,
    ram_per_node: u64,
) -> Option<Vec<Allocation>> {
    let picked = match algorithm {
        HostSelection::FirstFit => first_fit(free_cores, num_nodes, cores_per_node),
        HostSelection::BestFit => best_fit(free_cores, num_nodes, cores_per_node),
        HostSelection::RoundRobin => round_robin(free_cores, pointer, num_nodes, cores_per_node),
    }?;
    for host in &picked {
        if let Some(free) = free_cores.get_mut(host.as_str()) {
            *free -= cores_per_node;
        }
    }
    Some(
        picked
            .into_iter()
            .map(|host| Allocation { host, num_cores: cores_per_node, ram: ram_per_node })
            .collect(),
    )
}

/// Scan hosts in registration order; take the first N that fit.
fn first_fit(
    free_cores: &IndexMap<String, u32>,
    num_nodes: u32,
    cores_per_node: u32,
) -> Option<Vec<String>> {
    let mut picked = Vec::new();
    for (host, free) in free_cores {
        if *free >= cores_per_node {
            picked.push(host.clone());
            if picked.len() as u32 == num_nodes {
                return Some(picked);
            }
        }
    }
    None
}

/// Repeatedly pick the eligible host leaving the smallest non-negative
/// core slack; ties prefer the larger post-allocation core count, then
/// registration order.
fn best_fit(
    free_cores: &IndexMap<String, u32>,
    num_nodes: u32,
    cores_per_node: u32,
) -> Option<Vec<String>> {
    let mut remaining: IndexMap<&str, u32> =
        free_cores.iter().map(|(h, c)| (h.as_str(), *c)).collect();
    let mut picked = Vec::new();
    while (picked.len() as u32) < num_nodes {
        let mut best: Option<(&str, u32)> = None; // (host, slack)
        for (host, free) in &remaining {
            if *free < cores_per_node {
                continue;
            }
            let slack = free - cores_per_node;
            // Strict inequality keeps registration order on ties.
            if best.map_or(true, |(_, best_slack)| slack < best_slack) {
                best = Some((host, slack));
            }
        }
        let (host, _) = best?;
        let host = host.to_string();
        remaining.shift_remove(host.as_str());
        picked.push(host);
    }
    Some(picked)
}

/// Rotate a pointer over the host table, one placement per host,
/// wrapping; gives up after a full fruitless lap.
fn round_robin(
    free_cores: &IndexMap<String, u32>,
    pointer: &mut RoundRobinPointer,
    num_nodes: u32,
    cores_per_node: u32,
) -> Option<Vec<String>> {
    let hosts: Vec<(&String, u32)> = free_cores.iter().map(|(h, c)| (h, *c)).collect();
    if hosts.is_empty() {
        return None;
    }
    let mut picked: Vec<String> = Vec::new();
    let mut cursor = pointer.0 % hosts.len();
    let mut inspected = 0;
    while (picked.len() as u32) < num_nodes && inspected < hosts.len() {
        let (host, free) = hosts[cursor];
        cursor = (cursor + 1) % hosts.len();
        inspected += 1;
        if free >= cores_per_node && !picked.iter().any(|p| p == host) {
            picked.push(host.clone());
        }
    }
    if (picked.len() as u32) < num_nodes {
        return None;
    }
    pointer.0 = cursor;
    Some(picked)
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
