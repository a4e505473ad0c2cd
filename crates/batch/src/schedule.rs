// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch policies: which queued jobs start now.
//!
//! Backfilling needs to reason about the future, and the only future a
//! batch scheduler can trust is wall-time: a running job's resources
//! come back no later than its deadline. [`Projection`] models per-host
//! free cores over that horizon; the policies plan against it, placing
//! tentative reservations so later decisions respect earlier ones.

use gantry_core::BatchAlgorithm;
use indexmap::IndexMap;

/// The scheduling-relevant view of one queued job.
#[derive(Debug, Clone, Copy)]
pub struct QueuedJob {
    pub id: u64,
    pub num_nodes: u32,
    pub cores_per_node: u32,
    pub wall_time: f64,
}

/// A running job's future release: its allocation comes back at the
/// wall deadline.
#[derive(Debug, Clone)]
pub struct FutureRelease {
    pub deadline: f64,
    /// (host, cores) pairs.
    pub allocation: Vec<(String, u32)>,
}

/// Everything a policy sees.
pub struct PlanInput<'a> {
    /// Pending jobs in queue order (already priority-sorted if the
    /// queue ordering says so).
    pub queue: &'a [QueuedJob],
    pub free_cores: &'a IndexMap<String, u32>,
    pub running: &'a [FutureRelease],
    pub now: f64,
}

/// A dispatch policy plans which queued jobs start this tick.
///
/// This is the seam an external scheduler adapter plugs into; the
/// native policy below covers the built-in algorithms.
pub trait DispatchPolicy: Send {
    /// Ids of jobs to dispatch now, in dispatch order.
    fn plan(&self, input: &PlanInput<'_>) -> Vec<u64>;
}

/// The built-in algorithms.
pub struct NativePolicy {
    pub algorithm: BatchAlgorithm,
}

impl DispatchPolicy for NativePolicy {
    fn plan(&self, input: &PlanInput<'_>) -> Vec<u64> {
        let mut projection = Projection::from_input(input);
        match self.algorithm {
            BatchAlgorithm::Fcfs => plan_fcfs(input, &mut projection),
            BatchAlgorithm::Filler => plan_filler(input, &mut projection),
            BatchAlgorithm::EasyBackfill => plan_easy(input, &mut projection),
            BatchAlgorithm::ConservativeBackfill => plan_conservative(input, &mut projection),
        }
    }
}

/// Strict order: only the head may start; stop at the first job that
/// does not fit.
fn plan_fcfs(input: &PlanInput<'_>, projection: &mut Projection) -> Vec<u64> {
    let mut planned = Vec::new();
    for job in input.queue {
        match projection.fit_at(input.now, job.num_nodes, job.cores_per_node, job.wall_time) {
            Some(hosts) => {
                projection.place(&hosts, job.cores_per_node, input.now, job.wall_time);
                planned.push(job.id);
            }
            None => break,
        }
    }
    planned
}

/// Greedy: start anything that fits, in queue order.
fn plan_filler(input: &PlanInput<'_>, projection: &mut Projection) -> Vec<u64> {
    let mut planned = Vec::new();
    for job in input.queue {
        if let Some(hosts) =
            projection.fit_at(input.now, job.num_nodes, job.cores_per_node, job.wall_time)
        {
            projection.place(&hosts, job.cores_per_node, input.now, job.wall_time);
            planned.push(job.id);
        }
    }
    planned
}

/// EASY backfilling: the head job holds a reservation at its earliest
/// start; later jobs may start now only if they leave that reservation
/// intact.
fn plan_easy(input: &PlanInput<'_>, projection: &mut Projection) -> Vec<u64> {
    let mut planned = Vec::new();
    let mut queue = input.queue;
    // Pop every head that starts immediately.
    while let Some(job) = queue.first() {
        match projection.fit_at(input.now, job.num_nodes, job.cores_per_node, job.wall_time) {
            Some(hosts) => {
                projection.place(&hosts, job.cores_per_node, input.now, job.wall_time);
                planned.push(job.id);
                queue = &queue[1..];
            }
            None => break,
        }
    }
    let Some(head) = queue.first() else { return planned };
    // Reserve the head's earliest slot; backfill against it.
    if let Some((shadow, hosts)) =
        projection.earliest_fit(input.now, head.num_nodes, head.cores_per_node, head.wall_time)
    {
        projection.place(&hosts, head.cores_per_node, shadow, head.wall_time);
    }
    for job in &queue[1..] {
        if let Some(hosts) =
            projection.fit_at(input.now, job.num_nodes, job.cores_per_node, job.wall_time)
        {
            projection.place(&hosts, job.cores_per_node, input.now, job.wall_time);
            planned.push(job.id);
        }
    }
    planned
}

/// Conservative backfilling: every queued job gets a reservation at
/// its earliest start given all earlier reservations; whoever's
/// reservation is "now" starts.
fn plan_conservative(input: &PlanInput<'_>, projection: &mut Projection) -> Vec<u64> {
    let mut planned = Vec::new();
    for job in input.queue {
        let Some((start, hosts)) =
            projection.earliest_fit(input.now, job.num_nodes, job.cores_per_node, job.wall_time)
        else {
            continue;
        };
        projection.place(&hosts, job.cores_per_node, start, job.wall_time);
        if start == input.now {
            planned.push(job.id);
        }
    }
    planned
}

/// Per-host free-core timelines over the wall-time horizon.
pub struct Projection {
    names: Vec<String>,
    base: Vec<i64>,
    /// Per host: (time, core delta) events, unsorted.
    events: Vec<Vec<(f64, i64)>>,
}

impl Projection {
    pub fn from_input(input: &PlanInput<'_>) -> Self {
        let mut projection = Self::new(input.free_cores);
        for release in input.running {
            for (host, cores) in &release.allocation {
                projection.add_release(host, *cores, release.deadline);
            }
        }
        projection
    }

    pub fn new(free_cores: &IndexMap<String, u32>) -> Self {
        Self {
            names: free_cores.keys().cloned().collect(),
            base: free_cores.values().map(|c| *c as i64).collect(),
            events: vec![Vec::new(); free_cores.len()],
        }
    }

    /// A running job's cores come back at `at`.
    pub fn add_release(&mut self, host: &str, cores: u32, at: f64) {
        if let Some(idx) = self.names.iter().position(|n| n == host) {
            self.events[idx].push((at, cores as i64));
        }
    }

    fn free_at(&self, host: usize, t: f64) -> i64 {
        self.base[host]
            + self.events[host]
                .iter()
                .filter(|(time, _)| *time <= t)
                .map(|(_, delta)| delta)
                .sum::<i64>()
    }

    /// Minimum free cores on `host` over `[start, end)`.
    fn min_free_over(&self, host: usize, start: f64, end: f64) -> i64 {
        let mut min = self.free_at(host, start);
        for (time, _) in &self.events[host] {
            if *time > start && *time < end {
                min = min.min(self.free_at(host, *time));
            }
        }
        min
    }

    /// Hosts (registration order) that can hold `cores` for
    /// `duration` starting at `t`; `None` unless at least `nodes` can.
    pub fn fit_at(&self, t: f64, nodes: u32, cores: u32, duration: f64) -> Option<Vec<usize>> {
        let mut fitting = Vec::new();
        for host in 0..self.names.len() {
            if self.min_free_over(host, t, t + duration) >= cores as i64 {
                fitting.push(host);
                if fitting.len() as u32 == nodes {
                    return Some(fitting);
                }
            }
        }
        None
    }

    /// The earliest date ≥ `not_before` at which the job fits.
    pub fn earliest_fit(
        &self,
        not_before: f64,
        nodes: u32,
        cores: u32,
        duration: f64,
    ) -> Option<(f64, Vec<usize>)> {
        let mut candidates: Vec<f64> = vec![not_before];
        for host_events in &self.events {
            for (time, _) in host_events {
                if *time > not_before {
                    candidates.push(*time);
                }
            }
        }
        candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        candidates.dedup();
        for t in candidates {
            if let Some(hosts) = self.fit_at(t, nodes, cores, duration) {
                return Some((t, hosts));
            }
        }
        None
    }

    /// Occupy `cores` on the given hosts during `[start, start+duration)`.
    pub fn place(&mut self, hosts: &[usize], cores: u32, start: f64, duration: f64) {
        for &host in hosts {
            self.events[host].push((start, -(cores as i64)));
            self.events[host].push((start + duration, cores as i64));
        }
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
