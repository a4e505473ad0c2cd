// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn table(entries: &[(&str, u32)]) -> IndexMap<String, u32> {
    entries.iter().map(|(h, c)| (h.to_string(), *c)).collect()
}

fn hosts_of(allocation: &[Allocation]) -> Vec<&str> {
    allocation.iter().map(|a| a.host.as_str()).collect()
}

#[test]
fn first_fit_takes_registration_order() {
    let mut free = table(&[("h1", 10), ("h2", 10), ("h3", 10)]);
    let mut rr = RoundRobinPointer::default();

    let allocation =
        select_hosts(HostSelection::FirstFit, &mut free, &mut rr, 2, 4, 0).unwrap();
    assert_eq!(hosts_of(&allocation), vec!["h1", "h2"]);
    assert_eq!(free["h1"], 6);
    assert_eq!(free["h2"], 6);
    assert_eq!(free["h3"], 10);
}

#[test]
fn first_fit_skips_busy_hosts() {
    let mut free = table(&[("h1", 2), ("h2", 10), ("h3", 10)]);
    let mut rr = RoundRobinPointer::default();

    let allocation =
        select_hosts(HostSelection::FirstFit, &mut free, &mut rr, 2, 4, 0).unwrap();
    assert_eq!(hosts_of(&allocation), vec!["h2", "h3"]);
    assert_eq!(free["h1"], 2);
}

#[test]
fn first_fit_rolls_back_on_shortfall() {
    let mut free = table(&[("h1", 10), ("h2", 2)]);
    let mut rr = RoundRobinPointer::default();

    assert!(select_hosts(HostSelection::FirstFit, &mut free, &mut rr, 2, 4, 0).is_none());
    assert_eq!(free, table(&[("h1", 10), ("h2", 2)]));
}

#[test]
fn best_fit_minimizes_leftover_cores() {
    let mut free = table(&[("h1", 10), ("h2", 5), ("h3", 4)]);
    let mut rr = RoundRobinPointer::default();

    // Needs 4 cores: h3 leaves 0 slack, h2 leaves 1, h1 leaves 6.
    let allocation =
        select_hosts(HostSelection::BestFit, &mut free, &mut rr, 2, 4, 0).unwrap();
    assert_eq!(hosts_of(&allocation), vec!["h3", "h2"]);
    assert_eq!(free["h3"], 0);
    assert_eq!(free["h2"], 1);
    assert_eq!(free["h1"], 10);
}

#[test]
fn best_fit_breaks_ties_by_registration_order() {
    let mut free = table(&[("h1", 4), ("h2", 4)]);
    let mut rr = RoundRobinPointer::default();

    let allocation =
        select_hosts(HostSelection::BestFit, &mut free, &mut rr, 1, 4, 0).unwrap();
    assert_eq!(hosts_of(&allocation), vec!["h1"]);
}

#[test]
fn round_robin_rotates_across_calls() {
    let mut free = table(&[("h1", 10), ("h2", 10), ("h3", 10)]);
    let mut rr = RoundRobinPointer::default();

    let first = select_hosts(HostSelection::RoundRobin, &mut free, &mut rr, 1, 2, 0).unwrap();
    let second = select_hosts(HostSelection::RoundRobin, &mut free, &mut rr, 1, 2, 0).unwrap();
    let third = select_hosts(HostSelection::RoundRobin, &mut free, &mut rr, 1, 2, 0).unwrap();
    let fourth = select_hosts(HostSelection::RoundRobin, &mut free, &mut rr, 1, 2, 0).unwrap();

    assert_eq!(hosts_of(&first), vec!["h1"]);
    assert_eq!(hosts_of(&second), vec!["h2"]);
    assert_eq!(hosts_of(&third), vec!["h3"]);
    assert_eq!(hosts_of(&fourth), vec!["h1"]);
    assert_eq!(free["h1"], 6);
}

#[test]
fn round_robin_takes_distinct_hosts_for_one_job() {
    let mut free = table(&[("h1", 10), ("h2", 10), ("h3", 10)]);
    let mut rr = RoundRobinPointer::default();

    let allocation =
        select_hosts(HostSelection::RoundRobin, &mut free, &mut rr, 3, 2, 0).unwrap();
    assert_eq!(hosts_of(&allocation), vec!["h1", "h2", "h3"]);
}

#[test]
fn round_robin_fails_without_touching_state() {
    let mut free = table(&[("h1", 1), ("h2", 1)]);
    let mut rr = RoundRobinPointer::default();

    assert!(select_hosts(HostSelection::RoundRobin, &mut free, &mut rr, 1, 4, 0).is_none());
    assert_eq!(free, table(&[("h1", 1), ("h2", 1)]));
    assert_eq!(rr.0, 0);
}

#[test]
fn allocations_carry_ram() {
    let mut free = table(&[("h1", 8)]);
    let mut rr = RoundRobinPointer::default();

    let allocation =
        select_hosts(HostSelection::FirstFit, &mut free, &mut rr, 1, 2, 4096).unwrap();
    assert_eq!(allocation[0].ram, 4096);
    assert_eq!(allocation[0].num_cores, 2);
}
