// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn props(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn defaults() {
    let config = ServiceConfig::from_properties(&HashMap::new()).unwrap();
    assert_eq!(config, ServiceConfig::default());
    assert_eq!(config.batch_scheduling_algorithm, BatchAlgorithm::Fcfs);
    assert_eq!(config.host_selection_algorithm, HostSelection::FirstFit);
    assert!(config.simulate_computation_as_sleep);
    assert_eq!(config.thread_startup_overhead, 0.0);
}

#[test]
fn full_table_parses() {
    let config = ServiceConfig::from_properties(&props(&[
        ("BATCH_SCHEDULING_ALGORITHM", "easy-backfill"),
        ("BATCH_QUEUE_ORDERING_ALGORITHM", "priority"),
        ("HOST_SELECTION_ALGORITHM", "BESTFIT"),
        ("THREAD_STARTUP_OVERHEAD", "0.01"),
        ("SIMULATE_COMPUTATION_AS_SLEEP", "false"),
        ("CONTAINER_STARTUP_OVERHEAD", "1.5"),
        ("CACHING_BEHAVIOR", "NONE"),
        ("SCRATCH_SPACE_BUFFER_SIZE", "1048576"),
    ]))
    .unwrap();

    assert_eq!(config.batch_scheduling_algorithm, BatchAlgorithm::EasyBackfill);
    assert_eq!(config.batch_queue_ordering, QueueOrdering::Priority);
    assert_eq!(config.host_selection_algorithm, HostSelection::BestFit);
    assert_eq!(config.thread_startup_overhead, 0.01);
    assert!(!config.simulate_computation_as_sleep);
    assert_eq!(config.container_startup_overhead, 1.5);
    assert_eq!(config.caching_behavior, CachingBehavior::None);
    assert_eq!(config.scratch_space_buffer_size, 1_048_576);
}

#[test]
fn unknown_key_is_invalid() {
    let err = ServiceConfig::from_properties(&props(&[("NOT_A_KEY", "1")])).unwrap_err();
    assert!(matches!(err, FailureCause::InvalidArgument { .. }));
}

#[yare::parameterized(
    bad_algorithm   = { "BATCH_SCHEDULING_ALGORITHM", "sjf" },
    bad_ordering    = { "BATCH_QUEUE_ORDERING_ALGORITHM", "lifo" },
    bad_selection   = { "HOST_SELECTION_ALGORITHM", "firstfit" },
    bad_overhead    = { "THREAD_STARTUP_OVERHEAD", "-1" },
    nan_overhead    = { "THREAD_STARTUP_OVERHEAD", "abc" },
    bad_bool        = { "SIMULATE_COMPUTATION_AS_SLEEP", "yes" },
    bad_container   = { "CONTAINER_STARTUP_OVERHEAD", "-0.5" },
    bad_caching     = { "CACHING_BEHAVIOR", "lru" },
    bad_buffer      = { "SCRATCH_SPACE_BUFFER_SIZE", "-5" },
)]
fn malformed_values_are_invalid(key: &str, value: &str) {
    let err = ServiceConfig::from_properties(&props(&[(key, value)])).unwrap_err();
    assert!(matches!(err, FailureCause::InvalidArgument { .. }));
}

#[yare::parameterized(
    fcfs         = { "fcfs", BatchAlgorithm::Fcfs },
    filler       = { "filler", BatchAlgorithm::Filler },
    easy         = { "easy-backfill", BatchAlgorithm::EasyBackfill },
    conservative = { "conservative-backfill", BatchAlgorithm::ConservativeBackfill },
)]
fn batch_algorithm_round_trips(text: &str, parsed: BatchAlgorithm) {
    assert_eq!(text.parse::<BatchAlgorithm>().unwrap(), parsed);
    assert_eq!(parsed.to_string(), text);
}

#[yare::parameterized(
    first_fit   = { "FIRSTFIT", HostSelection::FirstFit },
    best_fit    = { "BESTFIT", HostSelection::BestFit },
    round_robin = { "ROUNDROBIN", HostSelection::RoundRobin },
)]
fn host_selection_round_trips(text: &str, parsed: HostSelection) {
    assert_eq!(text.parse::<HostSelection>().unwrap(), parsed);
    assert_eq!(parsed.to_string(), text);
}
