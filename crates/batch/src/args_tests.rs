// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn args(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn parses_well_formed_arguments() {
    let parsed =
        BatchArgs::parse(&args(&[("-N", "2"), ("-c", "4"), ("-t", "5")])).unwrap();
    assert_eq!(parsed, BatchArgs::new(2, 4, 5));
    assert_eq!(parsed.wall_time_seconds(), 300.0);
}

#[yare::parameterized(
    missing_nodes = { &[("-c", "4"), ("-t", "5")] },
    missing_cores = { &[("-N", "2"), ("-t", "5")] },
    missing_time  = { &[("-N", "2"), ("-c", "4")] },
)]
fn missing_required_argument_is_invalid(entries: &[(&str, &str)]) {
    let err = BatchArgs::parse(&args(entries)).unwrap_err();
    assert!(matches!(err, FailureCause::InvalidArgument { .. }));
}

#[yare::parameterized(
    garbage_nodes = { "-N", "two" },
    float_cores   = { "-c", "1.5" },
    negative_time = { "-t", "-1" },
    zero_nodes    = { "-N", "0" },
    zero_time     = { "-t", "0" },
    empty_value   = { "-c", "" },
)]
fn malformed_value_is_invalid(key: &str, value: &str) {
    let mut entries = args(&[("-N", "1"), ("-c", "1"), ("-t", "1")]);
    entries.insert(key.to_string(), value.to_string());
    let err = BatchArgs::parse(&entries).unwrap_err();
    assert!(matches!(err, FailureCause::InvalidArgument { .. }));
}

#[test]
fn unknown_argument_is_invalid() {
    let err = BatchArgs::parse(&args(&[("-N", "1"), ("-c", "1"), ("-t", "1"), ("-x", "9")]))
        .unwrap_err();
    assert!(matches!(err, FailureCause::InvalidArgument { .. }));
}
