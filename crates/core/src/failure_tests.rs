// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn network_error_accessors() {
    let cause = FailureCause::NetworkError {
        direction: NetworkDirection::Sending,
        fault: NetworkFault::Timeout,
        endpoint: "batch-1".into(),
    };
    assert!(cause.is_timeout());
    assert!(cause.while_sending());
    assert!(!cause.while_receiving());

    let cause = FailureCause::recv_timeout("events");
    assert!(cause.is_timeout());
    assert!(cause.while_receiving());

    let cause = FailureCause::send_failure("events");
    assert!(!cause.is_timeout());
    assert!(cause.while_sending());
}

#[test]
fn non_network_causes_are_not_timeouts() {
    let cause = FailureCause::JobKilled { job: "j1".into() };
    assert!(!cause.is_timeout());
    assert!(!cause.while_sending());
    assert!(!cause.while_receiving());
}

#[yare::parameterized(
    not_enough  = { FailureCause::NotEnoughResources { job: Some("j".into()), service: "batch".into() }, "not enough resources on service batch" },
    killed      = { FailureCause::JobKilled { job: "j1".into() }, "job j1 was killed" },
    timeout     = { FailureCause::JobTimeout { job: "j1".into() }, "job j1 exceeded its wall-time" },
    down        = { FailureCause::ServiceIsDown { service: "cloud".into() }, "service cloud is down" },
    host        = { FailureCause::HostError { host: "h1".into() }, "host h1 failed" },
    fatal       = { FailureCause::FatalFailure, "fatal failure" },
    thread_died = { FailureCause::ComputeThreadHasDied, "a compute thread has died" },
)]
fn cause_display(cause: FailureCause, expected: &str) {
    assert_eq!(cause.to_string(), expected);
}

#[test]
fn cause_serde_round_trip() {
    let cause = FailureCause::FileNotFound {
        file: "image".into(),
        location: "head:/".into(),
    };
    let json = serde_json::to_string(&cause).unwrap();
    let back: FailureCause = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cause);
}

#[test]
fn cause_serde_tags_kind() {
    let cause = FailureCause::invalid_argument("bad -N value");
    let json = serde_json::to_value(&cause).unwrap();
    assert_eq!(json["kind"], "invalid_argument");
    assert_eq!(json["message"], "bad -N value");
}
