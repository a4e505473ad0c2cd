// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn four_host_platform() -> Platform {
    let mut platform = Platform::new();
    for i in 1..=4 {
        platform
            .add_host(ExecutionHost::new(format!("h{i}"), 10, 1 << 34, 1e9))
            .unwrap();
    }
    platform
}

#[test]
fn hosts_keep_registration_order() {
    let platform = four_host_platform();
    let names: Vec<String> =
        platform.hosts().iter().map(|h| h.name().to_string()).collect();
    assert_eq!(names, vec!["h1", "h2", "h3", "h4"]);
    assert_eq!(platform.num_hosts(), 4);
}

#[test]
fn duplicate_hosts_are_rejected() {
    let mut platform = four_host_platform();
    let err = platform.add_host(ExecutionHost::new("h1", 1, 1, 1.0)).unwrap_err();
    assert!(matches!(err, FailureCause::InvalidArgument { .. }));
}

#[test]
fn empty_host_name_is_rejected() {
    let mut platform = Platform::new();
    assert!(platform.add_host(ExecutionHost::new("", 1, 1, 1.0)).is_err());
}

#[test]
fn lookup() {
    let platform = four_host_platform();
    assert!(platform.contains("h2"));
    assert!(platform.host("h5").is_none());
    assert!(platform.get_host("h5").is_err());
    assert_eq!(platform.get_host("h3").unwrap().num_cores(), 10);
}

#[test]
fn host_properties() {
    let host = ExecutionHost::new("h1", 8, 1 << 30, 2e9)
        .with_disk("/", 1 << 31)
        .with_disk("/scratch", 1 << 32);
    assert_eq!(host.num_cores(), 8);
    assert_eq!(host.ram(), 1 << 30);
    assert_eq!(host.flop_rate(), 2e9);
    assert_eq!(host.disk_capacity("/"), Some(1 << 31));
    assert_eq!(host.disk_capacity("/missing"), None);
    assert_eq!(host.disks().count(), 2);
}

#[test]
fn failure_injection() {
    let host = ExecutionHost::new("h1", 1, 1, 1.0);
    assert!(host.is_up());
    host.turn_off();
    assert!(!host.is_up());
    host.turn_on();
    assert!(host.is_up());
}
