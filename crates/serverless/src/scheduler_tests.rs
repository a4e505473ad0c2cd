// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::function::{Function, FunctionLimits};
use gantry_core::DataFile;
use std::sync::Arc;

fn registered(image: &DataFile) -> RegisteredFunction {
    let function = Function::new("f", image.clone(), |_| {
        Box::pin(async { Ok(serde_json::json!(null)) })
    });
    RegisteredFunction::new(function, FunctionLimits::new(60.0, 1, 1))
}

fn invocation_view(function: &RegisteredFunction) -> InvocationView {
    InvocationView {
        id: gantry_core::InvocationId::new(),
        function: function.clone(),
    }
}

fn bare_host(name: &str, cores: u32) -> HostView {
    HostView {
        name: name.into(),
        available_cores: cores,
        images_on_disk: Vec::new(),
        images_in_ram: Vec::new(),
        being_copied: Vec::new(),
        being_loaded: Vec::new(),
        free_disk: 1 << 31,
        free_ram: 1 << 30,
    }
}

#[test]
fn starts_where_image_is_hot() {
    let image = DataFile::new("img", 100);
    let function = registered(&image);
    let mut host = bare_host("n1", 2);
    host.images_in_ram.push(image.clone());
    let view = SchedulerView { hosts: vec![host] };

    let schedulable = vec![invocation_view(&function), invocation_view(&function)];
    let decisions = NativeScheduler.schedule(&schedulable, &view);

    assert_eq!(decisions.starts.len(), 2);
    assert!(decisions.copies.is_empty());
    assert!(decisions.loads.is_empty());
}

#[test]
fn respects_core_budget_within_one_tick() {
    let image = DataFile::new("img", 100);
    let function = registered(&image);
    let mut host = bare_host("n1", 1);
    host.images_in_ram.push(image.clone());
    let view = SchedulerView { hosts: vec![host] };

    let schedulable = vec![invocation_view(&function), invocation_view(&function)];
    let decisions = NativeScheduler.schedule(&schedulable, &view);
    // One core: only one start; the second invocation's image is
    // already in RAM so no movement is planned either.
    assert_eq!(decisions.starts.len(), 1);
}

#[test]
fn loads_when_image_only_on_disk() {
    let image = DataFile::new("img", 100);
    let function = registered(&image);
    let mut host = bare_host("n1", 2);
    host.images_on_disk.push(image.clone());
    let view = SchedulerView { hosts: vec![host] };

    let decisions = NativeScheduler.schedule(&[invocation_view(&function)], &view);
    assert!(decisions.starts.is_empty());
    assert_eq!(decisions.loads, vec![("n1".to_string(), image)]);
}

#[test]
fn copies_when_image_is_cold_and_dedups() {
    let image = DataFile::new("img", 100);
    let function = registered(&image);
    let view = SchedulerView { hosts: vec![bare_host("n1", 2), bare_host("n2", 2)] };

    let schedulable = vec![invocation_view(&function), invocation_view(&function)];
    let decisions = NativeScheduler.schedule(&schedulable, &view);
    assert_eq!(decisions.copies.len(), 1);
    assert!(decisions.loads.is_empty());
    assert!(decisions.starts.is_empty());
}

#[test]
fn in_flight_transfers_suppress_duplicates() {
    let image = DataFile::new("img", 100);
    let function = registered(&image);

    let mut copying = bare_host("n1", 2);
    copying.being_copied.push(image.clone());
    let decisions =
        NativeScheduler.schedule(&[invocation_view(&function)], &SchedulerView {
            hosts: vec![copying],
        });
    assert!(decisions.copies.is_empty());

    let mut loading = bare_host("n1", 2);
    loading.images_on_disk.push(image.clone());
    loading.being_loaded.push(image.clone());
    let decisions =
        NativeScheduler.schedule(&[invocation_view(&function)], &SchedulerView {
            hosts: vec![loading],
        });
    assert!(decisions.loads.is_empty());
}

#[test]
fn prefers_least_loaded_hot_host() {
    let image = DataFile::new("img", 100);
    let function = registered(&image);
    let mut busy = bare_host("busy", 1);
    busy.images_in_ram.push(image.clone());
    let mut idle = bare_host("idle", 4);
    idle.images_in_ram.push(image.clone());

    let decisions = NativeScheduler.schedule(
        &[invocation_view(&function)],
        &SchedulerView { hosts: vec![busy, idle] },
    );
    assert_eq!(decisions.starts[0].0, "idle");
}
