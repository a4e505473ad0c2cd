// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenario tests: whole services wired together on a
//! simulated platform, driven through the public submitter surface
//! and observed only through events.

use gantry_batch::{BatchScheduler, BatchSpec, PilotJob};
use gantry_cloud::{CloudSpec, CloudVMManager, VmState};
use gantry_core::{
    event_channel, ActionState, CachingBehavior, CompoundJob, DataFile, Event, EventKind,
    EventQueue, FailureCause, ParallelModel,
};
use gantry_serverless::{
    Function, FunctionLimits, ServerlessScheduler, ServerlessSpec,
};
use gantry_sim::{ExecutionHost, Platform, SimClock, SimStorage};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const GIB: u64 = 1 << 30;
const MIB: u64 = 1 << 20;

fn cluster(platform: &mut Platform, num_hosts: u32, cores: u32) -> Vec<Arc<ExecutionHost>> {
    (1..=num_hosts)
        .map(|i| {
            platform
                .add_host(
                    ExecutionHost::new(format!("h{i}"), cores, 16 * GIB, 1e9)
                        .with_disk("/", 64 * GIB),
                )
                .unwrap()
        })
        .collect()
}

fn batch_args(n: u32, c: u32, t: u64) -> HashMap<String, String> {
    [
        ("-N".to_string(), n.to_string()),
        ("-c".to_string(), c.to_string()),
        ("-t".to_string(), t.to_string()),
    ]
    .into_iter()
    .collect()
}

async fn next_event(events: &mut EventQueue) -> Event {
    events.next_with_timeout(100_000.0).await.unwrap()
}

/// One standard job through the batch service.
#[tokio::test(start_paused = true)]
async fn batch_runs_a_single_standard_job() {
    let clock = SimClock::new();
    let mut platform = Platform::new();
    let hosts = cluster(&mut platform, 4, 10);
    let scheduler = BatchScheduler::start(BatchSpec::new(hosts), clock).unwrap();
    let (notify, mut events) = event_channel();

    let job = CompoundJob::new("analysis");
    // 120e9 flops across 2 cores at 1e9 flops/s each: 60 seconds.
    let action = job
        .add_compute_action("task", 120e9, 2, 2, 0, ParallelModel::amdahl(1.0).unwrap())
        .unwrap();
    scheduler
        .submit(job.clone(), &batch_args(2, 4, 5), notify)
        .await
        .unwrap();

    // While running: exactly two hosts have 4 cores in use.
    clock.sleep(1.0).await;
    let resources = scheduler.resources().await.unwrap();
    let busy = resources.free_cores.iter().filter(|(_, c)| *c == 6).count();
    let idle = resources.free_cores.iter().filter(|(_, c)| *c == 10).count();
    assert_eq!((busy, idle), (2, 2), "free cores: {:?}", resources.free_cores);

    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::StandardJobCompleted);
    let date = event.date();
    assert!((59.9..60.5).contains(&date), "date = {date}");

    let record = action.current_execution().unwrap();
    assert_eq!(record.state, ActionState::Completed);
    assert_eq!(record.num_cores_allocated, 2);
}

/// Queueing plus termination of a pending and a running job.
#[tokio::test(start_paused = true)]
async fn batch_queue_with_terminations() {
    let clock = SimClock::new();
    let mut platform = Platform::new();
    let hosts = cluster(&mut platform, 4, 10);
    let scheduler = BatchScheduler::start(BatchSpec::new(hosts), clock).unwrap();
    let (notify, mut events) = event_channel();

    let mut jobs = Vec::new();
    for i in 1..=3 {
        let job = CompoundJob::new(format!("job-{i}"));
        job.add_sleep_action("work", 60.0).unwrap();
        scheduler
            .submit(job.clone(), &batch_args(4, 10, 5), notify.clone())
            .await
            .unwrap();
        jobs.push(job);
    }

    clock.sleep(1.0).await;
    scheduler.terminate(&jobs[1]).await.unwrap(); // pending
    scheduler.terminate(&jobs[0]).await.unwrap(); // running

    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::StandardJobCompleted);
    match &event {
        Event::StandardJobCompleted { job, date } => {
            assert_eq!(*job, jobs[2]);
            assert!((60.9..61.5).contains(date), "date = {date}");
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Terminated jobs are silent; their history shows the kill.
    assert!(events.next_with_timeout(300.0).await.is_err());
    let killed = jobs[0].action_by_name("work").unwrap();
    assert_eq!(killed.state(), ActionState::Killed);
    assert!(matches!(killed.failure_cause(), Some(FailureCause::JobKilled { .. })));
}

/// A pilot job hosting a standard job, terminated mid-flight.
#[tokio::test(start_paused = true)]
async fn pilot_hosting_a_standard_job_is_terminated() {
    let clock = SimClock::new();
    let mut platform = Platform::new();
    let hosts = cluster(&mut platform, 2, 4);
    let scheduler = BatchScheduler::start(BatchSpec::new(hosts), clock).unwrap();
    let (notify, mut events) = event_channel();

    let pilot = PilotJob::new("pilot-1");
    scheduler
        .submit_pilot(pilot.clone(), &batch_args(1, 4, 2), notify)
        .await
        .unwrap();

    let started = next_event(&mut events).await;
    assert_eq!(started.kind(), EventKind::PilotJobStarted);

    let inner = CompoundJob::new("inner");
    let action = inner.add_sleep_action("work", 60.0).unwrap();
    action.set_priority(1.0);
    pilot.submit_job(inner.clone()).unwrap();

    clock.sleep(10.0).await;
    scheduler.terminate_pilot(&pilot).await.unwrap();

    let failed = next_event(&mut events).await;
    assert_eq!(failed.kind(), EventKind::StandardJobFailed);
    assert!(matches!(failed.failure_cause(), Some(FailureCause::JobKilled { .. })));

    let expired = next_event(&mut events).await;
    assert_eq!(expired.kind(), EventKind::PilotJobExpired);
    assert_eq!(action.state(), ActionState::Killed);
}

/// Serverless cold start: download, copy, load, then three
/// invocations with at most two concurrent.
#[tokio::test(start_paused = true)]
async fn serverless_cold_start_path() {
    let clock = SimClock::new();
    let image = DataFile::new("image-f", GIB);
    let origin =
        SimStorage::new("origin", "/", 64 * GIB, 1e9, CachingBehavior::None, clock).unwrap();
    origin.create_file(&image).unwrap();

    let node = Arc::new(ExecutionHost::new("n1", 2, 2 * GIB, 1e9).with_disk("/", 2 * GIB));
    let spec = ServerlessSpec::new(vec![node], origin).head_storage_size(4 * GIB);
    let service = ServerlessScheduler::start(spec, clock).unwrap();
    let (notify, mut events) = event_channel();

    let body_clock = clock;
    let function = Function::new("f", image, move |_input| {
        Box::pin(async move {
            body_clock.sleep(5.0).await;
            Ok(json!("ok"))
        })
    });
    let registered = service
        .register_function(function, FunctionLimits::new(3600.0, 128 * MIB, 256 * MIB))
        .await
        .unwrap();

    let mut invocations = Vec::new();
    for _ in 0..3 {
        invocations.push(
            service
                .invoke_function(&registered, json!({}), notify.clone())
                .await
                .unwrap(),
        );
    }

    for _ in 0..3 {
        let event = next_event(&mut events).await;
        match event {
            Event::FunctionInvocationComplete { success, cause, .. } => {
                assert!(success, "cause: {cause:?}");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // At most two concurrent: the third started only after a core
    // freed up.
    let mut starts: Vec<f64> = invocations
        .iter()
        .map(|i| i.start_date().unwrap())
        .collect();
    starts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!(starts[2] >= starts[0] + 4.9, "starts = {starts:?}");

    // The cold-start path was paid once: every invocation ran on the
    // node, and the final core count is back to 2.
    for invocation in &invocations {
        assert_eq!(invocation.target_host().as_deref(), Some("n1"));
        assert_eq!(invocation.output(), Some(json!("ok")));
    }
    let cores = service.available_cores().await.unwrap();
    assert_eq!(cores, vec![("n1".to_string(), 2)]);
}

/// VM migration under load with conserved accounting.
#[tokio::test(start_paused = true)]
async fn vm_migration_under_load() {
    let clock = SimClock::new();
    let mut platform = Platform::new();
    let hosts = cluster(&mut platform, 2, 10);
    let manager = CloudVMManager::start(CloudSpec::new(hosts), clock).unwrap();
    let (notify, mut events) = event_channel();

    let vm = manager.create_vm(4, GIB, Some("h1")).await.unwrap();
    manager.start_vm(&vm).await.unwrap();
    assert_eq!(manager.vm_state(&vm).await.unwrap(), VmState::Running);

    let job = CompoundJob::new("vm-job");
    let action = job
        .add_compute_action("task", 240e9, 4, 4, 0, ParallelModel::amdahl(1.0).unwrap())
        .unwrap();
    manager.submit_job(&vm, job, notify).await.unwrap();

    let check_invariant = |usage: &[gantry_cloud::HostUsage]| {
        for host in usage {
            assert!(host.used_cores <= host.total_cores);
            assert!(host.used_ram <= host.total_ram);
        }
    };

    clock.sleep(10.0).await;
    check_invariant(&manager.usage().await.unwrap());
    manager.migrate_vm(&vm, "h2").await.unwrap();

    let usage = manager.usage().await.unwrap();
    check_invariant(&usage);
    let h1 = usage.iter().find(|u| u.host == "h1").unwrap();
    let h2 = usage.iter().find(|u| u.host == "h2").unwrap();
    assert_eq!(h1.used_cores, 0);
    assert_eq!(h2.used_cores, 4);

    // 240e9 flops over 4 cores at 1e9: 60 seconds.
    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::CompoundJobCompleted);
    let date = event.date();
    assert!((59.9..60.5).contains(&date), "date = {date}");

    let record = action.current_execution().unwrap();
    assert_eq!(record.physical_host, "h2");
    assert_eq!(record.execution_host, vm);
}

/// Wall-time enforcement.
#[tokio::test(start_paused = true)]
async fn batch_enforces_wall_time() {
    let clock = SimClock::new();
    let mut platform = Platform::new();
    let hosts = cluster(&mut platform, 1, 4);
    let scheduler = BatchScheduler::start(BatchSpec::new(hosts), clock).unwrap();
    let (notify, mut events) = event_channel();

    let job = CompoundJob::new("late");
    job.add_sleep_action("task", 65.0).unwrap();
    scheduler.submit(job, &batch_args(1, 4, 1), notify).await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::StandardJobFailed);
    assert!(matches!(event.failure_cause(), Some(FailureCause::JobTimeout { .. })));
    let date = event.date();
    assert!((59.9..60.5).contains(&date), "date = {date}");
}

/// Boundary: a full-cluster job dispatches immediately; one node more
/// is a synchronous rejection; two full-size jobs serialize.
#[tokio::test(start_paused = true)]
async fn boundary_full_cluster_geometry() {
    let clock = SimClock::new();
    let mut platform = Platform::new();
    let hosts = cluster(&mut platform, 4, 10);
    let scheduler = BatchScheduler::start(BatchSpec::new(hosts), clock).unwrap();
    let (notify, mut events) = event_channel();

    let too_big = CompoundJob::new("too-big");
    too_big.add_sleep_action("t", 1.0).unwrap();
    let err = scheduler
        .submit(too_big, &batch_args(5, 10, 1), notify.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, FailureCause::NotEnoughResources { .. }));

    for name in ["exact-1", "exact-2"] {
        let job = CompoundJob::new(name);
        job.add_sleep_action("t", 55.0).unwrap();
        scheduler
            .submit(job, &batch_args(4, 10, 1), notify.clone())
            .await
            .unwrap();
    }

    let first = next_event(&mut events).await;
    let first_date = first.date();
    assert!((54.9..55.4).contains(&first_date), "date = {first_date}");
    let second = next_event(&mut events).await;
    let second_date = second.date();
    assert!((109.9..110.6).contains(&second_date), "date = {second_date}");
}

/// Round trip: createVM; destroyVM returns the host to its prior
/// core/RAM state, and suspend;resume shifts completion by exactly
/// the suspension.
#[tokio::test(start_paused = true)]
async fn vm_round_trip_laws() {
    let clock = SimClock::new();
    let mut platform = Platform::new();
    let hosts = cluster(&mut platform, 2, 10);
    let manager = CloudVMManager::start(CloudSpec::new(hosts), clock).unwrap();

    let before = manager.usage().await.unwrap();
    let vm = manager.create_vm(6, 2 * GIB, None).await.unwrap();
    manager.destroy_vm(&vm).await.unwrap();
    let after = manager.usage().await.unwrap();
    assert_eq!(before, after);

    // Suspension shift, against a never-suspended baseline of 40s.
    let (notify, mut events) = event_channel();
    let vm = manager.create_vm(2, GIB, None).await.unwrap();
    manager.start_vm(&vm).await.unwrap();
    let job = CompoundJob::new("baseline");
    job.add_sleep_action("s", 40.0).unwrap();
    let t0 = clock.now();
    manager.submit_job(&vm, job, notify.clone()).await.unwrap();
    let baseline = next_event(&mut events).await.date() - t0;

    let job = CompoundJob::new("suspended");
    job.add_sleep_action("s", 40.0).unwrap();
    let t1 = clock.now();
    manager.submit_job(&vm, job, notify).await.unwrap();
    clock.sleep(10.0).await;
    manager.suspend_vm(&vm).await.unwrap();
    clock.sleep(15.0).await;
    manager.resume_vm(&vm).await.unwrap();
    let shifted = next_event(&mut events).await.date() - t1;

    let delta = shifted - baseline;
    assert!((14.8..15.3).contains(&delta), "delta = {delta}");
}

/// Every submitted job produces exactly one terminal event.
#[tokio::test(start_paused = true)]
async fn one_terminal_event_per_job() {
    let clock = SimClock::new();
    let mut platform = Platform::new();
    let hosts = cluster(&mut platform, 2, 4);
    let scheduler = BatchScheduler::start(BatchSpec::new(hosts), clock).unwrap();
    let (notify, mut events) = event_channel();

    // A completing job, a timed-out job, and an expiring pilot.
    let ok = CompoundJob::new("ok");
    ok.add_sleep_action("s", 10.0).unwrap();
    scheduler.submit(ok, &batch_args(1, 4, 1), notify.clone()).await.unwrap();

    let late = CompoundJob::new("late");
    late.add_sleep_action("s", 120.0).unwrap();
    scheduler.submit(late, &batch_args(1, 4, 1), notify.clone()).await.unwrap();

    let pilot = PilotJob::new("p");
    scheduler
        .submit_pilot(pilot, &batch_args(1, 4, 1), notify)
        .await
        .unwrap();

    let mut terminal = Vec::new();
    // started + 3 terminal events
    for _ in 0..4 {
        let event = next_event(&mut events).await;
        if event.kind() != EventKind::PilotJobStarted {
            terminal.push(event.kind());
        }
    }
    terminal.sort_by_key(|k| k.to_string());
    assert_eq!(
        terminal,
        vec![
            EventKind::PilotJobExpired,
            EventKind::StandardJobCompleted,
            EventKind::StandardJobFailed,
        ]
    );
    assert!(events.next_with_timeout(500.0).await.is_err());
}
