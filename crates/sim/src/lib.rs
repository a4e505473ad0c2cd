// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulation collaborator surfaces: virtual clock, platform model,
//! typed mailboxes, alarms, barriers, and simulated storage.
//!
//! Everything here is a stand-in the scheduling kernel builds on:
//! logical time, logical bytes, no I/O. Services and executors are
//! tokio tasks; under a paused-clock runtime (`start_paused` tests)
//! sleeps advance virtual time instantly, which is the discrete-event
//! behavior the kernel assumes.

pub mod alarm;
pub mod barrier;
pub mod clock;
pub mod mailbox;
pub mod pause;
pub mod platform;
pub mod registry;
pub mod storage;

pub use alarm::Alarm;
pub use barrier::{signal_barrier, SignalBarrier, SignalSender};
pub use clock::SimClock;
pub use mailbox::{mailbox, request, Address, Mailbox, Transport};
pub use pause::{pause_gate, PauseControl, PauseGate};
pub use platform::{ExecutionHost, Platform};
pub use registry::FileRegistry;
pub use storage::{FileHandle, SimStorage, StorageDirectory};
