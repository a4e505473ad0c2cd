// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pause gate: a watch channel that suspends cooperating sleepers.
//!
//! Used by the VM manager: suspending a VM pauses every executor the
//! VM hosts; their simulated work stops consuming time until resume.

use tokio::sync::watch;

/// Create a connected pause control/gate pair, initially running.
pub fn pause_gate() -> (PauseControl, PauseGate) {
    let (tx, rx) = watch::channel(false);
    (PauseControl { tx }, PauseGate { rx })
}

/// Controlling half, held by whoever may suspend the work.
#[derive(Debug)]
pub struct PauseControl {
    tx: watch::Sender<bool>,
}

impl PauseControl {
    pub fn pause(&self) {
        let _ = self.tx.send(true);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// A gate observing this control (for late-spawned executors).
    pub fn gate(&self) -> PauseGate {
        PauseGate { rx: self.tx.subscribe() }
    }
}

/// Observing half, polled by pausable sleeps.
#[derive(Debug, Clone)]
pub struct PauseGate {
    rx: watch::Receiver<bool>,
}

impl PauseGate {
    pub fn is_paused(&self) -> bool {
        *self.rx.borrow()
    }

    /// Block while paused. Errors when the controller is gone.
    pub async fn wait_while_paused(&mut self) -> Result<(), watch::error::RecvError> {
        while *self.rx.borrow() {
            self.rx.changed().await?;
        }
        Ok(())
    }

    /// Wait for the next pause/resume flip.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

#[cfg(test)]
#[path = "pause_tests.rs"]
mod tests;
