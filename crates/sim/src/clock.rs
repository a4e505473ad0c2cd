// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for simulated time.
//!
//! Simulated time is seconds since the clock was created, read off the
//! tokio timer. Under a paused runtime a sleeping task advances the
//! clock to its deadline as soon as every task is idle, so sleeps cost
//! no wall time and dates are exact.

use crate::pause::PauseGate;
use std::time::Duration;
use tokio::time::Instant;

/// Handle to the simulation clock. Cheap to clone; all clones share
/// the same origin.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    origin: Instant,
}

impl SimClock {
    /// A clock whose time zero is now.
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Current simulated date, in seconds since time zero.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Suspend the calling actor for `seconds` of simulated time.
    pub async fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
    }

    /// Suspend the calling actor until the given simulated date.
    pub async fn sleep_until(&self, date: f64) {
        let target = self.origin + Duration::from_secs_f64(date.max(0.0));
        tokio::time::sleep_until(target).await;
    }

    /// Like [`SimClock::sleep`], but a paused gate stops the clock from
    /// charging time against the sleeper: the remaining duration is
    /// preserved across pause/resume cycles.
    ///
    /// If the gate's controller goes away mid-sleep, the remaining
    /// duration is slept out uninterrupted.
    pub async fn sleep_pausable(&self, seconds: f64, gate: &mut PauseGate) {
        let mut remaining = seconds.max(0.0);
        loop {
            if gate.wait_while_paused().await.is_err() {
                // Controller gone; nothing can pause us anymore.
                self.sleep(remaining).await;
                return;
            }
            if remaining <= 0.0 {
                return;
            }
            let started = self.now();
            tokio::select! {
                _ = self.sleep(remaining) => return,
                changed = gate.changed() => {
                    remaining = (remaining - (self.now() - started)).max(0.0);
                    if changed.is_err() {
                        self.sleep(remaining).await;
                        return;
                    }
                }
            }
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
