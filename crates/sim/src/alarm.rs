// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot alarms: deliver a message to a mailbox at an absolute
//! simulated date.
//!
//! The batch service arms one per dispatched job to enforce wall-time;
//! the alarm message arrives on the service's own mailbox like any
//! other, so reaping happens in the normal loop.

use crate::clock::SimClock;
use crate::mailbox::Address;
use tokio_util::sync::CancellationToken;

/// Handle to an armed alarm. Dropping the handle does not disarm it;
/// call [`Alarm::cancel`].
#[derive(Debug)]
pub struct Alarm {
    token: CancellationToken,
    date: f64,
}

impl Alarm {
    /// Arm an alarm: `message` is posted to `addr` at simulated `date`
    /// (immediately if the date is already past).
    pub fn start<M: Send + 'static>(
        clock: SimClock,
        date: f64,
        addr: Address<M>,
        message: M,
    ) -> Alarm {
        let token = CancellationToken::new();
        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = clock.sleep_until(date) => {
                    if addr.send(message).is_err() {
                        tracing::debug!(mailbox = %addr.name(), date, "alarm fired for a gone mailbox");
                    }
                }
            }
        });
        Alarm { token, date }
    }

    /// The date this alarm fires at.
    pub fn date(&self) -> f64 {
        self.date
    }

    /// Disarm; the message will not be delivered.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
#[path = "alarm_tests.rs"]
mod tests;
