// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Counting completion barrier: wait for N signals, then proceed.
//!
//! The join primitive for compute threads and MPI co-actors. A signal
//! sender that goes away without signalling (a dead thread) makes the
//! wait report failure instead of hanging.

use tokio::sync::mpsc;

/// Create a barrier expecting `count` signals.
pub fn signal_barrier(count: usize) -> (SignalSender, SignalBarrier) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender { tx }, SignalBarrier { remaining: count, rx })
}

/// Cloneable signalling half; each participant signals once.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<()>,
}

impl SignalSender {
    pub fn signal(&self) {
        let _ = self.tx.send(());
    }
}

/// Waiting half.
#[derive(Debug)]
pub struct SignalBarrier {
    remaining: usize,
    rx: mpsc::UnboundedReceiver<()>,
}

impl SignalBarrier {
    /// Wait until every expected signal arrived. Returns `false` if
    /// all senders disappeared first.
    pub async fn wait(mut self) -> bool {
        while self.remaining > 0 {
            match self.rx.recv().await {
                Some(()) => self.remaining -= 1,
                None => return false,
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "barrier_tests.rs"]
mod tests;
