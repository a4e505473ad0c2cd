// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed mailboxes: the control-plane transport between actors.
//!
//! Each service owns one [`Mailbox`]; everyone else holds [`Address`]
//! clones. Request/reply rides a oneshot inside the request message.
//! Messages carry a logical payload size in bytes; with a [`Transport`]
//! attached, the size buys simulated delivery time, otherwise delivery
//! is immediate. Receive timeouts surface as `NetworkError` causes.

use crate::clock::SimClock;
use gantry_core::{FailureCause, NetworkDirection, NetworkFault};
use tokio::sync::{mpsc, oneshot};

/// Simulated link characteristics for sized sends.
#[derive(Debug, Clone, Copy)]
pub struct Transport {
    pub latency: f64,
    pub bytes_per_second: f64,
}

impl Transport {
    pub fn new(latency: f64, bytes_per_second: f64) -> Result<Self, FailureCause> {
        if latency < 0.0 || bytes_per_second <= 0.0 {
            return Err(FailureCause::invalid_argument(format!(
                "invalid transport: latency {latency}, rate {bytes_per_second}"
            )));
        }
        Ok(Self { latency, bytes_per_second })
    }

    fn delay(&self, payload: u64) -> f64 {
        self.latency + payload as f64 / self.bytes_per_second
    }
}

/// Create a named mailbox and its address.
pub fn mailbox<M>(name: impl Into<String>) -> (Address<M>, Mailbox<M>) {
    let name = name.into();
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Address { tx, name: name.clone(), transport: None, clock: None },
        Mailbox { rx, name },
    )
}

/// Sending half of a mailbox.
pub struct Address<M> {
    tx: mpsc::UnboundedSender<M>,
    name: String,
    transport: Option<Transport>,
    clock: Option<SimClock>,
}

impl<M> std::fmt::Debug for Address<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.name)
    }
}

impl<M> Clone for Address<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name.clone(),
            transport: self.transport,
            clock: self.clock,
        }
    }
}

impl<M: Send + 'static> Address<M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a transport model: sized sends on this address handle
    /// take simulated time.
    pub fn with_transport(mut self, transport: Transport, clock: SimClock) -> Self {
        self.transport = Some(transport);
        self.clock = Some(clock);
        self
    }

    /// Deliver a message. Fails when the receiving actor is gone.
    pub fn send(&self, message: M) -> Result<(), FailureCause> {
        self.tx
            .send(message)
            .map_err(|_| FailureCause::send_failure(self.name.clone()))
    }

    /// Deliver a message whose payload is `payload` bytes. Without a
    /// transport this is an ordinary send; with one, delivery happens
    /// after the simulated transfer time.
    pub fn send_sized(&self, message: M, payload: u64) -> Result<(), FailureCause> {
        match (self.transport, self.clock) {
            (Some(transport), Some(clock)) => {
                let delay = transport.delay(payload);
                let tx = self.tx.clone();
                let name = self.name.clone();
                tokio::spawn(async move {
                    clock.sleep(delay).await;
                    if tx.send(message).is_err() {
                        tracing::debug!(mailbox = %name, "delayed delivery to a gone mailbox");
                    }
                });
                Ok(())
            }
            _ => self.send(message),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a mailbox, owned by the service actor.
pub struct Mailbox<M> {
    rx: mpsc::UnboundedReceiver<M>,
    name: String,
}

impl<M> std::fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mailbox({})", self.name)
    }
}

impl<M> Mailbox<M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next message; `None` once every address is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    /// Wait for at most `timeout` simulated seconds.
    pub async fn recv_timeout(&mut self, timeout: f64) -> Result<M, FailureCause> {
        let duration = std::time::Duration::from_secs_f64(timeout.max(0.0));
        match tokio::time::timeout(duration, self.rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(FailureCause::send_failure(self.name.clone())),
            Err(_) => Err(FailureCause::recv_timeout(self.name.clone())),
        }
    }

    pub fn try_recv(&mut self) -> Option<M> {
        self.rx.try_recv().ok()
    }
}

/// Send a request carrying a fresh reply slot and await the answer.
///
/// The usual service call: `request(&addr, |reply| Msg::Submit { job,
/// reply }).await`.
pub async fn request<M, R>(
    addr: &Address<M>,
    make: impl FnOnce(oneshot::Sender<R>) -> M,
) -> Result<R, FailureCause>
where
    M: Send + 'static,
{
    let (reply_tx, reply_rx) = oneshot::channel();
    addr.send(make(reply_tx))?;
    reply_rx.await.map_err(|_| FailureCause::NetworkError {
        direction: NetworkDirection::Receiving,
        fault: NetworkFault::Failure,
        endpoint: addr.name().to_string(),
    })
}

#[cfg(test)]
#[path = "mailbox_tests.rs"]
mod tests;
