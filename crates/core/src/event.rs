// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution events delivered to submitters.
//!
//! Submitters never read scheduler state: every outcome arrives as
//! exactly one typed [`Event`] on the submitter's [`EventQueue`].
//! Standard-job events come from the batch service, compound-job events
//! from bare-metal/VM submission, and invocation events from the
//! serverless service.

use crate::{CompoundJob, FailureCause, InvocationId};
use serde::Serialize;
use tokio::sync::mpsc;

/// An asynchronous execution outcome, stamped with the simulated date
/// at which it was emitted.
#[derive(Debug, Clone)]
pub enum Event {
    StandardJobCompleted { job: CompoundJob, date: f64 },
    StandardJobFailed { job: CompoundJob, cause: FailureCause, date: f64 },
    CompoundJobCompleted { job: CompoundJob, date: f64 },
    CompoundJobFailed { job: CompoundJob, cause: FailureCause, date: f64 },
    PilotJobStarted { pilot: String, date: f64 },
    PilotJobExpired { pilot: String, date: f64 },
    FunctionInvocationComplete {
        invocation: InvocationId,
        function: String,
        success: bool,
        cause: Option<FailureCause>,
        date: f64,
    },
}

/// Tag-only variant of [`Event`] for logging and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StandardJobCompleted,
    StandardJobFailed,
    CompoundJobCompleted,
    CompoundJobFailed,
    PilotJobStarted,
    PilotJobExpired,
    FunctionInvocationComplete,
}

crate::simple_display! {
    EventKind {
        StandardJobCompleted => "standard_job_completed",
        StandardJobFailed => "standard_job_failed",
        CompoundJobCompleted => "compound_job_completed",
        CompoundJobFailed => "compound_job_failed",
        PilotJobStarted => "pilot_job_started",
        PilotJobExpired => "pilot_job_expired",
        FunctionInvocationComplete => "function_invocation_complete",
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StandardJobCompleted { .. } => EventKind::StandardJobCompleted,
            Event::StandardJobFailed { .. } => EventKind::StandardJobFailed,
            Event::CompoundJobCompleted { .. } => EventKind::CompoundJobCompleted,
            Event::CompoundJobFailed { .. } => EventKind::CompoundJobFailed,
            Event::PilotJobStarted { .. } => EventKind::PilotJobStarted,
            Event::PilotJobExpired { .. } => EventKind::PilotJobExpired,
            Event::FunctionInvocationComplete { .. } => EventKind::FunctionInvocationComplete,
        }
    }

    /// Simulated date at which the event was emitted.
    pub fn date(&self) -> f64 {
        match self {
            Event::StandardJobCompleted { date, .. }
            | Event::StandardJobFailed { date, .. }
            | Event::CompoundJobCompleted { date, .. }
            | Event::CompoundJobFailed { date, .. }
            | Event::PilotJobStarted { date, .. }
            | Event::PilotJobExpired { date, .. }
            | Event::FunctionInvocationComplete { date, .. } => *date,
        }
    }

    /// The failure cause carried by the event, if any.
    pub fn failure_cause(&self) -> Option<&FailureCause> {
        match self {
            Event::StandardJobFailed { cause, .. } | Event::CompoundJobFailed { cause, .. } => {
                Some(cause)
            }
            Event::FunctionInvocationComplete { cause, .. } => cause.as_ref(),
            _ => None,
        }
    }
}

/// Create a connected event channel: services send, the submitter reads.
pub fn event_channel() -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventQueue { rx })
}

/// Sending half of the event channel, cloned into every service a
/// submitter talks to.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Deliver an event; a gone submitter is not an error the service
    /// can act on, so the send is fire-and-forget.
    pub fn send(&self, event: Event) {
        tracing::debug!(kind = %event.kind(), date = event.date(), "event emitted");
        let _ = self.tx.send(event);
    }
}

/// Receiving half: the submitter's mailbox of execution events.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventQueue {
    /// Wait for the next event. `None` once every service-side sender
    /// is gone.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Wait for the next event for at most `timeout` simulated seconds.
    pub async fn next_with_timeout(&mut self, timeout: f64) -> Result<Event, FailureCause> {
        let duration = std::time::Duration::from_secs_f64(timeout.max(0.0));
        match tokio::time::timeout(duration, self.rx.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(FailureCause::send_failure("event queue")),
            Err(_) => Err(FailureCause::recv_timeout("event queue")),
        }
    }

    /// Drain without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
