//! Cancellable delayed delivery of a value over a channel.
//!
//! Scheduling aborts whatever is pending, so only the most recent value is
//! ever delivered. Each delivery carries a ticket; receivers call
//! [`Debouncer::complete`] to discard anything not from the latest schedule.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    ticket: u64,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ticket: 0,
            pending: None,
        }
    }

    /// Cancels any pending delivery and schedules `make(ticket)` to be sent
    /// on `tx` after the delay. Returns the new ticket.
    pub fn schedule<T, F>(&mut self, tx: UnboundedSender<T>, make: F) -> u64
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        self.ticket += 1;
        let ticket = self.ticket;
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(make(ticket));
        }));
        ticket
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Accepts a delivered ticket. Returns false for superseded tickets.
    pub fn complete(&mut self, ticket: u64) -> bool {
        if ticket != self.ticket {
            return false;
        }
        self.pending = None;
        true
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
