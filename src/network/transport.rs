// In-Process Transport - Per-node inboxes
//
// Every node owns one unbounded tokio mpsc inbox. Sending a rumor pushes
// it onto the recipient's inbox and bumps a shared in-flight counter; the
// counter drops once the recipient has fully processed the rumor,
// including enqueueing anything it gossips onward. Zero in flight means
// no further change can happen.

use crate::replica::NodeId;
use crate::sync::{Envelope, Rumor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Inbox closed for {0}")]
    InboxClosed(NodeId),
}

/// Delivery seam between gossip nodes
pub trait Transport<V>: Send + Sync {
    /// Hand an envelope to its recipient
    fn send(&self, envelope: Envelope<V>) -> Result<(), TransportError>;
}

/// Count of rumors enqueued but not yet processed
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Resolve once nothing is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking, so a finish() in between is not lost
            notified.as_mut().enable();

            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Transport over in-process unbounded channels
#[derive(Debug)]
pub struct InProcessTransport<V> {
    inboxes: Vec<mpsc::UnboundedSender<Rumor<V>>>,
    in_flight: Arc<InFlight>,
}

impl<V> InProcessTransport<V> {
    /// Create one inbox per node; returns the receivers in node order
    pub fn new(size: usize) -> (Self, Vec<mpsc::UnboundedReceiver<Rumor<V>>>) {
        let (inboxes, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::unbounded_channel()).unzip();
        let transport = Self {
            inboxes,
            in_flight: Arc::new(InFlight::new()),
        };
        (transport, receivers)
    }

    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }
}

impl<V: Send> Transport<V> for InProcessTransport<V> {
    fn send(&self, envelope: Envelope<V>) -> Result<(), TransportError> {
        let to = envelope.to;
        let inbox = self
            .inboxes
            .get(to.index())
            .ok_or(TransportError::UnknownNode(to))?;

        self.in_flight.begin();
        if inbox.send(envelope.rumor).is_err() {
            self.in_flight.finish();
            return Err(TransportError::InboxClosed(to));
        }
        Ok(())
    }
}
