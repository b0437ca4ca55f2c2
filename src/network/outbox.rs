//! Outbound Delivery
//!
//! Messages go out through a [`MessageSink`]. Until a sink is attached they
//! wait in a FIFO; on attach they are flushed once, in arrival order.
//! A failed send is retried once after a fixed delay, then degraded to a
//! non-fatal `error` message. Nothing here loops.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::network::protocol::{ErrorCode, OutboundMessage, OutboundPayload};

/// Sink errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Receiver is gone.
    #[error("sink closed")]
    Closed,

    /// Receiver is not keeping up.
    #[error("sink full")]
    Full,

    /// Anything else.
    #[error("send failed: {0}")]
    Other(String),
}

/// Where outbound messages are written.
pub trait MessageSink: Send {
    /// Send one message. Must not block.
    fn send(&mut self, message: &OutboundMessage) -> Result<(), SinkError>;
}

impl MessageSink for mpsc::Sender<OutboundMessage> {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), SinkError> {
        self.try_send(message.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

impl MessageSink for mpsc::UnboundedSender<OutboundMessage> {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), SinkError> {
        mpsc::UnboundedSender::send(self, message.clone()).map_err(|_| SinkError::Closed)
    }
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the sink (possibly on the retry).
    Sent,
    /// No sink yet; queued.
    Buffered,
    /// Both attempts failed.
    Failed(SinkError),
}

/// Outbound queue in front of an optional sink.
pub struct Outbox {
    sink: Option<Box<dyn MessageSink>>,
    pending: VecDeque<OutboundMessage>,
    retry_delay: Duration,
}

impl Outbox {
    /// Create a detached outbox.
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            sink: None,
            pending: VecDeque::new(),
            retry_delay,
        }
    }

    /// A sink is attached.
    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Messages waiting for a sink.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Attach `sink` and flush the backlog through it, oldest first.
    ///
    /// Returns how many buffered messages were flushed.
    pub async fn attach(&mut self, sink: Box<dyn MessageSink>) -> usize {
        if self.sink.is_some() {
            debug!("Replacing attached sink");
        }
        self.sink = Some(sink);

        let backlog: Vec<OutboundMessage> = self.pending.drain(..).collect();
        let flushed = backlog.len();
        for message in backlog {
            self.deliver(message).await;
        }
        if flushed > 0 {
            debug!("Flushed {} buffered messages", flushed);
        }
        flushed
    }

    /// Remove the sink. Later messages are buffered again.
    pub fn detach(&mut self) -> Option<Box<dyn MessageSink>> {
        self.sink.take()
    }

    /// Deliver `message`, retrying once on failure.
    pub async fn deliver(&mut self, message: OutboundMessage) -> Delivery {
        let retry_delay = self.retry_delay;
        let Some(sink) = self.sink.as_mut() else {
            self.pending.push_back(message);
            return Delivery::Buffered;
        };

        let first = match sink.send(&message) {
            Ok(()) => return Delivery::Sent,
            Err(e) => e,
        };
        warn!("Failed to send {} message ({}), retrying in {:?}", message.kind(), first, retry_delay);
        tokio::time::sleep(retry_delay).await;

        let second = match sink.send(&message) {
            Ok(()) => return Delivery::Sent,
            Err(e) => e,
        };
        error!("Dropping {} message after retry: {}", message.kind(), second);

        // An undeliverable error report is not reported again.
        if !matches!(message.payload, OutboundPayload::Error { .. }) {
            let report = OutboundMessage::error(
                format!("Failed to deliver {} message", message.kind()),
                ErrorCode::DeliveryFailed,
                true,
            )
            .in_reply_to(message.id.as_deref());
            if let Err(e) = sink.send(&report) {
                error!("Failed to report delivery failure: {}", e);
            }
        }

        Delivery::Failed(second)
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("attached", &self.sink.is_some())
            .field("pending", &self.pending.len())
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}
