//! Producer side of a run's progress stream.
//!
//! Backed by an unbounded mpsc channel: emitting never blocks and never
//! waits on the consumer, and a dropped receiver is silently ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::trace;

use super::types::{EventEnvelope, PipelineEvent};

/// Receiving half handed to whoever streams events out.
pub type ProgressReceiver = mpsc::UnboundedReceiver<EventEnvelope>;

#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: Option<mpsc::UnboundedSender<EventEnvelope>>,
    seq: Arc<AtomicU64>,
}

impl ProgressSink {
    /// A connected sink and its receiver.
    pub fn channel() -> (Self, ProgressReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(tx),
                seq: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, event: PipelineEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        let event_type = event.event_type();
        let envelope = EventEnvelope {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            emitted_at: Utc::now(),
            event,
        };
        // a closed receiver only means nobody is listening any more
        let _ = sender.send(envelope);
        trace!(event_type, "Progress event emitted");
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| !s.is_closed())
    }
}
