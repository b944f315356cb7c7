//! Watch source types
//!
//! A `WatchHandle` is the consumer end of one watch subscription. Events
//! arrive in order on a bounded channel; the sequence ends when the producer
//! side goes away (server closed the watch, transport dropped) or when the
//! handle is closed. A handle cannot be restarted: open a new watch instead.

use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// One change notification from a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(Value),
    Modified(Value),
    Deleted(Value),
    /// Diagnostic reported by the API server or the transport
    Error(String),
}

impl WatchEvent {
    /// The object carried by the event, if any.
    pub fn object(&self) -> Option<&Value> {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => Some(obj),
            WatchEvent::Error(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "Added",
            WatchEvent::Modified(_) => "Modified",
            WatchEvent::Deleted(_) => "Deleted",
            WatchEvent::Error(_) => "Error",
        }
    }
}

type Closer = Box<dyn FnOnce() + Send + 'static>;

/// Exclusive handle on one watch subscription.
///
/// `close` releases the subscription; it runs at most once, and dropping the
/// handle closes it too, so no exit path leaks a watch.
pub struct WatchHandle {
    events: mpsc::Receiver<WatchEvent>,
    closer: Option<Closer>,
}

impl WatchHandle {
    pub fn new<F>(events: mpsc::Receiver<WatchEvent>, closer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            events,
            closer: Some(Box::new(closer)),
        }
    }

    /// Waits for the next event. `None` means the sequence is exhausted.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Releases the subscription. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(closer) = self.closer.take() {
            debug!("closing watch");
            self.events.close();
            closer();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_none()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
