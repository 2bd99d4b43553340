//! Channel abstraction — models the redesign note in spec §9: "channels
//! captured by closures" become explicit owned handles, resolved through
//! the Session Registry rather than carried around inside pending records.
//!
//! A [`ChannelHandle`] is transport-agnostic: it is a sender half of an
//! internal queue that the connection's writer task drains and turns into
//! actual WebSocket frames. `garden-core` never touches axum directly —
//! that keeps the broker's websocket plumbing out of the library crate.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// Allocate a process-unique id for a freshly accepted connection.
    pub fn next() -> Self {
        ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reason a channel is being closed by the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A newer channel for the same identity replaced this one (spec §4.1).
    Replaced,
    /// The Supervisor evicted a stale controller (spec §4.7).
    StaleController,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    pub fn code(&self) -> &'static str {
        match self {
            CloseReason::Replaced => "REPLACED",
            CloseReason::StaleController => "STALE_CONTROLLER",
            CloseReason::Shutdown => "SHUTDOWN",
        }
    }
}

/// An item placed on a channel's outbound queue.
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    /// A JSON frame `{ "type": ..., "data": ... }` to write verbatim.
    Frame(Value),
    /// Instruct the writer task to send a close frame and end the connection.
    Close(CloseReason),
}

/// A cheap, cloneable handle to a connection's outbound queue.
///
/// `is_open` relies on `mpsc::UnboundedSender::is_closed`: once the
/// connection's writer task drops its receiver (because the socket closed),
/// every clone of the handle observes the channel as closed without any
/// extra bookkeeping.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: ChannelId,
    tx: tokio::sync::mpsc::UnboundedSender<OutgoingMessage>,
}

impl ChannelHandle {
    pub fn new(id: ChannelId, tx: tokio::sync::mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Best-effort send. Failures (closed channel) are the caller's to log,
    /// never to propagate — per spec §4.3's broadcaster discipline.
    pub fn send(&self, frame: Value) -> bool {
        self.tx.send(OutgoingMessage::Frame(frame)).is_ok()
    }

    pub fn close(&self, reason: CloseReason) {
        let _ = self.tx.send(OutgoingMessage::Close(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_are_unique() {
        let a = ChannelId::next();
        let b = ChannelId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn handle_reports_closed_after_receiver_drops() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = ChannelHandle::new(ChannelId::next(), tx);
        assert!(handle.is_open());
        drop(rx);
        assert!(!handle.is_open());
        assert!(!handle.send(serde_json::json!({"type": "PING"})));
    }

    #[test]
    fn send_succeeds_while_open() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = ChannelHandle::new(ChannelId::next(), tx);
        assert!(handle.send(serde_json::json!({"type": "PING"})));
        match rx.try_recv().unwrap() {
            OutgoingMessage::Frame(v) => assert_eq!(v["type"], "PING"),
            _ => panic!("expected frame"),
        }
    }
}
