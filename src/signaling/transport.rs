//! The signaling transport seam.
//!
//! spec.md §1 treats "the signaling transport library" as an assumed
//! external dependency: "a message framing layer providing `emit(event,
//! payload, ack)` with per-message acknowledgements". This trait models
//! exactly that seam so `SignalingSession` never depends on a concrete
//! socket implementation. `websocket.rs` provides the one real adapter,
//! grounded in the teacher's `network::websocket` module.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A connection lifecycle event, driving the Room state machine per
/// spec.md §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connect,
    /// The channel closed; `permanent` distinguishes `"io server
    /// disconnect"` from every other reason (spec.md §4.1, §7).
    Disconnect { reason: String, permanent: bool },
    ReconnectFailed,
    Reconnect,
}

/// Inbound traffic multiplexed from the transport: either a notification
/// frame, or a connection lifecycle event.
#[derive(Debug, Clone)]
pub enum Inbound {
    Notification { method: String, data: Value },
    Lifecycle(ConnectionEvent),
}

/// The signaling transport seam: a bidirectional, framed, ack-capable
/// channel to the SFU's signaling endpoint.
///
/// Implementations push all inbound traffic onto the `mpsc::Sender` they
/// were constructed with; `send_request` is the only call that blocks on
/// a reply, correlated out-of-band by the implementation (e.g. a
/// JSON-RPC-style request id, or a transport-native ack callback).
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Send a single request frame and await its ack. Implementations
    /// must not retry internally — retries are `SignalingSession`'s
    /// responsibility so the single-attempt timeout stays visible to the
    /// retry policy.
    async fn request(&self, method: &'static str, data: Value) -> Result<Value>;

    /// Tear down the transport. Idempotent.
    async fn close(&self);
}
