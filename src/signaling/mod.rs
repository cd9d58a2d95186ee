//! Signaling Session (spec.md §4.1 — component 1).

#[cfg(any(test, feature = "fake-rtc"))]
pub mod fake;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod websocket;

pub use protocol::{NotificationMethod, RequestMethod};
pub use session::{InboundLoop, SignalingSession};
pub use transport::{ConnectionEvent, Inbound, SignalingTransport};
pub use websocket::WebSocketTransport;
