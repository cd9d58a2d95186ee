//! The Signaling Session (spec.md §4.1).
//!
//! Wraps a [`SignalingTransport`] with the request/response contract:
//! serialize a request, time it out after `request_timeout`, retry up to
//! `request_retries` times on timeout only, and never retry any other
//! error. Connection lifecycle events are forwarded to whoever is
//! listening (the Room Coordinator) verbatim.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::RoomClientConfig;
use crate::error::{RoomError, Result};
use crate::signaling::protocol::RequestMethod;
use crate::signaling::transport::{ConnectionEvent, Inbound, SignalingTransport};

/// The Signaling Session. Cheap to clone (an `Arc` around the shared
/// transport); every component that needs to issue requests holds a
/// clone.
#[derive(Clone)]
pub struct SignalingSession {
    transport: Arc<dyn SignalingTransport>,
    config: Arc<RoomClientConfig>,
}

impl SignalingSession {
    #[must_use]
    pub fn new(transport: Arc<dyn SignalingTransport>, config: Arc<RoomClientConfig>) -> Self {
        Self { transport, config }
    }

    /// `sendRequest(method, data) -> response` per spec.md §4.1.
    ///
    /// Retries up to `config.request_retries` attempts on
    /// [`RoomError::SignalingTimeout`]. Any other error propagates on the
    /// first attempt without being retried. Ordering across awaits is
    /// explicitly not guaranteed (spec.md: "the caller must not assume
    /// FIFO across awaits").
    #[tracing::instrument(skip(self, data), fields(method = method.as_str()))]
    pub async fn send_request(&self, method: RequestMethod, data: Value) -> Result<Value> {
        let mut attempt = 0u32;
        let timeout = Duration::from_millis(self.config.request_timeout);

        loop {
            attempt += 1;
            let single_attempt = tokio::time::timeout(
                timeout,
                self.transport.request(method.as_str(), data.clone()),
            )
            .await;

            match single_attempt {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => {
                    if let RoomError::SfuNotFound(_) = err {
                        return Err(err);
                    }
                    // Non-timeout errors are not retried; they propagate.
                    return Err(err);
                }
                Err(_elapsed) => {
                    warn!(attempt, "signaling request timed out");
                    if attempt >= self.config.request_retries.max(1) {
                        return Err(RoomError::SignalingTimeout {
                            method: method.as_str().to_string(),
                            attempts: attempt,
                        });
                    }
                }
            }
        }
    }

    /// Tear down the underlying transport. Any signaling response that
    /// arrives afterwards is discarded by the transport implementation.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}

/// Demultiplexes the transport's inbound stream into notification
/// dispatch calls and connection lifecycle callbacks. Notifications are
/// processed strictly in arrival order — each handler invocation is
/// awaited to completion before the next one starts (spec.md §5
/// "Ordering guarantees").
pub struct InboundLoop {
    receiver: mpsc::UnboundedReceiver<Inbound>,
}

impl InboundLoop {
    #[must_use]
    pub fn new(receiver: mpsc::UnboundedReceiver<Inbound>) -> Self {
        Self { receiver }
    }

    /// Drive the loop until the transport closes, calling `on_notification`
    /// for every notification frame and `on_lifecycle` for every
    /// connection event, serially, in the order received.
    pub async fn run<FN, FL>(mut self, mut on_notification: FN, mut on_lifecycle: FL)
    where
        FN: FnMut(String, Value) -> futures::future::BoxFuture<'static, ()> + Send,
        FL: FnMut(ConnectionEvent) -> futures::future::BoxFuture<'static, ()> + Send,
    {
        while let Some(inbound) = self.receiver.recv().await {
            match inbound {
                Inbound::Notification { method, data } => {
                    debug!(%method, "dispatching notification");
                    on_notification(method, data).await;
                }
                Inbound::Lifecycle(event) => {
                    on_lifecycle(event).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct AlwaysTimesOut {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SignalingTransport for AlwaysTimesOut {
        async fn request(&self, _method: &'static str, _data: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Never resolves within the test's timeout.
            futures::future::pending().await
        }

        async fn close(&self) {}
    }

    struct Rejects;

    #[async_trait]
    impl SignalingTransport for Rejects {
        async fn request(&self, method: &'static str, _data: Value) -> Result<Value> {
            Err(RoomError::SignalingRejected {
                method: method.to_string(),
                reason: "nope".into(),
            })
        }

        async fn close(&self) {}
    }

    fn config_with(timeout_ms: u64, retries: u32) -> Arc<RoomClientConfig> {
        Arc::new(RoomClientConfig {
            request_timeout: timeout_ms,
            request_retries: retries,
            ..RoomClientConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn retries_up_to_configured_attempts_then_fails() {
        let transport = Arc::new(AlwaysTimesOut {
            calls: AtomicU32::new(0),
        });
        let session = SignalingSession::new(transport.clone(), config_with(10, 3));

        let result = session
            .send_request(RequestMethod::Join, serde_json::json!({}))
            .await;

        assert!(matches!(
            result,
            Err(RoomError::SignalingTimeout { attempts: 3, .. })
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_timeout_errors_are_not_retried() {
        let session = SignalingSession::new(Arc::new(Rejects), config_with(1000, 3));

        let result = session
            .send_request(RequestMethod::Join, serde_json::json!({}))
            .await;

        assert!(matches!(result, Err(RoomError::SignalingRejected { .. })));
    }
}
