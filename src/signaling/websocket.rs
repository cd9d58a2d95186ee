//! WebSocket-backed [`SignalingTransport`].
//!
//! Grounded in the teacher's `network::websocket::connection_loop`: a
//! single task owns the socket, `tokio::select!`s between inbound frames
//! and outbound work, and reconnects with the same hand-rolled
//! exponential backoff (capped at 30s). Unlike the teacher's WebSocket
//! manager, every outbound frame here carries a request id and awaits a
//! correlated ack (spec.md's `emit(event, payload, ack)` contract), so a
//! pending-request map keyed by id is threaded through the connection
//! loop instead of a bare send-only event channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::{RoomError, Result};
use crate::signaling::protocol::{Ack, NotificationFrame};
use crate::signaling::transport::{ConnectionEvent, Inbound, SignalingTransport};

#[derive(Debug, Serialize)]
struct Envelope {
    id: u64,
    method: &'static str,
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingFrame {
    Reply { id: u64, #[serde(flatten)] ack: Ack },
    Notification(NotificationFrame),
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Ack>>>>;

/// A live WebSocket signaling transport.
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Envelope>,
    pending: PendingMap,
    next_id: AtomicU64,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
}

impl WebSocketTransport {
    /// Connect to `url`, spawning the background connection loop. Returns
    /// the transport plus the inbound stream of notifications and
    /// lifecycle events for the `SignalingSession`'s `InboundLoop`.
    pub async fn connect(url: url::Url) -> (Arc<Self>, mpsc::UnboundedReceiver<Inbound>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Envelope>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let pending_clone = pending.clone();
        tokio::spawn(connection_loop(
            url,
            outbound_rx,
            inbound_tx,
            shutdown_rx,
            pending_clone,
        ));

        (
            Arc::new(Self {
                outbound: outbound_tx,
                pending,
                next_id: AtomicU64::new(1),
                shutdown: Mutex::new(Some(shutdown_tx)),
            }),
            inbound_rx,
        )
    }
}

#[async_trait]
impl SignalingTransport for WebSocketTransport {
    async fn request(&self, method: &'static str, data: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(id, reply_tx);

        if self
            .outbound
            .send(Envelope { id, method, data })
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(RoomError::SignalingDisconnected(
                "outbound channel closed".into(),
            ));
        }

        // The caller (SignalingSession) applies the request-level
        // timeout; this only resolves once the loop delivers an ack or
        // drops the sender on disconnect.
        match reply_rx.await {
            Ok(ack) => match ack.error {
                None => Ok(ack.response),
                Some(err) if err.message.contains(crate::error::SFU_NOT_FOUND_MARKER) => {
                    Err(RoomError::SfuNotFound(method.to_string()))
                }
                Some(err) => Err(RoomError::SignalingRejected {
                    method: method.to_string(),
                    reason: err.message,
                }),
            },
            Err(_) => Err(RoomError::SignalingDisconnected(
                "connection closed before ack arrived".into(),
            )),
        }
    }

    async fn close(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(()).await;
        }
        self.pending.lock().await.clear();
    }
}

async fn connection_loop(
    url: url::Url,
    mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    mut shutdown_rx: mpsc::Receiver<()>,
    pending: PendingMap,
) {
    let max_backoff = Duration::from_secs(30);
    let mut attempt = 0u32;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!("signaling socket connected");
                attempt = 0;
                let _ = inbound_tx.send(Inbound::Lifecycle(ConnectionEvent::Connect));

                let (mut write, mut read) = stream.split();
                let mut closed_permanently = false;

                loop {
                    tokio::select! {
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    handle_incoming(&text, &inbound_tx, &pending).await;
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    if let Err(e) = write.send(Message::Pong(data)).await {
                                        warn!("failed to send pong: {e}");
                                    }
                                }
                                Some(Ok(Message::Close(frame))) => {
                                    let reason = frame.map(|f| f.reason.to_string())
                                        .unwrap_or_else(|| "server disconnect".into());
                                    closed_permanently = reason.contains("server disconnect");
                                    let _ = inbound_tx.send(Inbound::Lifecycle(
                                        ConnectionEvent::Disconnect { reason, permanent: closed_permanently },
                                    ));
                                    break;
                                }
                                Some(Err(e)) => {
                                    error!("signaling socket error: {e}");
                                    break;
                                }
                                None => break,
                                _ => {}
                            }
                        }
                        envelope = outbound_rx.recv() => {
                            match envelope {
                                Some(env) => {
                                    if let Ok(json) = serde_json::to_string(&env) {
                                        debug!(id = env.id, method = env.method, "sending request");
                                        if let Err(e) = write.send(Message::Text(json.into())).await {
                                            error!("failed to send request: {e}");
                                            break;
                                        }
                                    }
                                }
                                None => return,
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    }
                }

                if closed_permanently {
                    return;
                }
                if !pending.lock().await.is_empty() {
                    // Pending requests never get an ack across a
                    // reconnect; drop the senders so awaiting callers
                    // see SignalingDisconnected instead of hanging.
                    pending.lock().await.clear();
                }
                let _ = inbound_tx.send(Inbound::Lifecycle(ConnectionEvent::Reconnect));
            }
            Err(e) => {
                error!("failed to connect signaling socket: {e}");
                let _ = inbound_tx.send(Inbound::Lifecycle(ConnectionEvent::ReconnectFailed));
            }
        }

        attempt += 1;
        let backoff = std::cmp::min(Duration::from_secs(2u64.pow(attempt.min(5))), max_backoff);
        tokio::select! {
            () = tokio::time::sleep(backoff) => {}
            _ = shutdown_rx.recv() => return,
        }
    }
}

async fn handle_incoming(
    text: &str,
    inbound_tx: &mpsc::UnboundedSender<Inbound>,
    pending: &PendingMap,
) {
    match serde_json::from_str::<IncomingFrame>(text) {
        Ok(IncomingFrame::Reply { id, ack }) => {
            if let Some(tx) = pending.lock().await.remove(&id) {
                let _ = tx.send(ack);
            }
        }
        Ok(IncomingFrame::Notification(frame)) => {
            let _ = inbound_tx.send(Inbound::Notification {
                method: frame.method,
                data: frame.data,
            });
        }
        Err(e) => warn!("failed to parse signaling frame: {e} — {text}"),
    }
}
