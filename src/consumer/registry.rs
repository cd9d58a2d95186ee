//! Consumer Registry (spec.md §4.4 — component 4).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::consumer::layers::adapt_preferred_layers;
use crate::consumer::types::{Consumer, ConsumerType};
use crate::error::{RoomError, Result};
use crate::producer::{resolution_scalings, MediaKind, SpeakingDetector, SpeakingEvent};
use crate::rtc::{RtpEncodingParameters, RtpParameters, Transport};
use crate::signaling::{RequestMethod, SignalingSession};

/// Payload of an inbound `newConsumer` notification (spec.md §6).
#[derive(Debug, Clone)]
pub struct NewConsumerParams {
    pub id: String,
    pub peer_id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub consumer_type: ConsumerType,
    pub rtp_parameters: RtpParameters,
    pub source: Option<String>,
    pub producer_paused: bool,
}

/// Event surfaced for the Reactive Store Bridge / Notification Surface.
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    Volume { peer_id: String, db: f32 },
    Speaking { peer_id: String },
    StoppedSpeaking { peer_id: String },
    Closed { consumer_id: String },
}

fn derive_resolution_scalings(rtp_parameters: &RtpParameters) -> Vec<f64> {
    let encodings: Vec<RtpEncodingParameters> = rtp_parameters
        .0
        .get("encodings")
        .and_then(|v: &Value| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    if encodings.is_empty() {
        return Vec::new();
    }
    resolution_scalings(&encodings)
}

pub struct ConsumerRegistry {
    signaling: SignalingSession,
    transport: tokio::sync::RwLock<Arc<dyn Transport>>,
    consumers: Mutex<HashMap<String, Consumer>>,
    speaking: Mutex<HashMap<String, SpeakingDetector>>,
    events: tokio::sync::mpsc::UnboundedSender<ConsumerEvent>,
}

impl ConsumerRegistry {
    #[must_use]
    pub fn new(
        signaling: SignalingSession,
        transport: Arc<dyn Transport>,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<ConsumerEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                signaling,
                transport: tokio::sync::RwLock::new(transport),
                consumers: Mutex::new(HashMap::new()),
                speaking: Mutex::new(HashMap::new()),
                events: tx,
            },
            rx,
        )
    }

    /// Swap in the real recv transport once `RoomClient::join` has
    /// created it.
    pub async fn attach_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().await = transport;
    }

    #[must_use]
    pub async fn get(&self, consumer_id: &str) -> Option<Consumer> {
        self.consumers.lock().await.get(consumer_id).cloned()
    }

    #[must_use]
    pub async fn for_peer(&self, peer_id: &str) -> Vec<Consumer> {
        self.consumers
            .lock()
            .await
            .values()
            .filter(|c| c.peer_id == peer_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub async fn all(&self) -> Vec<Consumer> {
        self.consumers.lock().await.values().cloned().collect()
    }

    /// Handle an inbound `newConsumer` notification: create the consumer
    /// on the recv transport, store it, and start it.
    #[instrument(skip(self, params), fields(peer_id = %params.peer_id, producer_id = %params.producer_id))]
    pub async fn new_consumer(&self, params: NewConsumerParams) -> Result<()> {
        self.transport
            .read()
            .await
            .consume(&params.producer_id, params.rtp_parameters.clone())
            .await?;

        let resolution_scalings = derive_resolution_scalings(&params.rtp_parameters);
        let spatial_layers = resolution_scalings.len().max(1) as u8;

        let mut speaking = None;
        if matches!(params.kind, MediaKind::Audio) {
            speaking = Some(SpeakingDetector::new(-50.0));
        }

        let consumer = Consumer {
            id: params.id.clone(),
            peer_id: params.peer_id.clone(),
            producer_id: params.producer_id,
            kind: params.kind,
            consumer_type: params.consumer_type,
            source: params.source,
            locally_paused: true,
            remotely_paused: params.producer_paused,
            spatial_layers,
            temporal_layers: 3,
            preferred_spatial_layer: spatial_layers.saturating_sub(1),
            preferred_temporal_layer: 2,
            priority: 1,
            rtp_parameters: RtpParameters::default(),
            score: None,
            width: None,
            height: None,
            resolution_scalings,
            audio_gain: None,
            volume: None,
        };

        self.consumers.lock().await.insert(params.id.clone(), consumer);
        if let Some(detector) = speaking {
            self.speaking.lock().await.insert(params.id.clone(), detector);
        }

        info!("consumer created");
        Ok(())
    }

    /// `_startConsumer` ≡ `_resumeConsumer(initial=true)` (spec.md §4.4).
    pub async fn start_consumer(&self, consumer_id: &str) -> Result<()> {
        self.resume_consumer(consumer_id, true).await
    }

    /// `_resumeConsumer`: sends `resumeConsumer` iff (initial or currently
    /// paused) and not closed. The `notFoundInMediasoupError` marker closes
    /// the local consumer silently rather than propagating.
    #[instrument(skip(self))]
    pub async fn resume_consumer(&self, consumer_id: &str, initial: bool) -> Result<()> {
        let should_send = {
            let guard = self.consumers.lock().await;
            match guard.get(consumer_id) {
                Some(c) => initial || c.locally_paused,
                None => return Ok(()),
            }
        };

        if !should_send {
            return Ok(());
        }

        match self
            .signaling
            .send_request(RequestMethod::ResumeConsumer, json!({ "consumerId": consumer_id }))
            .await
        {
            Ok(_) => {
                if let Some(c) = self.consumers.lock().await.get_mut(consumer_id) {
                    c.locally_paused = false;
                }
                Ok(())
            }
            Err(err) if err.is_sfu_not_found() => {
                self.close_locally(consumer_id).await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// `_pauseConsumer`: sends `pauseConsumer` iff not already paused and
    /// not closed.
    #[instrument(skip(self))]
    pub async fn pause_consumer(&self, consumer_id: &str) -> Result<()> {
        let already_paused = {
            let guard = self.consumers.lock().await;
            match guard.get(consumer_id) {
                Some(c) => c.locally_paused,
                None => return Ok(()),
            }
        };
        if already_paused {
            return Ok(());
        }

        match self
            .signaling
            .send_request(RequestMethod::PauseConsumer, json!({ "consumerId": consumer_id }))
            .await
        {
            Ok(_) => {
                if let Some(c) = self.consumers.lock().await.get_mut(consumer_id) {
                    c.locally_paused = true;
                }
                Ok(())
            }
            Err(err) if err.is_sfu_not_found() => {
                self.close_locally(consumer_id).await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn close_locally(&self, consumer_id: &str) {
        self.consumers.lock().await.remove(consumer_id);
        self.speaking.lock().await.remove(consumer_id);
        let _ = self.events.send(ConsumerEvent::Closed {
            consumer_id: consumer_id.to_string(),
        });
    }

    /// Inbound `consumerClosed` notification.
    pub async fn on_consumer_closed(&self, consumer_id: &str) {
        self.close_locally(consumer_id).await;
    }

    pub async fn on_consumer_paused(&self, consumer_id: &str) {
        if let Some(c) = self.consumers.lock().await.get_mut(consumer_id) {
            c.remotely_paused = true;
        }
    }

    pub async fn on_consumer_resumed(&self, consumer_id: &str) {
        if let Some(c) = self.consumers.lock().await.get_mut(consumer_id) {
            c.remotely_paused = false;
        }
    }

    pub async fn on_consumer_score(&self, consumer_id: &str, score: i64) {
        if let Some(c) = self.consumers.lock().await.get_mut(consumer_id) {
            c.score = Some(score);
        }
    }

    /// `updateSpotlights(newList)`: resume video consumers whose peer is
    /// in the new spotlight list, pause the rest (spec.md §4.4).
    #[instrument(skip(self, new_spotlights))]
    pub async fn update_spotlights(&self, new_spotlights: &[String]) -> Result<()> {
        let video_consumer_ids: Vec<String> = self
            .consumers
            .lock()
            .await
            .values()
            .filter(|c| matches!(c.kind, MediaKind::Video))
            .map(|c| c.id.clone())
            .collect();

        for consumer_id in video_consumer_ids {
            let peer_id = self
                .consumers
                .lock()
                .await
                .get(&consumer_id)
                .map(|c| c.peer_id.clone());
            let Some(peer_id) = peer_id else { continue };

            if new_spotlights.iter().any(|p| p == &peer_id) {
                self.resume_consumer(&consumer_id, false).await?;
            } else {
                self.pause_consumer(&consumer_id).await?;
            }
        }
        Ok(())
    }

    /// `adaptConsumerPreferredLayers` (spec.md §4.4).
    #[instrument(skip(self))]
    pub async fn adapt_preferred_layers(
        &self,
        consumer_id: &str,
        viewport_width: u32,
        viewport_height: u32,
        adaptive_scaling_factor: f64,
    ) -> Result<()> {
        let (consumer, layers) = {
            let guard = self.consumers.lock().await;
            let Some(consumer) = guard.get(consumer_id) else {
                return Ok(());
            };
            let Some(layers) =
                adapt_preferred_layers(consumer, viewport_width, viewport_height, adaptive_scaling_factor)
            else {
                return Ok(());
            };
            (consumer.clone(), layers)
        };

        if layers.spatial == consumer.preferred_spatial_layer
            && layers.temporal == consumer.preferred_temporal_layer
        {
            return Ok(());
        }

        self.signaling
            .send_request(
                RequestMethod::SetConsumerPreferedLayers,
                json!({
                    "consumerId": consumer_id,
                    "spatialLayer": layers.spatial,
                    "temporalLayer": layers.temporal,
                }),
            )
            .await?;

        if let Some(c) = self.consumers.lock().await.get_mut(consumer_id) {
            c.preferred_spatial_layer = layers.spatial;
            c.preferred_temporal_layer = layers.temporal;
        }
        Ok(())
    }

    /// Feed a volume sample (dBFS) for an audio consumer's
    /// speaking-detection instance. Volume is published coalesced by
    /// integer-rounded comparison (spec.md §4.4).
    pub async fn on_consumer_volume(&self, consumer_id: &str, db: f32) {
        let peer_id = match self.consumers.lock().await.get(consumer_id) {
            Some(c) => c.peer_id.clone(),
            None => return,
        };

        let mut speaking_guard = self.speaking.lock().await;
        let Some(detector) = speaking_guard.get_mut(consumer_id) else {
            return;
        };

        let rounded_changed = {
            let previous = self
                .consumers
                .lock()
                .await
                .get(consumer_id)
                .and_then(|c| c.volume)
                .map(|v| v.round() as i32);
            previous != Some(db.round() as i32)
        };

        for event in detector.on_volume(db) {
            match event {
                SpeakingEvent::VolumeChanged(db) => {
                    if rounded_changed {
                        if let Some(c) = self.consumers.lock().await.get_mut(consumer_id) {
                            c.volume = Some(db);
                        }
                        let _ = self.events.send(ConsumerEvent::Volume {
                            peer_id: peer_id.clone(),
                            db,
                        });
                    }
                }
                SpeakingEvent::Speaking => {
                    let _ = self.events.send(ConsumerEvent::Speaking {
                        peer_id: peer_id.clone(),
                    });
                }
                SpeakingEvent::StoppedSpeaking => {
                    let _ = self.events.send(ConsumerEvent::StoppedSpeaking {
                        peer_id: peer_id.clone(),
                    });
                }
            }
        }
        debug!(consumer_id, db, "consumer volume sample processed");
    }

    /// Tear down every consumer (transient reconnect / `close()`).
    pub async fn close_all(&self) {
        self.consumers.lock().await.clear();
        self.speaking.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::RoomClientConfig;
    use crate::rtc::fake::FakeTransport;
    use crate::rtc::DtlsParameters;
    use crate::signaling::transport::SignalingTransport;

    struct AcceptsEverything;

    #[async_trait]
    impl SignalingTransport for AcceptsEverything {
        async fn request(&self, _method: &'static str, _data: Value) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn close(&self) {}
    }

    struct AlwaysNotFound;

    #[async_trait]
    impl SignalingTransport for AlwaysNotFound {
        async fn request(&self, _method: &'static str, _data: Value) -> Result<Value> {
            Err(RoomError::SfuNotFound("gone".into()))
        }
        async fn close(&self) {}
    }

    fn session(transport: Arc<dyn SignalingTransport>) -> SignalingSession {
        SignalingSession::new(transport, Arc::new(RoomClientConfig::default()))
    }

    async fn registry_with(
        transport: Arc<dyn SignalingTransport>,
    ) -> (ConsumerRegistry, Arc<FakeTransport>) {
        let recv_transport = Arc::new(FakeTransport::new("recv".into(), session(Arc::new(AcceptsEverything))));
        recv_transport.connect(DtlsParameters::default()).await.unwrap();
        let (registry, _rx) = ConsumerRegistry::new(session(transport), recv_transport.clone());
        (registry, recv_transport)
    }

    fn params() -> NewConsumerParams {
        NewConsumerParams {
            id: "c1".into(),
            peer_id: "p1".into(),
            producer_id: "prod1".into(),
            kind: MediaKind::Video,
            consumer_type: ConsumerType::Simulcast,
            rtp_parameters: RtpParameters::default(),
            source: Some("webcam".into()),
            producer_paused: false,
        }
    }

    #[tokio::test]
    async fn start_consumer_sends_resume_and_clears_local_pause() {
        let (registry, _transport) = registry_with(Arc::new(AcceptsEverything)).await;
        registry.new_consumer(params()).await.unwrap();

        registry.start_consumer("c1").await.unwrap();

        let consumer = registry.get("c1").await.unwrap();
        assert!(!consumer.locally_paused);
    }

    #[tokio::test]
    async fn not_found_marker_closes_consumer_locally_without_error() {
        let (registry, _transport) = registry_with(Arc::new(AlwaysNotFound)).await;
        registry.new_consumer(params()).await.unwrap();

        let result = registry.start_consumer("c1").await;

        assert!(result.is_ok());
        assert!(registry.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn update_spotlights_pauses_peers_not_in_the_new_list() {
        let (registry, _transport) = registry_with(Arc::new(AcceptsEverything)).await;
        registry.new_consumer(params()).await.unwrap();
        registry.start_consumer("c1").await.unwrap();

        registry.update_spotlights(&[]).await.unwrap();

        let consumer = registry.get("c1").await.unwrap();
        assert!(consumer.locally_paused);
    }

    #[tokio::test]
    async fn pause_then_resumed_notification_round_trips_with_no_net_spotlight_change() {
        let (registry, _transport) = registry_with(Arc::new(AcceptsEverything)).await;
        registry.new_consumer(params()).await.unwrap();

        registry.on_consumer_paused("c1").await;
        assert!(registry.get("c1").await.unwrap().remotely_paused);

        registry.on_consumer_resumed("c1").await;
        assert!(!registry.get("c1").await.unwrap().remotely_paused);
    }
}
