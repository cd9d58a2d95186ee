//! Producer Registry (spec.md §4.3 — component 3).
//!
//! Each local source (mic, webcam, screen, screen-audio, and one entry
//! per extra-video device id) is guarded by its own `tokio::sync::Mutex`,
//! held for the duration of the whole operation. This is the
//! single-flight serialization spec.md §5 requires ("operations are
//! serialized via an in-progress flag... An implementation may instead
//! use per-source promise chains") — holding the lock across the entire
//! async body *is* that promise chain.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::config::RoomClientConfig;
use crate::error::{RoomError, Result};
use crate::producer::media_source::MediaSource;
use crate::producer::speaking::{SpeakingDetector, SpeakingEvent};
use crate::producer::types::{
    AudioConstraints, MediaKind, OpusOptions, Producer, ProducerSource, ProducerSourceTag,
    VideoRequest,
};
use crate::rtc::{RtpEncodingParameters, RtpParameters, Transport};
use crate::signaling::{RequestMethod, SignalingSession};

/// Options for `updateMic` (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct UpdateMicOptions {
    pub start: bool,
    pub restart: bool,
    pub new_device_id: Option<String>,
}

/// Options for `updateWebcam`/`addExtraVideo` (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct UpdateVideoOptions {
    pub init: bool,
    pub start: bool,
    pub restart: bool,
    pub new_device_id: Option<String>,
    pub new_resolution: Option<u32>,
    pub new_frame_rate: Option<u32>,
}

/// Options for `updateScreenSharing` (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct UpdateScreenOptions {
    pub start: bool,
    pub new_resolution: Option<u32>,
    pub new_frame_rate: Option<u32>,
}

/// Event surfaced to the Room Coordinator / Notification Surface when a
/// producer's speaking state or volume changes.
#[derive(Debug, Clone)]
pub enum ProducerEvent {
    Volume { source: ProducerSource, db: f32 },
    Speaking { source: ProducerSource },
    StoppedSpeaking { source: ProducerSource },
    AutoMuted,
}

pub struct ProducerRegistry {
    config: Arc<RoomClientConfig>,
    signaling: SignalingSession,
    transport: tokio::sync::RwLock<Arc<dyn Transport>>,
    media_source: Arc<dyn MediaSource>,

    mic: Mutex<Option<Producer>>,
    webcam: Mutex<Option<Producer>>,
    screen: Mutex<Option<Producer>>,
    screen_audio: Mutex<Option<Producer>>,
    extra_video: Mutex<HashMap<String, Producer>>,

    mic_speaking: Mutex<SpeakingDetector>,
    voice_activated_unmute: bool,

    events: tokio::sync::mpsc::UnboundedSender<ProducerEvent>,
}

impl ProducerRegistry {
    #[must_use]
    pub fn new(
        config: Arc<RoomClientConfig>,
        signaling: SignalingSession,
        transport: Arc<dyn Transport>,
        media_source: Arc<dyn MediaSource>,
        voice_activated_unmute: bool,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<ProducerEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                config,
                signaling,
                transport: tokio::sync::RwLock::new(transport),
                media_source,
                mic: Mutex::new(None),
                webcam: Mutex::new(None),
                screen: Mutex::new(None),
                screen_audio: Mutex::new(None),
                extra_video: Mutex::new(HashMap::new()),
                mic_speaking: Mutex::new(SpeakingDetector::new(-50.0)),
                voice_activated_unmute,
                events: tx,
            },
            rx,
        )
    }

    /// Swap in the real send transport once `RoomClient::join` has
    /// created it. Producers created before this point are impossible —
    /// nothing calls `update_mic`/`update_webcam`/etc. until after `join`.
    pub async fn attach_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().await = transport;
    }

    #[must_use]
    pub async fn has_mic(&self) -> bool {
        self.mic.lock().await.is_some()
    }

    #[must_use]
    pub async fn has_webcam(&self) -> bool {
        self.webcam.lock().await.is_some()
    }

    async fn close_remote(&self, producer_id: &str) -> Result<()> {
        self.signaling
            .send_request(RequestMethod::CloseProducer, json!({ "producerId": producer_id }))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, options))]
    pub async fn update_mic(&self, options: UpdateMicOptions) -> Result<()> {
        if options.new_device_id.is_some() && !options.restart {
            return Err(RoomError::InvalidArgument(
                "changing device requires restart".to_string(),
            ));
        }

        let mut guard = self.mic.lock().await;
        let should_replace = options.start || (options.restart && guard.is_some());
        if !should_replace {
            return Ok(());
        }

        if let Some(existing) = guard.take() {
            self.media_source.stop(&existing.track_id).await;
            self.close_remote(&existing.id).await.ok();
        }

        let constraints = AudioConstraints::default();
        let local = self.media_source.acquire_audio(&constraints).await?;
        let _opus = OpusOptions::default();

        let producer_id = self
            .transport
            .read()
            .await
            .produce(
                MediaKind::Audio,
                RtpParameters::default(),
                vec![RtpEncodingParameters::default()],
                ProducerSource::Mic.wire_source(),
            )
            .await?;

        *guard = Some(Producer {
            id: producer_id,
            source: ProducerSourceTag {
                source: ProducerSource::Mic,
                device_id: options.new_device_id,
            },
            kind: MediaKind::Audio,
            paused: false,
            track_id: local.track_id,
            rtp_parameters: RtpParameters::default(),
            codec: Some("opus".to_string()),
            score: None,
        });

        info!("mic producer created");
        Ok(())
    }

    /// Feed a volume sample (dBFS) from the mic's speaking-detection
    /// instance, driving voice-activated-unmute when enabled.
    pub async fn on_mic_volume(&self, db: f32) {
        let events = self.mic_speaking.lock().await.on_volume(db);
        for event in events {
            match event {
                SpeakingEvent::VolumeChanged(db) => {
                    let _ = self.events.send(ProducerEvent::Volume {
                        source: ProducerSource::Mic,
                        db,
                    });
                }
                SpeakingEvent::Speaking => {
                    if self.voice_activated_unmute {
                        let mut guard = self.mic.lock().await;
                        if let Some(producer) = guard.as_mut() {
                            if producer.paused {
                                producer.paused = false;
                                let _ = self
                                    .signaling
                                    .send_request(
                                        RequestMethod::ResumeProducer,
                                        json!({ "producerId": producer.id }),
                                    )
                                    .await;
                            }
                        }
                    }
                    let _ = self.events.send(ProducerEvent::Speaking {
                        source: ProducerSource::Mic,
                    });
                }
                SpeakingEvent::StoppedSpeaking => {
                    if self.voice_activated_unmute {
                        let mut guard = self.mic.lock().await;
                        if let Some(producer) = guard.as_mut() {
                            if !producer.paused {
                                producer.paused = true;
                                let _ = self
                                    .signaling
                                    .send_request(
                                        RequestMethod::PauseProducer,
                                        json!({ "producerId": producer.id }),
                                    )
                                    .await;
                            }
                        }
                        self.mic_speaking.lock().await.mark_auto_paused();
                        let _ = self.events.send(ProducerEvent::AutoMuted);
                    }
                    let _ = self.events.send(ProducerEvent::StoppedSpeaking {
                        source: ProducerSource::Mic,
                    });
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn mute_mic(&self) -> Result<()> {
        let mut guard = self.mic.lock().await;
        let Some(producer) = guard.as_mut() else {
            return Ok(());
        };
        if producer.paused {
            return Ok(());
        }
        producer.paused = true;
        self.signaling
            .send_request(RequestMethod::PauseProducer, json!({ "producerId": producer.id }))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unmute_mic(&self) -> Result<()> {
        {
            let mut guard = self.mic.lock().await;
            if let Some(producer) = guard.as_mut() {
                if producer.paused {
                    producer.paused = false;
                    self.signaling
                        .send_request(
                            RequestMethod::ResumeProducer,
                            json!({ "producerId": producer.id }),
                        )
                        .await?;
                }
                return Ok(());
            }
        }
        self.update_mic(UpdateMicOptions {
            start: true,
            ..Default::default()
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn disable_mic(&self) -> Result<()> {
        let mut guard = self.mic.lock().await;
        if let Some(producer) = guard.take() {
            self.media_source.stop(&producer.track_id).await;
            self.close_remote(&producer.id).await?;
        }
        Ok(())
    }

    fn video_encodings(&self, source: ProducerSource) -> Vec<RtpEncodingParameters> {
        if !self.config.simulcast {
            return vec![RtpEncodingParameters::default()];
        }
        let priority = match source {
            ProducerSource::Webcam => self.config.network_priorities.main_video,
            ProducerSource::ExtraVideo => self.config.network_priorities.extra_video,
            ProducerSource::Screen => self.config.network_priorities.screen_share,
            _ => self.config.network_priorities.additional_videos,
        };
        vec![
            RtpEncodingParameters {
                scale_resolution_down_by: Some(4.0),
                network_priority: Some(priority),
                ..Default::default()
            },
            RtpEncodingParameters {
                scale_resolution_down_by: Some(2.0),
                ..Default::default()
            },
            RtpEncodingParameters {
                scale_resolution_down_by: Some(1.0),
                ..Default::default()
            },
        ]
    }

    #[instrument(skip(self, options))]
    pub async fn update_webcam(&self, options: UpdateVideoOptions) -> Result<()> {
        let mut guard = self.webcam.lock().await;
        let should_replace = options.start || options.init || (options.restart && guard.is_some());
        if !should_replace {
            return Ok(());
        }

        if let Some(existing) = guard.take() {
            self.media_source.stop(&existing.track_id).await;
            self.close_remote(&existing.id).await.ok();
        }

        let request = VideoRequest {
            device_id: options.new_device_id.clone(),
            width: options.new_resolution.unwrap_or(1280),
            frame_rate: options.new_frame_rate.unwrap_or(30),
        };
        let local = self.media_source.acquire_video(&request).await?;

        let encodings = self.video_encodings(ProducerSource::Webcam);
        let producer_id = self
            .transport
            .read()
            .await
            .produce(
                MediaKind::Video,
                RtpParameters::default(),
                encodings,
                ProducerSource::Webcam.wire_source(),
            )
            .await?;

        *guard = Some(Producer {
            id: producer_id,
            source: ProducerSourceTag {
                source: ProducerSource::Webcam,
                device_id: options.new_device_id,
            },
            kind: MediaKind::Video,
            paused: false,
            track_id: local.track_id,
            rtp_parameters: RtpParameters::default(),
            codec: Some("VP8".to_string()),
            score: None,
        });

        info!("webcam producer created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn disable_webcam(&self) -> Result<()> {
        let mut guard = self.webcam.lock().await;
        if let Some(producer) = guard.take() {
            self.media_source.stop(&producer.track_id).await;
            self.close_remote(&producer.id).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, options))]
    pub async fn add_extra_video(&self, device_id: String, options: UpdateVideoOptions) -> Result<()> {
        let mut guard = self.extra_video.lock().await;
        if guard.values().any(|p| p.source.device_id.as_deref() == Some(device_id.as_str())) {
            return Err(RoomError::InvalidArgument(format!(
                "extra video for device {device_id} already exists"
            )));
        }

        let request = VideoRequest {
            device_id: Some(device_id.clone()),
            width: options.new_resolution.unwrap_or(1280),
            frame_rate: options.new_frame_rate.unwrap_or(30),
        };
        let local = self.media_source.acquire_video(&request).await?;
        let encodings = self.video_encodings(ProducerSource::ExtraVideo);
        let producer_id = self
            .transport
            .read()
            .await
            .produce(
                MediaKind::Video,
                RtpParameters::default(),
                encodings,
                ProducerSource::ExtraVideo.wire_source(),
            )
            .await?;

        guard.insert(
            device_id.clone(),
            Producer {
                id: producer_id,
                source: ProducerSourceTag {
                    source: ProducerSource::ExtraVideo,
                    device_id: Some(device_id),
                },
                kind: MediaKind::Video,
                paused: false,
                track_id: local.track_id,
                rtp_parameters: RtpParameters::default(),
                codec: Some("VP8".to_string()),
                score: None,
            },
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn disable_extra_video(&self, device_id: &str) -> Result<()> {
        let mut guard = self.extra_video.lock().await;
        if let Some(producer) = guard.remove(device_id) {
            self.media_source.stop(&producer.track_id).await;
            self.close_remote(&producer.id).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, options))]
    pub async fn update_screen_sharing(&self, options: UpdateScreenOptions) -> Result<()> {
        if !options.start {
            return self.disable_screen_sharing().await;
        }

        let request = VideoRequest {
            device_id: None,
            width: options.new_resolution.unwrap_or(1920),
            frame_rate: options.new_frame_rate.unwrap_or(15),
        };
        let (video, audio) = self.media_source.acquire_screen(&request).await?;

        let mut video_encodings = self.video_encodings(ProducerSource::Screen);
        if self.config.simulcast_sharing {
            for encoding in &mut video_encodings {
                encoding.dtx = Some(true);
            }
        }

        let video_producer_id = self
            .transport
            .read()
            .await
            .produce(
                MediaKind::Video,
                RtpParameters::default(),
                video_encodings,
                ProducerSource::Screen.wire_source(),
            )
            .await?;

        {
            let mut guard = self.screen.lock().await;
            *guard = Some(Producer {
                id: video_producer_id,
                source: ProducerSourceTag {
                    source: ProducerSource::Screen,
                    device_id: None,
                },
                kind: MediaKind::Video,
                paused: false,
                track_id: video.track_id,
                rtp_parameters: RtpParameters::default(),
                codec: Some("VP8".to_string()),
                score: None,
            });
        }

        if let Some(audio_track) = audio {
            let audio_producer_id = self
                .transport
                .read()
                .await
                .produce(
                    MediaKind::Audio,
                    RtpParameters::default(),
                    vec![RtpEncodingParameters::default()],
                    // Intentionally "mic", not "screen-audio" — see
                    // `ProducerSource::ScreenAudio::wire_source`.
                    ProducerSource::ScreenAudio.wire_source(),
                )
                .await?;

            let mut guard = self.screen_audio.lock().await;
            *guard = Some(Producer {
                id: audio_producer_id,
                source: ProducerSourceTag {
                    source: ProducerSource::ScreenAudio,
                    device_id: None,
                },
                kind: MediaKind::Audio,
                paused: false,
                track_id: audio_track.track_id,
                rtp_parameters: RtpParameters::default(),
                codec: Some("opus".to_string()),
                // Volume initialized to 0 per spec.md §4.3: the
                // screen-audio producer's level is not driven by a
                // speaking detector like the mic is.
                score: Some(json!({ "volume": 0 })),
            });
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn disable_screen_sharing(&self) -> Result<()> {
        if let Some(producer) = self.screen.lock().await.take() {
            self.media_source.stop(&producer.track_id).await;
            self.close_remote(&producer.id).await?;
        }
        if let Some(producer) = self.screen_audio.lock().await.take() {
            self.media_source.stop(&producer.track_id).await;
            self.close_remote(&producer.id).await.ok();
        }
        Ok(())
    }

    /// Tear down every local producer (used by `RoomClient::close` and by
    /// the transient-reconnect path, spec.md §4.1).
    pub async fn close_all(&self) {
        for producer in [
            self.mic.lock().await.take(),
            self.webcam.lock().await.take(),
            self.screen.lock().await.take(),
            self.screen_audio.lock().await.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.media_source.stop(&producer.track_id).await;
        }

        let mut extras = self.extra_video.lock().await;
        for producer in extras.drain().map(|(_, p)| p) {
            self.media_source.stop(&producer.track_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::config::RoomClientConfig;
    use crate::producer::media_source::fake::FakeMediaSource;
    use crate::rtc::fake::FakeTransport;
    use crate::signaling::transport::SignalingTransport;

    struct AcceptsEverything;

    #[async_trait]
    impl SignalingTransport for AcceptsEverything {
        async fn request(&self, _method: &'static str, _data: Value) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn close(&self) {}
    }

    fn registry_with() -> (ProducerRegistry, tokio::sync::mpsc::UnboundedReceiver<ProducerEvent>) {
        let config = Arc::new(RoomClientConfig::default());
        let signaling = SignalingSession::new(Arc::new(AcceptsEverything), config.clone());
        let transport: Arc<dyn Transport> = Arc::new(FakeTransport::new("t1".into(), signaling.clone()));
        ProducerRegistry::new(config, signaling, transport, Arc::new(FakeMediaSource::default()), true)
    }

    #[tokio::test]
    async fn update_mic_with_new_device_but_no_restart_fails() {
        let (registry, _rx) = registry_with();

        let result = registry
            .update_mic(UpdateMicOptions {
                start: false,
                restart: false,
                new_device_id: Some("device-2".into()),
            })
            .await;

        assert!(matches!(result, Err(RoomError::InvalidArgument(_))));
        assert!(!registry.has_mic().await);
    }

    #[tokio::test]
    async fn update_mic_then_start_creates_exactly_one_producer() {
        let (registry, _rx) = registry_with();

        registry
            .update_mic(UpdateMicOptions {
                start: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(registry.has_mic().await);
    }

    #[tokio::test]
    async fn mute_then_unmute_does_not_create_a_second_producer() {
        let (registry, _rx) = registry_with();

        registry
            .update_mic(UpdateMicOptions {
                start: true,
                ..Default::default()
            })
            .await
            .unwrap();
        registry.mute_mic().await.unwrap();
        registry.unmute_mic().await.unwrap();

        assert!(registry.has_mic().await);
    }

    #[tokio::test]
    async fn add_extra_video_twice_for_same_device_is_rejected() {
        let (registry, _rx) = registry_with();

        let opts = UpdateVideoOptions {
            init: false,
            start: true,
            restart: false,
            new_device_id: Some("cam-2".into()),
            new_resolution: None,
            new_frame_rate: None,
        };
        registry.add_extra_video("cam-2".into(), opts.clone()).await.unwrap();
        let result = registry.add_extra_video("cam-2".into(), opts).await;
        assert!(result.is_err());
    }
}
