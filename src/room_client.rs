//! The Room Client: wires every component together behind the
//! imperative command surface spec.md §1 describes.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::RoomClientConfig;
use crate::consumer::ConsumerRegistry;
use crate::devices::{self, MediaDeviceInfo};
use crate::error::{RoomError, Result};
use crate::notify::NotificationSurface;
use crate::producer::media_source::MediaSource;
use crate::producer::ProducerRegistry;
use crate::room::{JoinOptions, RoomCoordinator};
use crate::rtc::device::CreateTransportParams;
use crate::rtc::{on_connection_state_change, IceParameters, IceRestartController, IceServer, RtpCapabilities, SfuDevice, Transport};
use crate::signaling::{InboundLoop, RequestMethod, SignalingSession, SignalingTransport};
use crate::store::{StoreDelta, StoreSink};

/// Everything needed to construct a [`RoomClient`]: the concrete
/// implementations of every seam spec.md §1 treats as "assumed
/// external" (signaling transport, SFU device, local media source)
/// plus the output sinks (store, notifications).
pub struct RoomClientDeps {
    pub config: Arc<RoomClientConfig>,
    pub signaling_transport: Arc<dyn SignalingTransport>,
    pub device: Arc<dyn SfuDevice>,
    pub media_source: Arc<dyn MediaSource>,
    pub store: Arc<dyn StoreSink>,
    pub notify: Arc<NotificationSurface>,
    pub voice_activated_unmute: bool,
    pub is_mobile: bool,
}

/// Owns the whole component graph and exposes the operation surface
/// spec.md §1/§4 describes. One instance per joined room.
pub struct RoomClient {
    config: Arc<RoomClientConfig>,
    signaling: SignalingSession,
    device: Arc<dyn SfuDevice>,
    send_transport: RwLock<Option<Arc<dyn Transport>>>,
    recv_transport: RwLock<Option<Arc<dyn Transport>>>,
    producers: Arc<ProducerRegistry>,
    consumers: Arc<ConsumerRegistry>,
    coordinator: Arc<RoomCoordinator>,
    store: Arc<dyn StoreSink>,
    #[allow(dead_code)]
    is_mobile: bool,
}

impl RoomClient {
    /// Construct the component graph and spawn its background loops
    /// (inbound signaling demux, producer/consumer event forwarding).
    /// Does not touch the network beyond that — call
    /// [`RoomClient::join`] to actually join a room.
    pub fn new(
        deps: RoomClientDeps,
        inbound: tokio::sync::mpsc::UnboundedReceiver<crate::signaling::transport::Inbound>,
    ) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let signaling = SignalingSession::new(deps.signaling_transport, deps.config.clone());

        // Registries are built against an unattached placeholder
        // transport; `join()` swaps in the real send/recv transports
        // before anything calls `produce`/`consume` on them.
        let placeholder_send: Arc<dyn Transport> = Arc::new(UnattachedTransport);
        let placeholder_recv: Arc<dyn Transport> = Arc::new(UnattachedTransport);

        let (producers, mut producer_events) = ProducerRegistry::new(
            deps.config.clone(),
            signaling.clone(),
            placeholder_send,
            deps.media_source,
            deps.voice_activated_unmute,
        );
        let (consumers, mut consumer_events) = ConsumerRegistry::new(signaling.clone(), placeholder_recv);

        let producers = Arc::new(producers);
        let consumers = Arc::new(consumers);

        let coordinator = Arc::new(RoomCoordinator::new(
            deps.config.clone(),
            signaling.clone(),
            producers.clone(),
            consumers.clone(),
            deps.store.clone(),
            deps.notify.clone(),
        ));

        let client = Arc::new(Self {
            config: deps.config,
            signaling,
            device: deps.device,
            send_transport: RwLock::new(None),
            recv_transport: RwLock::new(None),
            producers,
            consumers,
            coordinator: coordinator.clone(),
            store: deps.store.clone(),
            is_mobile: deps.is_mobile,
        });

        let notify_for_producer_events = deps.notify.clone();
        tokio::spawn(async move {
            use crate::producer::ProducerEvent;
            while let Some(event) = producer_events.recv().await {
                if let ProducerEvent::AutoMuted = event {
                    notify_for_producer_events.info("auto-muted", "Your microphone was muted automatically");
                }
            }
        });

        let store_for_consumer_events = deps.store.clone();
        tokio::spawn(async move {
            use crate::consumer::ConsumerEvent;
            while let Some(event) = consumer_events.recv().await {
                if let ConsumerEvent::Closed { consumer_id } = event {
                    store_for_consumer_events.apply(StoreDelta::new("consumers.closed", consumer_id));
                }
            }
        });

        let inbound_loop = InboundLoop::new(inbound);
        let coordinator_for_notifications = coordinator.clone();
        let coordinator_for_lifecycle = coordinator;
        let handle = tokio::spawn(async move {
            inbound_loop
                .run(
                    move |method, data| {
                        let coordinator = coordinator_for_notifications.clone();
                        Box::pin(async move {
                            coordinator.dispatch(method, data).await;
                        })
                    },
                    move |event| {
                        let coordinator = coordinator_for_lifecycle.clone();
                        Box::pin(async move {
                            use crate::signaling::transport::ConnectionEvent;
                            match event {
                                ConnectionEvent::Disconnect { permanent: true, .. } => {
                                    coordinator.on_permanent_disconnect().await;
                                }
                                ConnectionEvent::Disconnect { permanent: false, .. } => {
                                    coordinator.on_transient_disconnect().await;
                                }
                                ConnectionEvent::Reconnect => {
                                    coordinator.on_reconnect().await;
                                }
                                ConnectionEvent::Connect | ConnectionEvent::ReconnectFailed => {}
                            }
                        })
                    },
                )
                .await;
        });

        (client, handle)
    }

    /// Enumerate local devices and begin polling for changes, forwarding
    /// each change to the store (spec.md §4.8).
    pub fn start_device_watch(&self, poll_interval: std::time::Duration) -> Vec<MediaDeviceInfo> {
        let (initial, mut rx) = devices::watch(poll_interval);
        let store = self.store.clone();
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                store.apply(StoreDelta::new("devices.changed", &change));
            }
        });
        initial
    }

    /// `join({roomId, displayName, picture, joinVideo, joinAudio})`
    /// (spec.md §4.2 device/transport setup driven from the entry
    /// point, §4.6 `_joinRoom`).
    #[instrument(skip(self, options))]
    pub async fn join(self: &Arc<Self>, options: JoinOptions) -> Result<()> {
        self.coordinator.start_connecting(options).await;

        let caps_response = self
            .signaling
            .send_request(RequestMethod::GetRouterRtpCapabilities, json!({}))
            .await?;
        let caps = strip_video_orientation_extension(caps_response);

        self.device.load(RtpCapabilities(caps)).await?;

        // TURN servers arrive with `roomReady`; transports are created
        // with an empty ICE server list up front and `restart_ice`
        // carries the real list afterwards (spec.md §4.2/§4.6).
        let turn_servers: Vec<IceServer> = Vec::new();

        let send_params = self.create_transport_params(false, &turn_servers).await?;
        let send_dtls = send_params.dtls_parameters.clone();
        let send_transport: Arc<dyn Transport> =
            Arc::from(self.device.create_send_transport(send_params).await?);
        send_transport.connect(send_dtls).await?;
        self.producers.attach_transport(send_transport.clone()).await;
        self.spawn_ice_watcher(send_transport.clone());
        *self.send_transport.write().await = Some(send_transport);

        let recv_params = self.create_transport_params(true, &turn_servers).await?;
        let recv_dtls = recv_params.dtls_parameters.clone();
        let recv_transport: Arc<dyn Transport> =
            Arc::from(self.device.create_recv_transport(recv_params).await?);
        recv_transport.connect(recv_dtls).await?;
        self.consumers.attach_transport(recv_transport.clone()).await;
        self.spawn_ice_watcher(recv_transport.clone());
        *self.recv_transport.write().await = Some(recv_transport);

        info!("transports created, awaiting roomReady");
        Ok(())
    }

    async fn create_transport_params(
        &self,
        consuming: bool,
        turn_servers: &[IceServer],
    ) -> Result<CreateTransportParams> {
        let response = self
            .signaling
            .send_request(
                RequestMethod::CreateWebRtcTransport,
                json!({ "forceTcp": false, "producing": !consuming, "consuming": consuming }),
            )
            .await?;

        let id = response
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RoomError::Internal("createWebRtcTransport response missing id".into()))?
            .to_string();

        Ok(CreateTransportParams {
            id,
            ice_parameters: crate::rtc::IceParameters(response.get("iceParameters").cloned().unwrap_or_default()),
            ice_candidates: crate::rtc::IceCandidates(response.get("iceCandidates").cloned().unwrap_or_default()),
            dtls_parameters: crate::rtc::DtlsParameters(response.get("dtlsParameters").cloned().unwrap_or_default()),
            ice_servers: turn_servers.to_vec(),
            force_relay: false,
            signaling: self.signaling.clone(),
        })
    }

    /// Drive ICE-restart recovery from a transport's own
    /// `connectionstatechange` stream: on `disconnected`/`failed`,
    /// schedule a `restartIce` round-trip after the initial backoff
    /// delay and apply the fresh ICE parameters to the transport
    /// (spec.md §4.2, §8).
    fn spawn_ice_watcher(&self, transport: Arc<dyn Transport>) {
        let signaling = self.signaling.clone();
        let mut state_rx = transport.subscribe_state();
        tokio::spawn(async move {
            let controller = Arc::new(IceRestartController::new());
            loop {
                if state_rx.changed().await.is_err() {
                    return;
                }
                let state = state_rx.borrow().clone();
                let attempt = {
                    let signaling = signaling.clone();
                    let transport = transport.clone();
                    move || {
                        let signaling = signaling.clone();
                        let transport = transport.clone();
                        async move {
                            let transport_id = transport.id().to_string();
                            match signaling
                                .send_request(RequestMethod::RestartIce, json!({ "transportId": transport_id }))
                                .await
                            {
                                Ok(response) => {
                                    let ice_parameters =
                                        IceParameters(response.get("iceParameters").cloned().unwrap_or_default());
                                    transport.restart_ice(ice_parameters).await.is_ok()
                                }
                                Err(_) => false,
                            }
                        }
                    }
                };
                on_connection_state_change(&controller, &state, attempt).await;
            }
        });
    }

    #[must_use]
    pub fn producers(&self) -> &Arc<ProducerRegistry> {
        &self.producers
    }

    #[must_use]
    pub fn consumers(&self) -> &Arc<ConsumerRegistry> {
        &self.consumers
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<RoomCoordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn signaling(&self) -> &SignalingSession {
        &self.signaling
    }

    #[must_use]
    pub fn config(&self) -> &RoomClientConfig {
        &self.config
    }

    pub async fn close(&self) {
        self.coordinator.close().await;
    }
}

/// Placeholder `Transport` installed before `join()` creates the real
/// send/recv transports. Every method is unreachable in practice: no
/// producer/consumer operation runs before `join()` completes.
struct UnattachedTransport;

#[async_trait::async_trait]
impl Transport for UnattachedTransport {
    fn id(&self) -> &str {
        "unattached"
    }

    async fn connect(&self, _dtls_parameters: crate::rtc::DtlsParameters) -> Result<()> {
        Err(RoomError::Internal("transport not yet attached".into()))
    }

    async fn produce(
        &self,
        _kind: crate::producer::MediaKind,
        _rtp_parameters: crate::rtc::RtpParameters,
        _encodings: Vec<crate::rtc::RtpEncodingParameters>,
        _app_data_source: &str,
    ) -> Result<String> {
        Err(RoomError::Internal("transport not yet attached".into()))
    }

    async fn consume(&self, _producer_id: &str, _rtp_parameters: crate::rtc::RtpParameters) -> Result<String> {
        Err(RoomError::Internal("transport not yet attached".into()))
    }

    async fn restart_ice(&self, _ice_parameters: crate::rtc::IceParameters) -> Result<()> {
        Err(RoomError::Internal("transport not yet attached".into()))
    }

    fn connection_state(&self) -> String {
        "new".to_string()
    }

    fn subscribe_state(&self) -> tokio::sync::watch::Receiver<String> {
        tokio::sync::watch::channel("new".to_string()).1
    }

    async fn close(&self) {}
}

/// Strips the `urn:3gpp:video-orientation` header extension from a
/// `getRouterRtpCapabilities` response before handing it to
/// `SfuDevice::load` (spec.md §4.2's compatibility workaround for a
/// header extension some browsers mis-negotiate).
fn strip_video_orientation_extension(mut caps: serde_json::Value) -> serde_json::Value {
    if let Some(extensions) = caps.get_mut("headerExtensions").and_then(|v| v.as_array_mut()) {
        extensions.retain(|ext| ext.get("uri").and_then(|u| u.as_str()) != Some("urn:3gpp:video-orientation"));
    }
    caps
}
