//! Room State Coordinator (spec.md §4.6 — component 6).

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::config::RoomClientConfig;
use crate::consumer::{ConsumerRegistry, ConsumerType, NewConsumerParams};
use crate::error::{RoomError, Result};
use crate::notify::NotificationSurface;
use crate::producer::{MediaKind, ProducerRegistry, UpdateMicOptions, UpdateVideoOptions};
use crate::rtc::IceServer;
use crate::signaling::{RequestMethod, SignalingSession};
use crate::spotlight::SpotlightSelector;
use crate::store::{StoreDelta, StoreSink};

use super::types::{LocalRecordingState, Me, Peer, Room, RoomState, PERMISSION_SHARE_AUDIO, PERMISSION_SHARE_VIDEO};

/// Parameters for `join({roomId, joinVideo, joinAudio})` (spec.md §4.2/§4.6).
#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub room_id: String,
    pub display_name: String,
    pub picture: Option<String>,
    pub join_video: bool,
    pub join_audio: bool,
    pub is_mobile: bool,
}

pub struct RoomCoordinator {
    config: Arc<RoomClientConfig>,
    signaling: SignalingSession,
    producers: Arc<ProducerRegistry>,
    consumers: Arc<ConsumerRegistry>,
    spotlight: Mutex<SpotlightSelector>,
    store: Arc<dyn StoreSink>,
    notify: Arc<NotificationSurface>,

    room: Mutex<Room>,
    me: Mutex<Me>,
    peers: Mutex<std::collections::HashMap<String, Peer>>,
    lobby_peers: Mutex<std::collections::HashMap<String, Peer>>,
    chat_history: Mutex<Vec<Value>>,
    file_history: Mutex<Vec<Value>>,
    pending_join: Mutex<Option<JoinOptions>>,
}

impl RoomCoordinator {
    #[must_use]
    pub fn new(
        config: Arc<RoomClientConfig>,
        signaling: SignalingSession,
        producers: Arc<ProducerRegistry>,
        consumers: Arc<ConsumerRegistry>,
        store: Arc<dyn StoreSink>,
        notify: Arc<NotificationSurface>,
    ) -> Self {
        let max_spotlights = config.max_spotlights(false);
        Self {
            config,
            signaling,
            producers,
            consumers,
            spotlight: Mutex::new(SpotlightSelector::new(max_spotlights, false)),
            store,
            notify,
            room: Mutex::new(Room::new(String::new())),
            me: Mutex::new(Me::new(String::new(), String::new())),
            peers: Mutex::new(std::collections::HashMap::new()),
            lobby_peers: Mutex::new(std::collections::HashMap::new()),
            chat_history: Mutex::new(Vec::new()),
            file_history: Mutex::new(Vec::new()),
            pending_join: Mutex::new(None),
        }
    }

    async fn set_state(&self, state: RoomState) {
        self.room.lock().await.state = state;
        self.store.apply(StoreDelta::new("room.state", state));
    }

    /// `new ──join──▶ connecting`. Device/transport setup (component 2)
    /// is the caller's (`RoomClient`'s) responsibility; this records the
    /// intended join parameters for `_joinRoom` once `roomReady` fires.
    #[instrument(skip(self, options), fields(room_id = %options.room_id))]
    pub async fn start_connecting(&self, options: JoinOptions) {
        {
            let mut room = self.room.lock().await;
            *room = Room::new(options.room_id.clone());
            room.state = RoomState::Connecting;
        }
        {
            let mut me = self.me.lock().await;
            me.peer.display_name = options.display_name.clone();
            me.peer.picture = options.picture.clone();
        }
        *self.pending_join.lock().await = Some(options);
        self.store.apply(StoreDelta::new("room.state", RoomState::Connecting));
    }

    /// `connecting ──enteredLobby──▶ (inLobby=true)`.
    pub async fn on_entered_lobby(&self) {
        let mut room = self.room.lock().await;
        if room.state == RoomState::Connecting {
            room.in_lobby = true;
        }
        self.store.apply(StoreDelta::new("room.inLobby", true));
    }

    pub async fn on_sign_in_required(&self) {
        self.room.lock().await.sign_in_required = true;
        self.notify.warning("sign-in-required", "Please sign in to join this room");
    }

    pub async fn on_over_room_limit(&self) {
        self.room.lock().await.over_room_limit = true;
        self.notify.warning("over-room-limit", "This room is full");
    }

    /// `connecting ──roomReady──▶ (joined=true, inLobby=false)
    /// ──_joinRoom──▶ connected`.
    #[instrument(skip(self, turn_servers))]
    pub async fn on_room_ready(&self, turn_servers: Vec<IceServer>) -> Result<()> {
        {
            let mut room = self.room.lock().await;
            room.joined = true;
            room.in_lobby = false;
            room.turn_servers = turn_servers;
        }
        self.join_room().await
    }

    async fn join_room(&self) -> Result<()> {
        let Some(options) = self.pending_join.lock().await.clone() else {
            return Err(RoomError::Internal("join_room called with no pending join".into()));
        };

        let response = self
            .signaling
            .send_request(
                RequestMethod::Join,
                json!({
                    "displayName": options.display_name,
                    "picture": options.picture,
                    "from": options.room_id,
                    "rtpCapabilities": Value::Null,
                    "returning": false,
                }),
            )
            .await?;

        self.hydrate_from_join_response(&response).await;

        let roles = self.me.lock().await.peer.roles.clone();
        let (can_share_audio, can_share_video) = {
            let room = self.room.lock().await;
            (
                room.has_permission(PERMISSION_SHARE_AUDIO, &roles),
                room.has_permission(PERMISSION_SHARE_VIDEO, &roles),
            )
        };

        let peer_count = self.peers.lock().await.len();
        let start_muted = self
            .config
            .auto_mute_threshold
            .is_some_and(|threshold| peer_count >= threshold);

        if options.join_audio && can_share_audio {
            if let Err(err) = self
                .producers
                .update_mic(UpdateMicOptions {
                    start: true,
                    ..Default::default()
                })
                .await
            {
                self.notify.error_from(&err);
            } else if start_muted {
                self.me.lock().await.auto_muted = true;
                let _ = self.producers.mute_mic().await;
            }
        }

        if options.join_video && can_share_video {
            if let Err(err) = self
                .producers
                .update_webcam(UpdateVideoOptions {
                    init: true,
                    start: true,
                    restart: false,
                    new_device_id: None,
                    new_resolution: None,
                    new_frame_rate: None,
                })
                .await
            {
                self.notify.error_from(&err);
            }
        }

        {
            let mut me = self.me.lock().await;
            me.can_send_mic = can_share_audio;
            me.can_send_webcam = can_share_video;
        }
        self.store.apply(StoreDelta::new(
            "me.mediaCapabilities",
            json!({ "canSendMic": can_share_audio, "canSendWebcam": can_share_video }),
        ));

        self.set_state(RoomState::Connected).await;
        info!("room joined");
        Ok(())
    }

    async fn hydrate_from_join_response(&self, response: &Value) {
        let mut room = self.room.lock().await;
        if let Some(tracker) = response.get("tracker") {
            room.tracker = Some(tracker.clone());
        }
        if let Some(locked) = response.get("locked").and_then(Value::as_bool) {
            room.locked = locked;
        }
        if let Some(access_code) = response.get("accessCode").and_then(Value::as_str) {
            room.access_code = Some(access_code.to_string());
        }
        if let Some(permissions) = response.get("roomPermissions").and_then(Value::as_object) {
            room.room_permissions = permissions.clone().into_iter().collect();
        }
        if let Some(user_roles) = response.get("userRoles").and_then(Value::as_object) {
            room.user_roles = user_roles.clone().into_iter().collect();
        }
        if let Some(allow) = response.get("allowWhenRoleMissing").and_then(Value::as_array) {
            room.allow_when_role_missing = allow.iter().filter_map(Value::as_str).map(String::from).collect();
        }
        drop(room);

        if let Some(peers) = response.get("peers").and_then(Value::as_array) {
            let mut guard = self.peers.lock().await;
            for peer_json in peers {
                if let Some(peer) = peer_from_json(peer_json) {
                    guard.insert(peer.peer_id.clone(), peer);
                }
            }
        }

        if let Some(chat) = response.get("chatHistory").and_then(Value::as_array) {
            *self.chat_history.lock().await = chat.clone();
        }
        if let Some(files) = response.get("fileHistory").and_then(Value::as_array) {
            *self.file_history.lock().await = files.clone();
        }

        self.store.apply(StoreDelta::new("room.hydrated", true));
    }

    /// `connected ──disconnect(transient)──▶ connecting`. Tears down all
    /// media locally; the SFU correlates the next `reconnect` event on the
    /// same signaling connection without rejoining (spec.md §4.1).
    #[instrument(skip(self))]
    pub async fn on_transient_disconnect(&self) {
        self.teardown_media().await;
        self.set_state(RoomState::Connecting).await;
        self.notify.warning("reconnecting", "Connection lost, reconnecting...");
    }

    /// `"io server disconnect"` (permanent): the server is done with this
    /// client forever.
    #[instrument(skip(self))]
    pub async fn on_permanent_disconnect(&self) {
        self.close().await;
    }

    /// `connecting ──reconnect──▶ connected` (no rejoin).
    pub async fn on_reconnect(&self) {
        let is_connecting = self.room.lock().await.state == RoomState::Connecting;
        if is_connecting {
            self.set_state(RoomState::Connected).await;
            self.notify.info("reconnected", "Connection restored");
        }
    }

    async fn teardown_media(&self) {
        self.producers.close_all().await;
        self.consumers.close_all().await;
        *self.spotlight.lock().await = SpotlightSelector::new(self.config.max_spotlights(false), false);
        self.peers.lock().await.clear();
        self.room.lock().await.spotlights.clear();
    }

    /// `* ──close()──▶ closed` (terminal).
    #[instrument(skip(self))]
    pub async fn close(&self) {
        self.teardown_media().await;
        self.signaling.close().await;
        self.set_state(RoomState::Closed).await;
    }

    async fn recompute_spotlights(&self) -> Result<()> {
        let spotlights = self.spotlight.lock().await.recompute();
        self.room.lock().await.spotlights = spotlights.clone();
        self.store.apply(StoreDelta::new("room.spotlights", spotlights.clone()));
        self.consumers.update_spotlights(&spotlights).await
    }

    /// Notification dispatcher (spec.md §4.6, §9 design note): every
    /// method named in spec.md §6 maps to a handler of uniform signature
    /// `(data) -> Result<()>`. Unknown methods are logged and swallowed
    /// (spec.md §7's per-notification error isolation).
    #[instrument(skip(self, data), fields(method = %method))]
    pub async fn dispatch(&self, method: String, data: Value) {
        use crate::signaling::NotificationMethod as M;

        let Some(parsed) = M::from_wire_name(&method) else {
            warn!(%method, "unknown notification method");
            return;
        };

        let result = self.dispatch_known(parsed, data).await;
        if let Err(err) = result {
            error!(%method, %err, "notification handler failed");
            self.notify.error("server-error", "A server update could not be applied");
        }
    }

    async fn dispatch_known(&self, method: crate::signaling::NotificationMethod, data: Value) -> Result<()> {
        use crate::signaling::NotificationMethod as M;

        match method {
            M::EnteredLobby => {
                self.on_entered_lobby().await;
            }
            M::SignInRequired => self.on_sign_in_required().await,
            M::OverRoomLimit => self.on_over_room_limit().await,
            M::RoomReady => {
                let turn_servers: Vec<IceServer> = data
                    .get("turnServers")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                self.on_room_ready(turn_servers).await?;
            }
            M::RoomBack => self.on_reconnect().await,
            M::LockRoom => {
                self.room.lock().await.locked = true;
                self.store.apply(StoreDelta::new("room.locked", true));
            }
            M::UnlockRoom => {
                self.room.lock().await.locked = false;
                self.store.apply(StoreDelta::new("room.locked", false));
            }
            M::ParkedPeer | M::ParkedPeers => {
                if let Some(peer) = data.get("peerId").and_then(Value::as_str) {
                    self.lobby_peers
                        .lock()
                        .await
                        .insert(peer.to_string(), Peer::new(peer, peer));
                }
            }
            M::LobbyPeerClosed => {
                if let Some(peer_id) = data.get("peerId").and_then(Value::as_str) {
                    self.lobby_peers.lock().await.remove(peer_id);
                }
            }
            M::LobbyPromotedPeer => {
                if let Some(peer_id) = data.get("peerId").and_then(Value::as_str) {
                    self.lobby_peers.lock().await.remove(peer_id);
                }
            }
            M::LobbyChangeDisplayName | M::LobbyChangePicture => {
                self.store.apply(StoreDelta::new("lobbyPeers.updated", data));
            }
            M::SetAccessCode => {
                self.room.lock().await.access_code =
                    data.get("accessCode").and_then(Value::as_str).map(String::from);
            }
            M::SetJoinByAccessCode => {
                self.room.lock().await.join_by_access_code =
                    data.get("joinByAccessCode").and_then(Value::as_bool).unwrap_or(false);
            }
            M::ActiveSpeaker => {
                if let Some(peer_id) = data.get("peerId").and_then(Value::as_str) {
                    self.room.lock().await.active_speaker_id = Some(peer_id.to_string());
                    self.spotlight.lock().await.on_active_speaker(peer_id);
                    self.recompute_spotlights().await?;
                }
            }
            M::ChangeDisplayName => {
                if let Some(peer_id) = data.get("peerId").and_then(Value::as_str) {
                    if let Some(name) = data.get("displayName").and_then(Value::as_str) {
                        if let Some(peer) = self.peers.lock().await.get_mut(peer_id) {
                            peer.display_name = name.to_string();
                        }
                    }
                }
            }
            M::ChangePicture => {
                if let Some(peer_id) = data.get("peerId").and_then(Value::as_str) {
                    if let Some(peer) = self.peers.lock().await.get_mut(peer_id) {
                        peer.picture = data.get("picture").and_then(Value::as_str).map(String::from);
                    }
                }
            }
            M::RaisedHand => {
                if let Some(peer_id) = data.get("peerId").and_then(Value::as_str) {
                    if let Some(peer) = self.peers.lock().await.get_mut(peer_id) {
                        peer.raised_hand = data.get("raisedHand").and_then(Value::as_bool).unwrap_or(false);
                        peer.raised_hand_timestamp = data.get("raisedHandTimestamp").and_then(Value::as_i64);
                    }
                }
            }
            M::ChatMessage => {
                self.chat_history.lock().await.push(data.clone());
                self.store.apply(StoreDelta::new("chat.message", data));
            }
            M::ModeratorClearChat => {
                self.chat_history.lock().await.clear();
                self.store.apply(StoreDelta::new("chat.cleared", true));
            }
            M::SendFile => {
                self.file_history.lock().await.push(data.clone());
                self.store.apply(StoreDelta::new("files.new", data));
            }
            M::ProducerScore => {
                self.store.apply(StoreDelta::new("producers.score", data));
            }
            M::NewPeer => {
                if let Some(peer) = peer_from_json(&data) {
                    self.spotlight.lock().await.on_new_peer(&peer.peer_id);
                    self.peers.lock().await.insert(peer.peer_id.clone(), peer);
                    self.recompute_spotlights().await?;
                }
            }
            M::PeerClosed => {
                if let Some(peer_id) = data.get("peerId").and_then(Value::as_str) {
                    self.peers.lock().await.remove(peer_id);
                    self.spotlight.lock().await.on_peer_closed(peer_id);
                    self.recompute_spotlights().await?;
                }
            }
            M::NewConsumer => {
                let params = new_consumer_params_from_json(&data)?;
                let peer_id = params.peer_id.clone();
                let consumer_id = params.id.clone();
                let is_video = matches!(params.kind, MediaKind::Video);
                self.consumers.new_consumer(params).await?;
                self.consumers.start_consumer(&consumer_id).await?;
                if is_video {
                    self.spotlight.lock().await.set_has_video(&peer_id, true);
                    self.recompute_spotlights().await?;
                }
            }
            M::ConsumerClosed => {
                if let Some(id) = data.get("consumerId").and_then(Value::as_str) {
                    self.consumers.on_consumer_closed(id).await;
                }
            }
            M::ConsumerPaused => {
                if let Some(id) = data.get("consumerId").and_then(Value::as_str) {
                    self.consumers.on_consumer_paused(id).await;
                }
            }
            M::ConsumerResumed => {
                if let Some(id) = data.get("consumerId").and_then(Value::as_str) {
                    self.consumers.on_consumer_resumed(id).await;
                }
            }
            M::ConsumerLayersChanged => {
                self.store.apply(StoreDelta::new("consumers.layersChanged", data));
            }
            M::ConsumerScore => {
                if let Some(id) = data.get("consumerId").and_then(Value::as_str) {
                    if let Some(score) = data.get("score").and_then(Value::as_i64) {
                        self.consumers.on_consumer_score(id, score).await;
                    }
                }
            }
            M::ModeratorMute => {
                if self.producers.has_mic().await {
                    self.producers.mute_mic().await?;
                    self.notify.info("moderator", "Moderator muted your audio");
                }
            }
            M::ModeratorStopVideo => {
                if self.producers.has_webcam().await {
                    self.producers.disable_webcam().await?;
                    self.notify.info("moderator", "Moderator stopped your video");
                }
            }
            M::ModeratorStopScreenSharing => {
                self.producers.disable_screen_sharing().await?;
                self.notify.info("moderator", "Moderator stopped your screen sharing");
            }
            M::ModeratorKick => {
                self.notify.warning("moderator", "You have been removed from the meeting");
                self.close().await;
            }
            M::ModeratorLowerHand => {
                self.me.lock().await.peer.raised_hand = false;
            }
            M::GotRole => {
                if let Some(role_id) = data.get("roleId").and_then(Value::as_str) {
                    self.me.lock().await.peer.roles.insert(role_id.to_string());
                }
            }
            M::LostRole => {
                if let Some(role_id) = data.get("roleId").and_then(Value::as_str) {
                    self.me.lock().await.peer.roles.remove(role_id);
                }
            }
            M::AddConsentForRecording => {
                self.store.apply(StoreDelta::new("recording.consent", data));
            }
            M::SetLocalRecording => {
                if let Some(peer_id) = data.get("peerId").and_then(Value::as_str) {
                    let state = data
                        .get("localRecordingState")
                        .and_then(Value::as_str)
                        .and_then(parse_local_recording_state);
                    if let Some(peer) = self.peers.lock().await.get_mut(peer_id) {
                        peer.local_recording_state = state;
                    }
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub async fn roles(&self) -> HashSet<String> {
        self.me.lock().await.peer.roles.clone()
    }

    #[must_use]
    pub async fn state(&self) -> RoomState {
        self.room.lock().await.state
    }
}

fn parse_local_recording_state(value: &str) -> Option<LocalRecordingState> {
    match value {
        "start" => Some(LocalRecordingState::Start),
        "resume" => Some(LocalRecordingState::Resume),
        "pause" => Some(LocalRecordingState::Pause),
        "stop" => Some(LocalRecordingState::Stop),
        _ => None,
    }
}

fn peer_from_json(value: &Value) -> Option<Peer> {
    let peer_id = value.get("id").or_else(|| value.get("peerId")).and_then(Value::as_str)?;
    let display_name = value.get("displayName").and_then(Value::as_str).unwrap_or_default();
    let mut peer = Peer::new(peer_id, display_name);
    peer.picture = value.get("picture").and_then(Value::as_str).map(String::from);
    if let Some(roles) = value.get("roles").and_then(Value::as_array) {
        peer.roles = roles.iter().filter_map(Value::as_str).map(String::from).collect();
    }
    Some(peer)
}

fn new_consumer_params_from_json(data: &Value) -> Result<NewConsumerParams> {
    let id = data
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| RoomError::Internal("newConsumer missing id".into()))?;
    let peer_id = data
        .get("peerId")
        .and_then(Value::as_str)
        .ok_or_else(|| RoomError::Internal("newConsumer missing peerId".into()))?;
    let producer_id = data
        .get("producerId")
        .and_then(Value::as_str)
        .ok_or_else(|| RoomError::Internal("newConsumer missing producerId".into()))?;
    let kind = match data.get("kind").and_then(Value::as_str) {
        Some("audio") => MediaKind::Audio,
        _ => MediaKind::Video,
    };
    let consumer_type = match data.get("type").and_then(Value::as_str) {
        Some("simulcast") => ConsumerType::Simulcast,
        Some("svc") => ConsumerType::Svc,
        _ => ConsumerType::Simple,
    };

    Ok(NewConsumerParams {
        id: id.to_string(),
        peer_id: peer_id.to_string(),
        producer_id: producer_id.to_string(),
        kind,
        consumer_type,
        rtp_parameters: crate::rtc::RtpParameters(
            data.get("rtpParameters").cloned().unwrap_or(Value::Null),
        ),
        source: data
            .get("appData")
            .and_then(|a| a.get("source"))
            .and_then(Value::as_str)
            .map(String::from),
        producer_paused: data.get("producerPaused").and_then(Value::as_bool).unwrap_or(false),
    })
}
