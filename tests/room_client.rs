//! End-to-end `RoomClient` scenarios (spec.md §8), run against the
//! in-memory fakes (`rtc::fake`, `signaling::fake`,
//! `producer::media_source::fake`) rather than real network/media I/O.
//!
//! Requires `--features fake-rtc` (these fakes are otherwise compiled
//! out of non-test builds) and, since `native-rtc` is a default feature,
//! `--no-default-features` to avoid pulling in the real `webrtc` crate
//! unnecessarily.

use std::sync::Arc;
use std::time::Duration;

use room_client::config::RoomClientConfig;
use room_client::notify::{NotificationSurface, RecordingNotificationSink};
use room_client::producer::media_source::fake::FakeMediaSource;
use room_client::room::JoinOptions;
use room_client::room_client::{RoomClient, RoomClientDeps};
use room_client::rtc::fake::{FakeSfuDevice, FakeTransport};
use room_client::rtc::{IceParameters, IceRestartController};
use room_client::signaling::fake::FakeSignalingTransport;
use room_client::signaling::transport::{ConnectionEvent, Inbound};
use room_client::signaling::RequestMethod;
use room_client::store::RecordingStore;
use serde_json::json;

struct Harness {
    client: Arc<RoomClient>,
    inbound_tx: tokio::sync::mpsc::UnboundedSender<Inbound>,
    transport: Arc<FakeSignalingTransport>,
    store: Arc<RecordingStore>,
    notify_sink: Arc<RecordingNotificationSink>,
}

fn scripted_transport() -> Arc<FakeSignalingTransport> {
    let transport = Arc::new(FakeSignalingTransport::new());
    transport.on("getRouterRtpCapabilities", json!({ "codecs": [], "headerExtensions": [] }));
    transport.on(
        "createWebRtcTransport",
        json!({
            "id": "transport-1",
            "iceParameters": {},
            "iceCandidates": [],
            "dtlsParameters": {},
        }),
    );
    transport.on(
        "join",
        json!({
            "peers": [],
            "chatHistory": [],
            "fileHistory": [],
            "allowWhenRoleMissing": ["SHARE_AUDIO", "SHARE_VIDEO"],
        }),
    );
    transport
}

async fn harness(join_audio: bool, join_video: bool) -> Harness {
    let transport = scripted_transport();
    let device = Arc::new(FakeSfuDevice::default());
    let media_source = Arc::new(FakeMediaSource::default());
    let store = Arc::new(RecordingStore::new());
    let notify_sink = Arc::new(RecordingNotificationSink::new());
    let notify = Arc::new(NotificationSurface::new(notify_sink.clone(), false));

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::unbounded_channel();

    let deps = RoomClientDeps {
        config: Arc::new(RoomClientConfig::default()),
        signaling_transport: transport.clone(),
        device,
        media_source,
        store: store.clone(),
        notify,
        voice_activated_unmute: true,
        is_mobile: false,
    };

    let (client, _handle) = RoomClient::new(deps, inbound_rx);

    client
        .join(JoinOptions {
            room_id: "r1".into(),
            display_name: "alice".into(),
            picture: None,
            join_video,
            join_audio,
            is_mobile: false,
        })
        .await
        .unwrap();

    Harness {
        client,
        inbound_tx,
        transport,
        store,
        notify_sink,
    }
}

/// Polls `check` until it returns true or the deadline passes, giving
/// the background inbound-loop task a chance to process what was just
/// sent on `inbound_tx`.
async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition did not become true in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn room_ready(turn_servers: serde_json::Value) -> Inbound {
    Inbound::Notification {
        method: "roomReady".to_string(),
        data: json!({ "turnServers": turn_servers }),
    }
}

#[tokio::test]
async fn happy_join_creates_mic_and_webcam_producers() {
    let h = harness(true, true).await;

    h.inbound_tx.send(room_ready(json!([]))).unwrap();

    wait_until(|| async { h.store.latest("me.mediaCapabilities").is_some() }).await;

    assert!(h.client.producers().has_mic().await);
    assert!(h.client.producers().has_webcam().await);
    assert_eq!(
        h.client.coordinator().state().await,
        room_client::room::RoomState::Connected
    );
    assert_eq!(
        h.store.latest("me.mediaCapabilities"),
        Some(json!({ "canSendMic": true, "canSendWebcam": true }))
    );
}

#[tokio::test]
async fn lobby_then_admit_flips_in_lobby_then_joins() {
    let h = harness(false, false).await;

    h.inbound_tx
        .send(Inbound::Notification {
            method: "enteredLobby".to_string(),
            data: json!({}),
        })
        .unwrap();

    wait_until(|| async { h.store.latest("room.inLobby") == Some(json!(true)) }).await;

    h.inbound_tx.send(room_ready(json!([]))).unwrap();

    wait_until(|| async {
        h.client.coordinator().state().await == room_client::room::RoomState::Connected
    })
    .await;
}

#[tokio::test]
async fn transient_disconnect_tears_down_media_then_reconnect_restores_without_rejoin() {
    let h = harness(true, false).await;
    h.inbound_tx.send(room_ready(json!([]))).unwrap();
    wait_until(|| async { h.client.producers().has_mic().await }).await;

    h.inbound_tx
        .send(Inbound::Lifecycle(ConnectionEvent::Disconnect {
            reason: "transport error".to_string(),
            permanent: false,
        }))
        .unwrap();

    wait_until(|| async { !h.client.producers().has_mic().await }).await;
    assert_eq!(
        h.client.coordinator().state().await,
        room_client::room::RoomState::Connecting
    );

    let join_calls_before = h.transport.calls.lock().unwrap().iter().filter(|(m, _)| m == "join").count();

    h.inbound_tx.send(Inbound::Lifecycle(ConnectionEvent::Reconnect)).unwrap();

    wait_until(|| async {
        h.client.coordinator().state().await == room_client::room::RoomState::Connected
    })
    .await;

    let join_calls_after = h.transport.calls.lock().unwrap().iter().filter(|(m, _)| m == "join").count();
    assert_eq!(join_calls_before, join_calls_after, "reconnect must not rejoin");
}

#[tokio::test]
async fn moderator_mute_pauses_mic_and_unmute_reacquires_a_new_producer() {
    let h = harness(true, false).await;
    h.inbound_tx.send(room_ready(json!([]))).unwrap();
    wait_until(|| async { h.client.producers().has_mic().await }).await;

    h.inbound_tx
        .send(Inbound::Notification {
            method: "moderator:mute".to_string(),
            data: json!({}),
        })
        .unwrap();

    wait_until(|| async {
        h.notify_sink
            .snapshot()
            .iter()
            .any(|n| n.text == "Moderator muted your audio")
    })
    .await;

    h.client.producers().unmute_mic().await.unwrap();
    assert!(h.client.producers().has_mic().await);
}

#[tokio::test]
async fn active_speaker_promotion_adds_peer_to_spotlights() {
    let h = harness(false, false).await;
    h.inbound_tx.send(room_ready(json!([]))).unwrap();
    wait_until(|| async {
        h.client.coordinator().state().await == room_client::room::RoomState::Connected
    })
    .await;

    h.inbound_tx
        .send(Inbound::Notification {
            method: "newPeer".to_string(),
            data: json!({ "id": "p7", "displayName": "bob", "roles": [] }),
        })
        .unwrap();
    h.inbound_tx
        .send(Inbound::Notification {
            method: "activeSpeaker".to_string(),
            data: json!({ "peerId": "p7" }),
        })
        .unwrap();

    wait_until(|| async {
        h.store
            .latest("room.spotlights")
            .is_some_and(|v| v.as_array().is_some_and(|a| a.iter().any(|p| p.as_str() == Some("p7"))))
    })
    .await;
}

#[tokio::test]
async fn ice_failure_recovery_issues_restart_ice_and_clears_once_it_succeeds() {
    let h = harness(false, false).await;
    h.inbound_tx.send(room_ready(json!([]))).unwrap();
    wait_until(|| async {
        h.client.coordinator().state().await == room_client::room::RoomState::Connected
    })
    .await;

    h.transport.on("restartIce", json!({ "iceParameters": {} }));
    let controller = Arc::new(IceRestartController::new());
    let signaling = h.client.signaling().clone();
    let transport = Arc::new(FakeTransport::new("t1".into(), signaling.clone()));

    let attempt = {
        let signaling = signaling.clone();
        let transport = transport.clone();
        move || {
            let signaling = signaling.clone();
            let transport = transport.clone();
            async move {
                match signaling.send_request(RequestMethod::RestartIce, json!({})).await {
                    Ok(resp) => {
                        let ice_parameters = IceParameters(resp.get("iceParameters").cloned().unwrap_or_default());
                        transport.restart_ice(ice_parameters).await.is_ok()
                    }
                    Err(_) => false,
                }
            }
        }
    };

    controller.schedule(Duration::from_millis(1), attempt).await;

    wait_until(|| async {
        transport.restart_ice_calls.load(std::sync::atomic::Ordering::SeqCst) >= 1
    })
    .await;
    wait_until(|| async { !controller.is_restarting() }).await;
}
