//! Room Client commands: the Tauri-facing adapter layer over
//! `RoomClient` (SPEC_FULL.md §A — `commands/` is "the thin Tauri-facing
//! adapter layer, imperative commands from the UI, per spec.md §1").

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tauri::{command, AppHandle, State};

use crate::commands::boundary;
use crate::config::RoomClientConfig;
use crate::devices::MediaDeviceInfo;
use crate::notify::{NotificationSurface, TauriNotificationSink};
use crate::producer::media_source::system::SystemMediaSource;
use crate::producer::{MediaKind, UpdateMicOptions, UpdateScreenOptions, UpdateVideoOptions};
use crate::room::JoinOptions;
use crate::room_client::{RoomClient, RoomClientDeps};
use crate::signaling::WebSocketTransport;
use crate::store::TauriStoreSink;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub signaling_url: String,
    pub room_id: String,
    pub display_name: String,
    pub picture: Option<String>,
    pub join_audio: bool,
    pub join_video: bool,
    pub is_mobile: bool,
    /// Config blob per spec.md §6, already decoded by the caller.
    pub config_json: Option<String>,
}

/// `join({roomId, displayName, ...})` (spec.md §1/§4.2, §4.6).
#[command]
pub async fn room_join(request: JoinRequest, state: State<'_, AppState>, app: AppHandle) -> Result<(), String> {
    let config = Arc::new(match request.config_json {
        Some(blob) => boundary::resolve_unattended(
            RoomClientConfig::from_json(&blob).map_err(|err| {
                crate::error::RoomError::InvalidArgument(format!("invalid config: {err}"))
            }),
        )?,
        None => RoomClientConfig::default(),
    });

    let url = boundary::resolve_unattended(
        url::Url::parse(&request.signaling_url)
            .map_err(|err| crate::error::RoomError::InvalidArgument(format!("invalid signaling url: {err}"))),
    )?;
    let (transport, inbound) = WebSocketTransport::connect(url).await;

    let device = boundary::resolve_unattended(crate::rtc::default_device())?;

    let notify = Arc::new(NotificationSurface::new(
        Arc::new(TauriNotificationSink::new(app.clone())),
        config.notification_sounds,
    ));
    let store = Arc::new(TauriStoreSink::new(app));

    let deps = RoomClientDeps {
        config,
        signaling_transport: transport,
        device,
        media_source: Arc::new(SystemMediaSource::new()),
        store,
        notify: notify.clone(),
        voice_activated_unmute: true,
        is_mobile: request.is_mobile,
    };

    let (client, _handle) = RoomClient::new(deps, inbound);

    let join_result = client
        .join(JoinOptions {
            room_id: request.room_id,
            display_name: request.display_name,
            picture: request.picture,
            join_video: request.join_video,
            join_audio: request.join_audio,
            is_mobile: request.is_mobile,
        })
        .await;

    if join_result.is_ok() {
        *state.room_client.write().await = Some(client);
        *state.notify.write().await = Some(notify.clone());
    }

    boundary::resolve(join_result, &notify).await
}

async fn client(state: &State<'_, AppState>) -> Result<Arc<RoomClient>, String> {
    state
        .room_client
        .read()
        .await
        .clone()
        .ok_or_else(|| "not-joined: no active room".to_string())
}

#[command]
pub async fn room_close(state: State<'_, AppState>) -> Result<(), String> {
    if let Some(client) = state.room_client.write().await.take() {
        client.close().await;
    }
    state.notify.write().await.take();
    Ok(())
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateMicRequest {
    pub start: bool,
    pub restart: bool,
    pub new_device_id: Option<String>,
}

#[command]
pub async fn update_mic(request: UpdateMicRequest, state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(
        client
            .producers()
            .update_mic(UpdateMicOptions {
                start: request.start,
                restart: request.restart,
                new_device_id: request.new_device_id,
            })
            .await,
        &notify,
    )
    .await
}

#[command]
pub async fn mute_mic(state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(client.producers().mute_mic().await, &notify).await
}

#[command]
pub async fn unmute_mic(state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(client.producers().unmute_mic().await, &notify).await
}

#[command]
pub async fn disable_mic(state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(client.producers().disable_mic().await, &notify).await
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateVideoRequest {
    pub init: bool,
    pub start: bool,
    pub restart: bool,
    pub new_device_id: Option<String>,
    pub new_resolution: Option<u32>,
    pub new_frame_rate: Option<u32>,
}

impl From<UpdateVideoRequest> for UpdateVideoOptions {
    fn from(r: UpdateVideoRequest) -> Self {
        UpdateVideoOptions {
            init: r.init,
            start: r.start,
            restart: r.restart,
            new_device_id: r.new_device_id,
            new_resolution: r.new_resolution,
            new_frame_rate: r.new_frame_rate,
        }
    }
}

#[command]
pub async fn update_webcam(request: UpdateVideoRequest, state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(client.producers().update_webcam(request.into()).await, &notify).await
}

#[command]
pub async fn disable_webcam(state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(client.producers().disable_webcam().await, &notify).await
}

#[command]
pub async fn add_extra_video(
    device_id: String,
    request: UpdateVideoRequest,
    state: State<'_, AppState>,
) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(
        client.producers().add_extra_video(device_id, request.into()).await,
        &notify,
    )
    .await
}

#[command]
pub async fn disable_extra_video(device_id: String, state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(client.producers().disable_extra_video(&device_id).await, &notify).await
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateScreenRequest {
    pub start: bool,
    pub new_resolution: Option<u32>,
    pub new_frame_rate: Option<u32>,
}

#[command]
pub async fn update_screen_sharing(request: UpdateScreenRequest, state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(
        client
            .producers()
            .update_screen_sharing(UpdateScreenOptions {
                start: request.start,
                new_resolution: request.new_resolution,
                new_frame_rate: request.new_frame_rate,
            })
            .await,
        &notify,
    )
    .await
}

#[command]
pub async fn disable_screen_sharing(state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(client.producers().disable_screen_sharing().await, &notify).await
}

#[derive(Debug, Deserialize)]
pub struct AdaptLayersRequest {
    pub consumer_id: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

#[command]
pub async fn adapt_consumer_preferred_layers(
    request: AdaptLayersRequest,
    state: State<'_, AppState>,
) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    let scaling_factor = client.config().adaptive_scaling_factor;
    boundary::resolve(
        client
            .consumers()
            .adapt_preferred_layers(
                &request.consumer_id,
                request.viewport_width,
                request.viewport_height,
                scaling_factor,
            )
            .await,
        &notify,
    )
    .await
}

#[derive(Debug, Serialize)]
pub struct ConsumerSummary {
    pub id: String,
    pub peer_id: String,
    pub kind: MediaKind,
}

#[command]
pub async fn list_devices() -> Result<Vec<MediaDeviceInfo>, String> {
    Ok(crate::devices::enumerate())
}

#[command]
pub async fn list_consumers(state: State<'_, AppState>) -> Result<Vec<ConsumerSummary>, String> {
    let client = client(&state).await?;
    Ok(client
        .consumers()
        .all()
        .await
        .into_iter()
        .map(|c| ConsumerSummary {
            id: c.id,
            peer_id: c.peer_id,
            kind: c.kind,
        })
        .collect())
}

#[command]
pub async fn send_chat_message(text: String, state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(
        client
            .signaling()
            .send_request(crate::signaling::RequestMethod::ChatMessage, json!({ "text": text }))
            .await
            .map(|_| ()),
        &notify,
    )
    .await
}

#[command]
pub async fn raise_hand(raised: bool, state: State<'_, AppState>) -> Result<(), String> {
    let client = client(&state).await?;
    let notify = notify_surface(&state).await;
    boundary::resolve(
        client
            .signaling()
            .send_request(crate::signaling::RequestMethod::RaisedHand, json!({ "raisedHand": raised }))
            .await
            .map(|_| ()),
        &notify,
    )
    .await
}

/// The [`NotificationSurface`] the currently joined room was built with,
/// falling back to a disconnected one before any room has been joined
/// (errors at that point are reported back to the caller directly, not
/// surfaced a second time).
async fn notify_surface(state: &State<'_, AppState>) -> Arc<NotificationSurface> {
    match state.notify.read().await.clone() {
        Some(notify) => notify,
        None => Arc::new(NotificationSurface::new(
            Arc::new(crate::notify::RecordingNotificationSink::new()),
            false,
        )),
    }
}
