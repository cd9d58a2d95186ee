//! Room Client desktop application library.
//!
//! Tauri backend wiring the Room Client (signaling, device/transport
//! management, producers, consumers, spotlight selection, notifications
//! and the reactive store bridge) behind an imperative command surface.

pub mod commands;
pub mod config;
pub mod consumer;
pub mod devices;
pub mod error;
pub mod notify;
pub mod producer;
pub mod room;
pub mod room_client;
pub mod rtc;
pub mod signaling;
pub mod spotlight;
pub mod store;

use std::sync::Arc;
use tokio::sync::RwLock;

use notify::NotificationSurface;
use room_client::RoomClient;

/// Run the Tauri application.
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "room_client=debug".into()),
                )
                .json()
                .init();

            tracing::info!("Room Client starting");

            app.manage(AppState::new());

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::room::room_join,
            commands::room::room_close,
            commands::room::update_mic,
            commands::room::mute_mic,
            commands::room::unmute_mic,
            commands::room::disable_mic,
            commands::room::update_webcam,
            commands::room::disable_webcam,
            commands::room::add_extra_video,
            commands::room::disable_extra_video,
            commands::room::update_screen_sharing,
            commands::room::disable_screen_sharing,
            commands::room::adapt_consumer_preferred_layers,
            commands::room::list_devices,
            commands::room::list_consumers,
            commands::room::send_chat_message,
            commands::room::raise_hand,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

/// Application state shared across commands: at most one joined
/// [`RoomClient`] at a time (spec.md §1 — "one instance per joined
/// room").
pub struct AppState {
    pub room_client: Arc<RwLock<Option<Arc<RoomClient>>>>,
    /// The live [`NotificationSurface`] the currently joined
    /// [`RoomClient`] was built with, kept around so later commands can
    /// format errors through the same sink rather than a disposable one.
    pub notify: Arc<RwLock<Option<Arc<NotificationSurface>>>>,
}

impl AppState {
    fn new() -> Self {
        Self {
            room_client: Arc::new(RwLock::new(None)),
            notify: Arc::new(RwLock::new(None)),
        }
    }
}
