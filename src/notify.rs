//! Notification Surface (spec.md §4.7/§7 — component 8).
//!
//! Centralized user-visible event emission: text + category + optional
//! sound. Every error-handling boundary (`commands::boundary`) and every
//! notification dispatcher branch that needs to surface something to the
//! user goes through here rather than emitting ad hoc Tauri events.

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub text: String,
    pub category: String,
    pub level: NotificationLevel,
    pub play_sound: bool,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Wraps a [`NotificationSink`] plus the `notificationSounds` config flag,
/// so callers never have to check it themselves.
pub struct NotificationSurface {
    sink: std::sync::Arc<dyn NotificationSink>,
    sounds_enabled: bool,
}

impl NotificationSurface {
    #[must_use]
    pub fn new(sink: std::sync::Arc<dyn NotificationSink>, sounds_enabled: bool) -> Self {
        Self {
            sink,
            sounds_enabled,
        }
    }

    pub fn info(&self, category: &str, text: impl Into<String>) {
        self.emit(NotificationLevel::Info, category, text, false);
    }

    pub fn warning(&self, category: &str, text: impl Into<String>) {
        self.emit(NotificationLevel::Warning, category, text, false);
    }

    pub fn error(&self, category: &str, text: impl Into<String>) {
        self.emit(NotificationLevel::Error, category, text, true);
    }

    /// Surface a [`crate::error::RoomError`] using its stable category
    /// name, per spec.md §7's error propagation contract.
    pub fn error_from(&self, err: &crate::error::RoomError) {
        self.error(err.category(), err.to_string());
    }

    fn emit(&self, level: NotificationLevel, category: &str, text: impl Into<String>, with_sound: bool) {
        let notice = Notice {
            text: text.into(),
            category: category.to_string(),
            level,
            play_sound: with_sound && self.sounds_enabled,
        };
        info!(category = %notice.category, text = %notice.text, "notification");
        self.sink.notify(notice);
    }
}

/// Production sink: emits a `notification` Tauri event plus, when
/// `play_sound` is set, a separate `notification-sound` event the
/// frontend's audio layer listens for (grounded in the teacher's
/// `commands::sound` emit pattern).
pub struct TauriNotificationSink {
    app_handle: tauri::AppHandle,
}

impl TauriNotificationSink {
    #[must_use]
    pub fn new(app_handle: tauri::AppHandle) -> Self {
        Self { app_handle }
    }
}

impl NotificationSink for TauriNotificationSink {
    fn notify(&self, notice: Notice) {
        use tauri::Emitter;
        if let Err(err) = self.app_handle.emit("notification", &notice_to_json(&notice)) {
            tracing::warn!(%err, "failed to emit notification event");
        }
        if notice.play_sound {
            let _ = self.app_handle.emit("notification-sound", ());
        }
    }
}

fn notice_to_json(notice: &Notice) -> serde_json::Value {
    serde_json::json!({
        "text": notice.text,
        "category": notice.category,
        "level": match notice.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        },
    })
}

#[derive(Default)]
pub struct RecordingNotificationSink {
    notices: std::sync::Mutex<Vec<Notice>>,
}

impl RecordingNotificationSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn error_notifications_always_play_sound_when_enabled() {
        let sink = Arc::new(RecordingNotificationSink::new());
        let surface = NotificationSurface::new(sink.clone(), true);

        surface.error("server-error", "Server request failed");

        let notices = sink.snapshot();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].play_sound);
    }

    #[test]
    fn sounds_disabled_in_config_suppresses_playback() {
        let sink = Arc::new(RecordingNotificationSink::new());
        let surface = NotificationSurface::new(sink.clone(), false);

        surface.error("server-error", "Server request failed");

        assert!(!sink.snapshot()[0].play_sound);
    }
}
