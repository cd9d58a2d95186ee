//! The single error-propagation boundary between `RoomError` and Tauri's
//! `Result<T, String>` commands (spec.md §7 "Propagation", SPEC_FULL.md
//! B.2). Every `#[tauri::command]` in `commands::room` funnels its
//! `Result<T>` through here rather than formatting `RoomError` itself.

use tracing::error;

use crate::error::{Result, RoomError};
use crate::notify::NotificationSurface;

/// Convert a `RoomError` to the string a Tauri command returns, logging
/// it and surfacing it on the [`NotificationSurface`] first. Call this
/// from every command body: `boundary::resolve(result, &notify).await`.
pub async fn resolve<T>(result: Result<T>, notify: &NotificationSurface) -> std::result::Result<T, String> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            error!(category = err.category(), %err, "command failed");
            notify.error_from(&err);
            Err(format!("{}: {err}", err.category()))
        }
    }
}

/// Variant for operations that can fail before a `RoomClient` even
/// exists (no notify surface to report through yet).
pub fn resolve_unattended<T>(result: Result<T>) -> std::result::Result<T, String> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            error!(category = err.category(), %err, "command failed");
            Err(format!("{}: {err}", err.category()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotificationSink;
    use std::sync::Arc;

    #[tokio::test]
    async fn error_is_formatted_with_its_category_prefix() {
        let sink = Arc::new(RecordingNotificationSink::new());
        let surface = NotificationSurface::new(sink.clone(), true);

        let result: Result<()> = Err(RoomError::InvalidArgument("bad device id".into()));
        let resolved = resolve(result, &surface).await;

        assert_eq!(
            resolved.unwrap_err(),
            "invalid-argument: invalid argument: bad device id"
        );
        assert_eq!(sink.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn ok_passes_through_untouched() {
        let sink = Arc::new(RecordingNotificationSink::new());
        let surface = NotificationSurface::new(sink.clone(), true);

        let resolved = resolve(Ok::<_, RoomError>(42), &surface).await;

        assert_eq!(resolved, Ok(42));
        assert!(sink.snapshot().is_empty());
    }
}
