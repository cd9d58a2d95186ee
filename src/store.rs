//! Reactive Store Bridge (spec.md §4.6/§5 — component 9).
//!
//! A single store is shared across all components; mutations are
//! performed via atomic action dispatches (spec.md §5 "Shared resources").
//! `StoreSink` is the seam: production wires it to Tauri's event emission,
//! tests use the in-memory `RecordingStore`.

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// One atomic state delta. `key` is a dotted path into the store's state
/// tree (e.g. `"peers.p1.displayName"`, `"room.state"`); `value` is the
/// new value at that path. Using a flat key+value pair (rather than a
/// typed action enum per mutation) keeps this seam stable as the store's
/// own shape evolves on the UI side, mirroring the teacher's own
/// coarse-grained `AppHandle::emit` events.
#[derive(Debug, Clone, Serialize)]
pub struct StoreDelta {
    pub key: String,
    pub value: Value,
}

impl StoreDelta {
    pub fn new(key: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            key: key.into(),
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        }
    }
}

pub trait StoreSink: Send + Sync {
    fn apply(&self, delta: StoreDelta);

    fn apply_all(&self, deltas: Vec<StoreDelta>) {
        for delta in deltas {
            self.apply(delta);
        }
    }
}

/// Tauri-backed store: every delta is emitted as a `store://<key>` event
/// carrying the new value, picked up by the frontend's reactive store.
pub struct TauriStoreSink {
    app_handle: tauri::AppHandle,
}

impl TauriStoreSink {
    #[must_use]
    pub fn new(app_handle: tauri::AppHandle) -> Self {
        Self { app_handle }
    }
}

impl StoreSink for TauriStoreSink {
    fn apply(&self, delta: StoreDelta) {
        use tauri::Emitter;
        let event = format!("store://{}", delta.key);
        if let Err(err) = self.app_handle.emit(&event, &delta.value) {
            tracing::warn!(%event, %err, "failed to emit store delta");
        }
    }
}

/// In-memory sink used by tests and by headless (non-Tauri) embedders.
#[derive(Default)]
pub struct RecordingStore {
    deltas: std::sync::Mutex<Vec<StoreDelta>>,
}

impl RecordingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<StoreDelta> {
        self.deltas.lock().unwrap().clone()
    }

    #[must_use]
    pub fn latest(&self, key: &str) -> Option<Value> {
        self.deltas
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|d| d.key == key)
            .map(|d| d.value.clone())
    }
}

impl StoreSink for RecordingStore {
    fn apply(&self, delta: StoreDelta) {
        trace!(key = %delta.key, "store delta applied");
        self.deltas.lock().unwrap().push(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_returns_the_most_recent_value_for_a_key() {
        let store = RecordingStore::new();
        store.apply(StoreDelta::new("room.state", "connecting"));
        store.apply(StoreDelta::new("room.state", "connected"));

        assert_eq!(store.latest("room.state"), Some(Value::String("connected".into())));
    }

    #[test]
    fn unknown_key_returns_none() {
        let store = RecordingStore::new();
        assert_eq!(store.latest("nope"), None);
    }
}
