//! Device Enumeration (spec.md §4.8/§2 — component 7).
//!
//! Audio devices via `cpal`, video input devices via `nokhwa`, grounded
//! in the teacher's `audio::AudioHandle` host/device listing. Browser
//! `devicechange` has no native analogue for a desktop host, so change
//! events are derived from a periodic poll (SPEC_FULL.md §C), diffing
//! the device list against the previous snapshot.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceChange {
    pub added: Vec<MediaDeviceInfo>,
    pub removed: Vec<MediaDeviceInfo>,
}

/// Enumerate every audio input, audio output, and (if the `nokhwa`
/// backend can be initialized) video input device currently attached.
pub fn enumerate() -> Vec<MediaDeviceInfo> {
    let mut devices = Vec::new();
    let host = cpal::default_host();

    if let Ok(inputs) = host.input_devices() {
        for (i, device) in inputs.enumerate() {
            devices.push(MediaDeviceInfo {
                device_id: format!("audioinput-{i}"),
                label: device.name().unwrap_or_else(|_| format!("Microphone {i}")),
                kind: DeviceKind::AudioInput,
            });
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for (i, device) in outputs.enumerate() {
            devices.push(MediaDeviceInfo {
                device_id: format!("audiooutput-{i}"),
                label: device.name().unwrap_or_else(|_| format!("Speaker {i}")),
                kind: DeviceKind::AudioOutput,
            });
        }
    }

    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(cameras) => {
            for camera in cameras {
                devices.push(MediaDeviceInfo {
                    device_id: camera.index().to_string(),
                    label: camera.human_name(),
                    kind: DeviceKind::VideoInput,
                });
            }
        }
        Err(err) => {
            warn!(%err, "failed to enumerate video input devices");
        }
    }

    devices
}

fn diff(previous: &[MediaDeviceInfo], current: &[MediaDeviceInfo]) -> Option<DeviceChange> {
    let added: Vec<_> = current
        .iter()
        .filter(|d| !previous.iter().any(|p| p.device_id == d.device_id))
        .cloned()
        .collect();
    let removed: Vec<_> = previous
        .iter()
        .filter(|p| !current.iter().any(|d| d.device_id == p.device_id))
        .cloned()
        .collect();

    if added.is_empty() && removed.is_empty() {
        None
    } else {
        Some(DeviceChange { added, removed })
    }
}

/// Spawn the periodic poll task; returns the initial device snapshot plus
/// a receiver that yields a [`DeviceChange`] whenever the set changes.
pub fn watch(poll_interval: Duration) -> (Vec<MediaDeviceInfo>, mpsc::UnboundedReceiver<DeviceChange>) {
    let initial = enumerate();
    let (tx, rx) = mpsc::unbounded_channel();

    let mut previous = initial.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(poll_interval).await;
            let current = enumerate();
            if let Some(change) = diff(&previous, &current) {
                debug!(added = change.added.len(), removed = change.removed.len(), "device change");
                if tx.send(change).is_err() {
                    return;
                }
            }
            previous = current;
        }
    });

    (initial, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> MediaDeviceInfo {
        MediaDeviceInfo {
            device_id: id.to_string(),
            label: id.to_string(),
            kind: DeviceKind::AudioInput,
        }
    }

    #[test]
    fn diff_reports_added_and_removed_devices() {
        let previous = vec![device("a"), device("b")];
        let current = vec![device("b"), device("c")];

        let change = diff(&previous, &current).unwrap();
        assert_eq!(change.added.len(), 1);
        assert_eq!(change.added[0].device_id, "c");
        assert_eq!(change.removed.len(), 1);
        assert_eq!(change.removed[0].device_id, "a");
    }

    #[test]
    fn diff_of_identical_lists_is_none() {
        let devices = vec![device("a")];
        assert!(diff(&devices, &devices).is_none());
    }
}
