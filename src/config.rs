//! Room Client configuration.
//!
//! Mirrors the "Configuration" table of spec.md §6. Loaded once from a
//! JSON blob handed in by the out-of-scope entry point (the `config` URL
//! parameter, already decoded) and never mutated afterwards — components
//! hold an `Arc<RoomClientConfig>`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Network priority tier, applied to the first simulcast encoding of a
/// video producer (spec.md §4.3 — "a known WebRTC limitation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPriority {
    High,
    Medium,
    Low,
    VeryLow,
}

/// Per-source network priority table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPriorities {
    #[serde(default = "NetworkPriorities::default_audio")]
    pub audio: NetworkPriority,
    #[serde(default = "NetworkPriorities::default_main_video")]
    pub main_video: NetworkPriority,
    #[serde(default = "NetworkPriorities::default_additional_videos")]
    pub additional_videos: NetworkPriority,
    #[serde(default = "NetworkPriorities::default_extra_video")]
    pub extra_video: NetworkPriority,
    #[serde(default = "NetworkPriorities::default_screen_share")]
    pub screen_share: NetworkPriority,
}

impl NetworkPriorities {
    fn default_audio() -> NetworkPriority {
        NetworkPriority::High
    }
    fn default_main_video() -> NetworkPriority {
        NetworkPriority::High
    }
    fn default_additional_videos() -> NetworkPriority {
        NetworkPriority::Low
    }
    fn default_extra_video() -> NetworkPriority {
        NetworkPriority::Medium
    }
    fn default_screen_share() -> NetworkPriority {
        NetworkPriority::Medium
    }
}

impl Default for NetworkPriorities {
    fn default() -> Self {
        Self {
            audio: Self::default_audio(),
            main_video: Self::default_main_video(),
            additional_videos: Self::default_additional_videos(),
            extra_video: Self::default_extra_video(),
            screen_share: Self::default_screen_share(),
        }
    }
}

/// A single simulcast profile: the resolution tier name mapped to the
/// set of RTP encoding widths it generates. Keyed by the video
/// constraints table name (`low`, `medium`, `high`, `veryhigh`,
/// `ultra`), matching spec.md §6's constants.
pub type SimulcastProfiles = HashMap<String, Vec<u32>>;

/// Room Client configuration, deserialized from the host application's
/// config blob. Unknown keys are ignored (`#[serde(default)]`
/// everywhere) so a forward-compatible server config doesn't break an
/// older client build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomClientConfig {
    pub hide_timeout: u64,
    pub request_timeout: u64,
    pub request_retries: u32,
    pub simulcast: bool,
    pub simulcast_sharing: bool,
    pub simulcast_profiles: SimulcastProfiles,
    pub last_n: usize,
    pub mobile_last_n: usize,
    pub adaptive_scaling_factor: f64,
    pub auto_mute_threshold: Option<usize>,
    pub network_priorities: NetworkPriorities,
    pub notification_sounds: bool,
    pub supported_browsers: Vec<String>,
    pub background: Option<String>,
    pub theme: Option<String>,
    pub login_enabled: bool,
}

impl Default for RoomClientConfig {
    fn default() -> Self {
        Self {
            hide_timeout: 3000,
            request_timeout: 20_000,
            request_retries: 3,
            simulcast: true,
            simulcast_sharing: false,
            simulcast_profiles: SimulcastProfiles::default(),
            last_n: 4,
            mobile_last_n: 1,
            adaptive_scaling_factor: 0.75,
            auto_mute_threshold: None,
            network_priorities: NetworkPriorities::default(),
            notification_sounds: true,
            supported_browsers: Vec::new(),
            background: None,
            theme: None,
            login_enabled: false,
        }
    }
}

impl RoomClientConfig {
    /// Parse a config blob, clamping/normalizing fields that have a
    /// specified valid range (spec.md §6:
    /// `adaptiveScalingFactor (default 0.75, clamped to [0.5, 1.0])`).
    pub fn from_json(blob: &str) -> serde_json::Result<Self> {
        let mut cfg: Self = serde_json::from_str(blob)?;
        cfg.normalize();
        Ok(cfg)
    }

    fn normalize(&mut self) {
        self.adaptive_scaling_factor = self.adaptive_scaling_factor.clamp(0.5, 1.0);
        if self.last_n == 0 {
            self.last_n = Self::default().last_n;
        }
        if self.mobile_last_n == 0 {
            self.mobile_last_n = Self::default().mobile_last_n;
        }
    }

    /// `maxSpotlights` per spec.md §3's Lifecycle invariants: `desktop:
    /// config.lastN; mobile: config.mobileLastN`.
    #[must_use]
    pub fn max_spotlights(&self, is_mobile: bool) -> usize {
        if is_mobile {
            self.mobile_last_n
        } else {
            self.last_n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RoomClientConfig::default();
        assert_eq!(cfg.adaptive_scaling_factor, 0.75);
        assert_eq!(cfg.max_spotlights(false), 4);
        assert_eq!(cfg.max_spotlights(true), 1);
    }

    #[test]
    fn adaptive_scaling_factor_is_clamped_on_load() {
        let cfg = RoomClientConfig::from_json(r#"{"adaptiveScalingFactor": 1.5}"#).unwrap();
        assert_eq!(cfg.adaptive_scaling_factor, 1.0);

        let cfg = RoomClientConfig::from_json(r#"{"adaptiveScalingFactor": 0.1}"#).unwrap();
        assert_eq!(cfg.adaptive_scaling_factor, 0.5);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg = RoomClientConfig::from_json(r#"{"somethingServerAddedLater": 42}"#);
        assert!(cfg.is_ok());
    }

    #[test]
    fn zero_last_n_falls_back_to_default() {
        let cfg = RoomClientConfig::from_json(r#"{"lastN": 0}"#).unwrap();
        assert_eq!(cfg.last_n, RoomClientConfig::default().last_n);
    }
}
