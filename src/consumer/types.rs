//! Consumer data model (spec.md §3's `Consumer` entity).

use serde::Serialize;

use crate::producer::MediaKind;
use crate::rtc::RtpParameters;

/// `type ∈ {simple, simulcast, svc}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    Simple,
    Simulcast,
    Svc,
}

/// A remote inbound media flow delivering one remote producer.
///
/// `peerId` is a lookup key, never ownership (spec.md §9: "Consumer →
/// Peer is a lookup key, not ownership").
#[derive(Debug, Clone, Serialize)]
pub struct Consumer {
    pub id: String,
    pub peer_id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub consumer_type: ConsumerType,
    pub source: Option<String>,
    pub locally_paused: bool,
    pub remotely_paused: bool,
    pub spatial_layers: u8,
    pub temporal_layers: u8,
    pub preferred_spatial_layer: u8,
    pub preferred_temporal_layer: u8,
    pub priority: u32,
    #[serde(skip)]
    pub rtp_parameters: RtpParameters,
    pub score: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub resolution_scalings: Vec<f64>,
    pub audio_gain: Option<f64>,
    pub volume: Option<f32>,
}

impl Consumer {
    #[must_use]
    pub fn is_closed_marker(error_message: &str) -> bool {
        error_message.contains(crate::error::SFU_NOT_FOUND_MARKER)
    }
}
