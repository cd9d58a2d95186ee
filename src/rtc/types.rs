//! WebRTC/SFU-facing value types.
//!
//! spec.md treats the "low-level WebRTC/SFU client library" as an assumed
//! external dependency exposing `load(caps)`, `canProduce(kind)`,
//! `createSendTransport`, `createRecvTransport`,
//! `Transport.{produce,consume,restartIce}`, `parseScalabilityMode`. These
//! types are the data that crosses that seam; their internal shape is
//! intentionally opaque (`serde_json::Value`) where spec.md doesn't
//! enumerate fields, matching the "assumed interface" framing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque RTP capabilities blob returned by `getRouterRtpCapabilities`
/// and consumed by `SfuDevice::load`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RtpCapabilities(pub Value);

/// Opaque ICE parameters, refreshed on every ICE restart.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IceParameters(pub Value);

/// Opaque ICE candidates list handed to a newly created transport.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IceCandidates(pub Value);

/// Opaque DTLS parameters exchanged on `connectWebRtcTransport`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DtlsParameters(pub Value);

/// Opaque RTP parameters describing a produced or consumed stream.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RtpParameters(pub Value);

/// A single TURN/STUN server entry (spec.md §6's `turnServers`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// One encoding layer of an outbound RTP stream (simulcast or single
/// SVC-capable encoding). Mirrors the subset of `RTCRtpEncodingParameters`
/// spec.md's resolution-scaling algorithm (§4.3) and simulcast profile
/// selection (§4.3, §6) operate on.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RtpEncodingParameters {
    pub rid: Option<String>,
    pub scale_resolution_down_by: Option<f64>,
    pub max_bitrate: Option<u32>,
    pub scalability_mode: Option<String>,
    pub network_priority: Option<crate::config::NetworkPriority>,
    pub dtx: Option<bool>,
}

/// Parse the spatial layer count out of a scalability mode string like
/// `"S3T3_KEY"` or `"L2T3"`, matching mediasoup's `parseScalabilityMode`
/// helper named in spec.md §1. Returns `(spatial_layers, temporal_layers)`,
/// defaulting to `(1, 1)` when the mode is absent or unrecognized.
#[must_use]
pub fn parse_scalability_mode(mode: Option<&str>) -> (u8, u8) {
    let Some(mode) = mode else {
        return (1, 1);
    };

    let bytes = mode.as_bytes();
    let mut spatial = 1u8;
    let mut temporal = 1u8;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'S' | b'L' => {
                let (value, next) = read_digits(bytes, i + 1);
                if let Some(v) = value {
                    spatial = v;
                }
                i = next;
            }
            b'T' => {
                let (value, next) = read_digits(bytes, i + 1);
                if let Some(v) = value {
                    temporal = v;
                }
                i = next;
            }
            _ => i += 1,
        }
    }

    (spatial.max(1), temporal.max(1))
}

fn read_digits(bytes: &[u8], mut i: usize) -> (Option<u8>, usize) {
    let start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == start {
        return (None, i);
    }
    let s = std::str::from_utf8(&bytes[start..i]).unwrap_or("");
    (s.parse().ok(), i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spatial_and_temporal_layers() {
        assert_eq!(parse_scalability_mode(Some("S3T3_KEY")), (3, 3));
        assert_eq!(parse_scalability_mode(Some("L2T3")), (2, 3));
        assert_eq!(parse_scalability_mode(Some("T3")), (1, 3));
    }

    #[test]
    fn defaults_to_single_layer_when_absent_or_unrecognized() {
        assert_eq!(parse_scalability_mode(None), (1, 1));
        assert_eq!(parse_scalability_mode(Some("garbage")), (1, 1));
    }
}
