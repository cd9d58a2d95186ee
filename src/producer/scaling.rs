//! Resolution-scaling algorithm (spec.md §4.3, tested in §8).
//!
//! Derives the scale-down factor per encoding layer, used later by
//! `adaptConsumerPreferredLayers` on the consumer side to pick a
//! preferred spatial layer from a viewport size.

use crate::rtc::types::{parse_scalability_mode, RtpEncodingParameters};

/// `getResolutionScalings` from spec.md §4.3:
/// - SVC (single encoding): parse spatial layers `L` from `scalabilityMode`,
///   emit `[2^(L-1), …, 2^0]`.
/// - Simulcast (multiple encodings): use `max(1.0, scaleResolutionDownBy)`
///   per encoding where defined; if none are defined, emit the same
///   power-of-two ladder sized to the encoding count; if at least one is
///   defined, undefined ones become `1.0`.
#[must_use]
pub fn resolution_scalings(encodings: &[RtpEncodingParameters]) -> Vec<f64> {
    if encodings.len() == 1 {
        let (spatial_layers, _) = parse_scalability_mode(encodings[0].scalability_mode.as_deref());
        return power_of_two_ladder(spatial_layers as usize);
    }

    let any_defined = encodings.iter().any(|e| e.scale_resolution_down_by.is_some());

    if !any_defined {
        return power_of_two_ladder(encodings.len());
    }

    encodings
        .iter()
        .map(|e| e.scale_resolution_down_by.map_or(1.0, |v| v.max(1.0)))
        .collect()
}

fn power_of_two_ladder(count: usize) -> Vec<f64> {
    let count = count.max(1);
    (0..count)
        .map(|i| 2f64.powi((count - 1 - i) as i32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding(scale: Option<f64>) -> RtpEncodingParameters {
        RtpEncodingParameters {
            scale_resolution_down_by: scale,
            ..Default::default()
        }
    }

    #[test]
    fn svc_single_encoding_uses_scalability_mode() {
        let encodings = vec![RtpEncodingParameters {
            scalability_mode: Some("S3T3_KEY".to_string()),
            ..Default::default()
        }];
        assert_eq!(resolution_scalings(&encodings), vec![4.0, 2.0, 1.0]);
    }

    #[test]
    fn simulcast_with_no_scale_defined_uses_power_of_two_ladder() {
        let encodings = vec![encoding(None), encoding(None), encoding(None)];
        assert_eq!(resolution_scalings(&encodings), vec![4.0, 2.0, 1.0]);
    }

    #[test]
    fn simulcast_with_partial_scale_clamps_and_fills_undefined_with_one() {
        let encodings = vec![encoding(Some(0.5)), encoding(None)];
        assert_eq!(resolution_scalings(&encodings), vec![1.0, 1.0]);
    }
}
