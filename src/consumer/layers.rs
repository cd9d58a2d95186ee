//! Preferred-layer adaptation algorithm (spec.md §4.4, tested in §8).

use crate::consumer::types::{Consumer, ConsumerType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferredLayers {
    pub spatial: u8,
    pub temporal: u8,
}

/// `adaptConsumerPreferredLayers(consumer, viewportWidth, viewportHeight)`.
///
/// `None` for simple consumers (no-op per spec.md §4.4). `adaptive_scaling_factor`
/// is expected pre-clamped to `[0.5, 1.0]` (the config layer does this on load).
#[must_use]
pub fn adapt_preferred_layers(
    consumer: &Consumer,
    viewport_width: u32,
    viewport_height: u32,
    adaptive_scaling_factor: f64,
) -> Option<PreferredLayers> {
    if consumer.consumer_type == ConsumerType::Simple {
        return None;
    }

    let (Some(width), Some(height)) = (consumer.width, consumer.height) else {
        return None;
    };
    if consumer.resolution_scalings.is_empty() {
        return None;
    }

    let f = adaptive_scaling_factor.clamp(0.5, 1.0);
    let spatial = preferred_spatial_layer(
        &consumer.resolution_scalings,
        width,
        height,
        viewport_width,
        viewport_height,
        f,
    );

    let mut temporal = consumer.temporal_layers.saturating_sub(1);
    if spatial == 0 {
        let lowest_width = width as f64 / consumer.resolution_scalings[0];
        let viewport_width = f64::from(viewport_width);
        if viewport_width < lowest_width / 2.0 {
            temporal = temporal.saturating_sub(1);
        }
        if viewport_width < lowest_width / 4.0 {
            temporal = temporal.saturating_sub(1);
        }
    }

    Some(PreferredLayers { spatial, temporal })
}

fn preferred_spatial_layer(
    resolution_scalings: &[f64],
    width: u32,
    height: u32,
    viewport_width: u32,
    viewport_height: u32,
    f: f64,
) -> u8 {
    for (i, scaling) in resolution_scalings.iter().enumerate().rev() {
        let needed_width = f * f64::from(width) / scaling;
        let needed_height = f * f64::from(height) / scaling;
        if f64::from(viewport_width) >= needed_width || f64::from(viewport_height) >= needed_height {
            return i as u8;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::MediaKind;

    fn consumer(resolution_scalings: Vec<f64>, width: u32, height: u32) -> Consumer {
        Consumer {
            id: "c1".into(),
            peer_id: "p1".into(),
            producer_id: "prod1".into(),
            kind: MediaKind::Video,
            consumer_type: ConsumerType::Simulcast,
            source: None,
            locally_paused: false,
            remotely_paused: false,
            spatial_layers: resolution_scalings.len() as u8,
            temporal_layers: 3,
            preferred_spatial_layer: 0,
            preferred_temporal_layer: 2,
            priority: 1,
            rtp_parameters: crate::rtc::RtpParameters::default(),
            score: None,
            width: Some(width),
            height: Some(height),
            resolution_scalings,
            audio_gain: None,
            volume: None,
        }
    }

    #[test]
    fn small_viewport_selects_lowest_spatial_layer() {
        let c = consumer(vec![4.0, 2.0, 1.0], 1280, 720);
        let layers = adapt_preferred_layers(&c, 320, 180, 0.75).unwrap();
        assert_eq!(layers.spatial, 0);
    }

    #[test]
    fn full_size_viewport_selects_highest_spatial_layer() {
        let c = consumer(vec![4.0, 2.0, 1.0], 1280, 720);
        let layers = adapt_preferred_layers(&c, 1280, 720, 0.75).unwrap();
        assert_eq!(layers.spatial, 2);
    }

    #[test]
    fn simple_consumer_is_a_no_op() {
        let mut c = consumer(vec![1.0], 1280, 720);
        c.consumer_type = ConsumerType::Simple;
        assert!(adapt_preferred_layers(&c, 320, 180, 0.75).is_none());
    }
}
