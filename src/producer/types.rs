//! Producer data model (spec.md §3's `Producer` entity).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rtc::types::RtpParameters;

/// `kind ∈ {audio, video}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// `source ∈ {mic, webcam, extravideo, screen, screen-audio}`.
///
/// `ExtraVideo` entries are keyed separately by device id in the registry
/// (spec.md §4.3: "as webcam, but stored in an additional map"), so this
/// variant carries no payload here — the map key is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerSource {
    Mic,
    Webcam,
    #[serde(rename = "extravideo")]
    ExtraVideo,
    Screen,
    #[serde(rename = "screen-audio")]
    ScreenAudio,
}

impl ProducerSource {
    pub fn kind(self) -> MediaKind {
        match self {
            ProducerSource::Mic | ProducerSource::ScreenAudio => MediaKind::Audio,
            ProducerSource::Webcam | ProducerSource::ExtraVideo | ProducerSource::Screen => {
                MediaKind::Video
            }
        }
    }

    /// The `appData.source` value sent to the SFU with the `produce`
    /// request. Every source reports its own name verbatim, **except**
    /// `ScreenAudio`, which is tagged `"mic"` intentionally — see its own
    /// doc comment for why this must not be "corrected".
    ///
    /// Load-bearing for server-side audio mixing: the SFU groups audio
    /// producers tagged `"mic"` into the same spotlighting/mixing path
    /// as the peer's primary microphone, so a screen-share's system audio
    /// is treated like the sharer's voice rather than as a separate,
    /// unmixed stream. Tagging it `"screen-audio"` would silently drop it
    /// from that mix. Preserve this even though it looks like a bug.
    pub fn wire_source(self) -> &'static str {
        match self {
            ProducerSource::Mic => "mic",
            ProducerSource::Webcam => "webcam",
            ProducerSource::ExtraVideo => "extravideo",
            ProducerSource::Screen => "screen",
            ProducerSource::ScreenAudio => "mic",
        }
    }
}

/// A locally owned media flow registered with the SFU.
#[derive(Debug, Clone, Serialize)]
pub struct Producer {
    pub id: String,
    pub source: ProducerSourceTag,
    pub kind: MediaKind,
    pub paused: bool,
    pub track_id: String,
    pub rtp_parameters: RtpParameters,
    pub codec: Option<String>,
    pub score: Option<Value>,
}

/// String form of [`ProducerSource`] carried on the wire/in the store;
/// kept distinct from the enum so extra-video producers can record their
/// device id alongside the fixed `"extravideo"` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducerSourceTag {
    pub source: ProducerSource,
    pub device_id: Option<String>,
}

/// Audio constraints for `getUserMedia`-equivalent acquisition
/// (spec.md §4.3's `updateMic`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub sample_rate: u32,
    pub channel_count: u8,
    pub sample_size: u8,
    pub auto_gain_control: bool,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channel_count: 1,
            sample_size: 16,
            auto_gain_control: true,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Opus codec options applied when producing the mic track
/// (spec.md §4.3's `updateMic`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpusOptions {
    pub opus_stereo: bool,
    pub opus_fec: bool,
    pub opus_dtx: bool,
    pub opus_max_playback_rate: u32,
    pub opus_ptime: u32,
}

impl Default for OpusOptions {
    fn default() -> Self {
        Self {
            opus_stereo: false,
            opus_fec: true,
            opus_dtx: true,
            opus_max_playback_rate: 48_000,
            opus_ptime: 20,
        }
    }
}

/// Video acquisition request: device id plus the resolution tier named in
/// spec.md §6's constants table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRequest {
    pub device_id: Option<String>,
    pub width: u32,
    pub frame_rate: u32,
}
