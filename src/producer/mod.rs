//! Producer Registry (spec.md §4.3 — component 3).

pub mod media_source;
pub mod registry;
pub mod scaling;
pub mod speaking;
pub mod types;

pub use media_source::{LocalTrack, MediaSource};
pub use registry::{
    ProducerEvent, ProducerRegistry, UpdateMicOptions, UpdateScreenOptions, UpdateVideoOptions,
};
pub use scaling::resolution_scalings;
pub use speaking::{SpeakingDetector, SpeakingEvent, SpeakingState};
pub use types::{
    AudioConstraints, MediaKind, OpusOptions, Producer, ProducerSource, ProducerSourceTag,
    VideoRequest,
};
