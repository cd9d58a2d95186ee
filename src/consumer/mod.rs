//! Consumer Registry (spec.md §4.4 — component 4).

pub mod layers;
pub mod registry;
pub mod types;

pub use layers::{adapt_preferred_layers, PreferredLayers};
pub use registry::{ConsumerEvent, ConsumerRegistry, NewConsumerParams};
pub use types::{Consumer, ConsumerType};
