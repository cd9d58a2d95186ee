//! Device & Transport Manager (spec.md §4.2 — component 2).

pub mod device;
pub mod ice;
#[cfg(any(test, feature = "fake-rtc"))]
pub mod fake;
#[cfg(feature = "native-rtc")]
pub mod native;
pub mod types;

pub use device::{CreateTransportParams, SfuDevice, Transport};
pub use ice::{on_connection_state_change, IceRestartController};
pub use types::{
    parse_scalability_mode, DtlsParameters, IceCandidates, IceParameters, IceServer,
    RtpCapabilities, RtpEncodingParameters, RtpParameters,
};

#[cfg(feature = "native-rtc")]
pub use native::{NativeSfuDevice, NativeTransport};

/// The production `SfuDevice` the `commands::room` layer wires up,
/// isolating the `native-rtc` feature gate to this one call site.
#[cfg(feature = "native-rtc")]
pub fn default_device() -> crate::error::Result<std::sync::Arc<dyn SfuDevice>> {
    Ok(std::sync::Arc::new(native::NativeSfuDevice::new()?))
}
