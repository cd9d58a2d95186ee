//! Error taxonomy for the Room Client.
//!
//! Every public operation on [`crate::room_client::RoomClient`] and its
//! sub-registries returns [`Result`]. The command layer
//! (`commands::boundary`) is the only place these are ever converted to a
//! string for the UI.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RoomError>;

/// Marker carried on SFU error responses meaning the SFU no longer knows
/// about the referenced producer/consumer/transport. Not an error variant
/// itself — `SignalingSession::send_request` surfaces it via
/// [`RoomError::SfuNotFound`] once detected.
pub const SFU_NOT_FOUND_MARKER: &str = "notFoundInMediasoupError";

/// The error taxonomy of this client, matching the categories a careful
/// implementation needs to distinguish at the operation boundary.
#[derive(Debug, Error)]
pub enum RoomError {
    /// A signaling request exceeded `request_timeout` on every retry.
    #[error("signaling request '{method}' timed out after {attempts} attempt(s)")]
    SignalingTimeout { method: String, attempts: u32 },

    /// The SFU no longer knows about the referenced producer/consumer.
    /// The caller should close the local counterpart silently.
    #[error("SFU no longer tracks this resource: {0}")]
    SfuNotFound(String),

    /// Local media acquisition (mic, webcam, screen) failed or was denied.
    #[error("media acquisition failed: {0}")]
    MediaAcquisitionError(String),

    /// The device cannot produce the requested kind of media
    /// (`device.canProduce(kind)` returned false).
    #[error("device cannot produce {0:?}")]
    DeviceCapabilityError(crate::producer::MediaKind),

    /// A programmatic misuse of the API (e.g. device change without
    /// `restart: true`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The signaling channel closed with a reason that means the server
    /// is done with this client forever; `RoomClient::close` should have
    /// been (or will be) called.
    #[error("signaling channel disconnected permanently: {0}")]
    SignalingDisconnected(String),

    /// The signaling channel closed for a transient reason; the Room
    /// Client moves to `connecting` and awaits `reconnect`.
    #[error("signaling channel disconnected transiently: {0}")]
    SignalingTransientDisconnect(String),

    /// A non-timeout signaling error returned by the SFU, not retried.
    #[error("signaling request '{method}' failed: {reason}")]
    SignalingRejected { method: String, reason: String },

    /// Something that should be structurally impossible happened (a
    /// poisoned lock, an invariant violation). Always a bug if observed.
    #[error("internal room client error: {0}")]
    Internal(String),
}

impl RoomError {
    /// True if `self` is the distinguished "SFU forgot about this
    /// resource" marker per spec.md §7.
    #[must_use]
    pub fn is_sfu_not_found(&self) -> bool {
        matches!(self, RoomError::SfuNotFound(_))
    }

    /// A short machine-stable category name, used by the Notification
    /// Surface to pick a localization key / icon without string-matching
    /// the full message.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            RoomError::SignalingTimeout { .. } => "signaling-timeout",
            RoomError::SfuNotFound(_) => "sfu-not-found",
            RoomError::MediaAcquisitionError(_) => "media-acquisition",
            RoomError::DeviceCapabilityError(_) => "device-capability",
            RoomError::InvalidArgument(_) => "invalid-argument",
            RoomError::SignalingDisconnected(_) => "disconnected",
            RoomError::SignalingTransientDisconnect(_) => "reconnecting",
            RoomError::SignalingRejected { .. } => "server-error",
            RoomError::Internal(_) => "internal",
        }
    }
}
