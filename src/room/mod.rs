//! Room State Coordinator (spec.md §4.6 — component 6).

pub mod coordinator;
pub mod types;

pub use coordinator::{JoinOptions, RoomCoordinator};
pub use types::{LocalRecordingState, Me, Peer, Room, RoomState, PERMISSION_SHARE_AUDIO, PERMISSION_SHARE_VIDEO};
