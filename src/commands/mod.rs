//! Tauri command surface: the thin adapter layer between the frontend
//! and [`crate::room_client::RoomClient`].

pub mod boundary;
pub mod room;
