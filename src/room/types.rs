//! Room/Peer/Me data model (spec.md §3).

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    New,
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalRecordingState {
    Start,
    Resume,
    Pause,
    Stop,
}

/// `Peer`: identity of a non-self room participant.
#[derive(Debug, Clone, Serialize)]
pub struct Peer {
    pub peer_id: String,
    pub display_name: String,
    pub picture: Option<String>,
    pub roles: HashSet<String>,
    pub raised_hand: bool,
    pub raised_hand_timestamp: Option<i64>,
    #[serde(skip)]
    pub local_recording_state: Option<LocalRecordingState>,
}

impl Peer {
    #[must_use]
    pub fn new(peer_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            display_name: display_name.into(),
            picture: None,
            roles: HashSet::new(),
            raised_hand: false,
            raised_hand_timestamp: None,
            local_recording_state: None,
        }
    }
}

/// `Me`: the self-peer, superset of [`Peer`].
#[derive(Debug, Clone, Serialize)]
pub struct Me {
    pub peer: Peer,
    pub browser_info: Option<String>,
    pub can_send_mic: bool,
    pub can_send_webcam: bool,
    pub auto_muted: bool,
    pub speaking: bool,
    pub logged_in: bool,
}

impl Me {
    #[must_use]
    pub fn new(peer_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            peer: Peer::new(peer_id, display_name),
            browser_info: None,
            can_send_mic: false,
            can_send_webcam: false,
            auto_muted: false,
            speaking: false,
            logged_in: false,
        }
    }
}

/// Room-wide state (spec.md §3's `Room state`).
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    pub state: RoomState,
    pub in_lobby: bool,
    pub joined: bool,
    pub locked: bool,
    pub access_code: Option<String>,
    pub join_by_access_code: bool,
    pub over_room_limit: bool,
    pub sign_in_required: bool,
    pub active_speaker_id: Option<String>,
    pub spotlights: Vec<String>,
    pub selected_peers: HashSet<String>,
    pub user_roles: HashMap<String, Value>,
    pub room_permissions: HashMap<String, Value>,
    pub allow_when_role_missing: HashSet<String>,
    pub turn_servers: Vec<crate::rtc::IceServer>,
    /// Set from the `join` response's `tracker` field; never read
    /// elsewhere (spec.md §9 Open Question 2 — its purpose upstream is
    /// unclear, kept verbatim rather than guessed at).
    pub tracker: Option<Value>,
}

impl Room {
    #[must_use]
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            state: RoomState::New,
            in_lobby: false,
            joined: false,
            locked: false,
            access_code: None,
            join_by_access_code: false,
            over_room_limit: false,
            sign_in_required: false,
            active_speaker_id: None,
            spotlights: Vec::new(),
            selected_peers: HashSet::new(),
            user_roles: HashMap::new(),
            room_permissions: HashMap::new(),
            allow_when_role_missing: HashSet::new(),
            turn_servers: Vec::new(),
            tracker: None,
        }
    }

    /// Whether `permission` is granted given `roles`, honoring
    /// `allowWhenRoleMissing` (spec.md §4.6's `_joinRoom` permission
    /// gating for `SHARE_VIDEO`/`SHARE_AUDIO`).
    #[must_use]
    pub fn has_permission(&self, permission: &str, roles: &HashSet<String>) -> bool {
        if self.allow_when_role_missing.contains(permission) {
            return true;
        }
        let Some(allowed_roles) = self.room_permissions.get(permission) else {
            return false;
        };
        let Some(allowed_roles) = allowed_roles.as_array() else {
            return false;
        };
        allowed_roles
            .iter()
            .filter_map(Value::as_str)
            .any(|role| roles.contains(role))
    }
}

pub const PERMISSION_SHARE_AUDIO: &str = "SHARE_AUDIO";
pub const PERMISSION_SHARE_VIDEO: &str = "SHARE_VIDEO";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn allow_when_role_missing_grants_permission_unconditionally() {
        let mut room = Room::new("r1");
        room.allow_when_role_missing.insert(PERMISSION_SHARE_AUDIO.to_string());

        assert!(room.has_permission(PERMISSION_SHARE_AUDIO, &HashSet::new()));
    }

    #[test]
    fn permission_requires_a_matching_role() {
        let mut room = Room::new("r1");
        room.room_permissions.insert(
            PERMISSION_SHARE_VIDEO.to_string(),
            json!(["moderator"]),
        );

        let mut roles = HashSet::new();
        assert!(!room.has_permission(PERMISSION_SHARE_VIDEO, &roles));

        roles.insert("moderator".to_string());
        assert!(room.has_permission(PERMISSION_SHARE_VIDEO, &roles));
    }
}
