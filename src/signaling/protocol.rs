//! Wire shapes for the signaling channel.
//!
//! The channel carries three message shapes (spec.md §4.1): an outbound
//! **request** awaiting an ack, an inbound **request** (answered `500
//! unknown` — this client never serves requests), and an inbound
//! **notification**. This module models the outbound request/response
//! pairs and the inbound notification payloads named in spec.md §6
//! verbatim; it intentionally does not attempt to type `getTransportStats`
//! (spec.md §9 Open Question 1 — server-defined shape, reflected as-is).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outbound request frame: `{method, data}` awaiting an ack.
#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame {
    pub method: &'static str,
    pub data: Value,
}

/// The ack payload a peer on the other end of the channel returns for a
/// request: `(err, response)`.
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    pub error: Option<AckError>,
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AckError {
    pub message: String,
}

/// An inbound notification frame: `{method, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationFrame {
    pub method: String,
    #[serde(default)]
    pub data: Value,
}

/// All outbound request methods named in spec.md §6, used as a
/// compile-time-checked key into `RequestFrame::method` rather than a
/// bare `&str` at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    GetRouterRtpCapabilities,
    CreateWebRtcTransport,
    ConnectWebRtcTransport,
    RestartIce,
    Join,
    Produce,
    CloseProducer,
    PauseProducer,
    ResumeProducer,
    PauseConsumer,
    ResumeConsumer,
    SetConsumerPreferedLayers,
    SetConsumerPriority,
    RequestConsumerKeyFrame,
    GetTransportStats,
    ChangeDisplayName,
    ChangePicture,
    ChatMessage,
    RaisedHand,
    LockRoom,
    UnlockRoom,
    SetAccessCode,
    SetJoinByAccessCode,
    AddConsentForRecording,
    PromotePeer,
    PromoteAllPeers,
    ModeratorClearChat,
    ModeratorGiveRole,
    ModeratorRemoveRole,
    ModeratorKickPeer,
    ModeratorMute,
    ModeratorMuteAll,
    ModeratorStopVideo,
    ModeratorStopAllVideo,
    ModeratorStopScreenSharing,
    ModeratorStopAllScreenSharing,
    ModeratorCloseMeeting,
    ModeratorLowerHand,
}

impl RequestMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetRouterRtpCapabilities => "getRouterRtpCapabilities",
            Self::CreateWebRtcTransport => "createWebRtcTransport",
            Self::ConnectWebRtcTransport => "connectWebRtcTransport",
            Self::RestartIce => "restartIce",
            Self::Join => "join",
            Self::Produce => "produce",
            Self::CloseProducer => "closeProducer",
            Self::PauseProducer => "pauseProducer",
            Self::ResumeProducer => "resumeProducer",
            Self::PauseConsumer => "pauseConsumer",
            Self::ResumeConsumer => "resumeConsumer",
            Self::SetConsumerPreferedLayers => "setConsumerPreferedLayers",
            Self::SetConsumerPriority => "setConsumerPriority",
            Self::RequestConsumerKeyFrame => "requestConsumerKeyFrame",
            Self::GetTransportStats => "getTransportStats",
            Self::ChangeDisplayName => "changeDisplayName",
            Self::ChangePicture => "changePicture",
            Self::ChatMessage => "chatMessage",
            Self::RaisedHand => "raisedHand",
            Self::LockRoom => "lockRoom",
            Self::UnlockRoom => "unlockRoom",
            Self::SetAccessCode => "setAccessCode",
            Self::SetJoinByAccessCode => "setJoinByAccessCode",
            Self::AddConsentForRecording => "addConsentForRecording",
            Self::PromotePeer => "promotePeer",
            Self::PromoteAllPeers => "promoteAllPeers",
            Self::ModeratorClearChat => "moderator:clearChat",
            Self::ModeratorGiveRole => "moderator:giveRole",
            Self::ModeratorRemoveRole => "moderator:removeRole",
            Self::ModeratorKickPeer => "moderator:kickPeer",
            Self::ModeratorMute => "moderator:mute",
            Self::ModeratorMuteAll => "moderator:muteAll",
            Self::ModeratorStopVideo => "moderator:stopVideo",
            Self::ModeratorStopAllVideo => "moderator:stopAllVideo",
            Self::ModeratorStopScreenSharing => "moderator:stopScreenSharing",
            Self::ModeratorStopAllScreenSharing => "moderator:stopAllScreenSharing",
            Self::ModeratorCloseMeeting => "moderator:closeMeeting",
            Self::ModeratorLowerHand => "moderator:lowerHand",
        }
    }
}

/// All inbound notification methods named in spec.md §6. The dynamic
/// dispatch table (spec.md §9 design note) is keyed by the raw string
/// rather than this enum, because unknown methods must be tolerated
/// (logged and swallowed) rather than rejected at parse time; this enum
/// exists so handler registration sites can't typo a method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMethod {
    EnteredLobby,
    SignInRequired,
    OverRoomLimit,
    RoomReady,
    RoomBack,
    LockRoom,
    UnlockRoom,
    ParkedPeer,
    ParkedPeers,
    LobbyPeerClosed,
    LobbyPromotedPeer,
    LobbyChangeDisplayName,
    LobbyChangePicture,
    SetAccessCode,
    SetJoinByAccessCode,
    ActiveSpeaker,
    ChangeDisplayName,
    ChangePicture,
    RaisedHand,
    ChatMessage,
    ModeratorClearChat,
    SendFile,
    ProducerScore,
    NewPeer,
    PeerClosed,
    NewConsumer,
    ConsumerClosed,
    ConsumerPaused,
    ConsumerResumed,
    ConsumerLayersChanged,
    ConsumerScore,
    ModeratorMute,
    ModeratorStopVideo,
    ModeratorStopScreenSharing,
    ModeratorKick,
    ModeratorLowerHand,
    GotRole,
    LostRole,
    AddConsentForRecording,
    SetLocalRecording,
}

impl NotificationMethod {
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::EnteredLobby => "enteredLobby",
            Self::SignInRequired => "signInRequired",
            Self::OverRoomLimit => "overRoomLimit",
            Self::RoomReady => "roomReady",
            Self::RoomBack => "roomBack",
            Self::LockRoom => "lockRoom",
            Self::UnlockRoom => "unlockRoom",
            Self::ParkedPeer => "parkedPeer",
            Self::ParkedPeers => "parkedPeers",
            Self::LobbyPeerClosed => "lobby:peerClosed",
            Self::LobbyPromotedPeer => "lobby:promotedPeer",
            Self::LobbyChangeDisplayName => "lobby:changeDisplayName",
            Self::LobbyChangePicture => "lobby:changePicture",
            Self::SetAccessCode => "setAccessCode",
            Self::SetJoinByAccessCode => "setJoinByAccessCode",
            Self::ActiveSpeaker => "activeSpeaker",
            Self::ChangeDisplayName => "changeDisplayName",
            Self::ChangePicture => "changePicture",
            Self::RaisedHand => "raisedHand",
            Self::ChatMessage => "chatMessage",
            Self::ModeratorClearChat => "moderator:clearChat",
            Self::SendFile => "sendFile",
            Self::ProducerScore => "producerScore",
            Self::NewPeer => "newPeer",
            Self::PeerClosed => "peerClosed",
            Self::NewConsumer => "newConsumer",
            Self::ConsumerClosed => "consumerClosed",
            Self::ConsumerPaused => "consumerPaused",
            Self::ConsumerResumed => "consumerResumed",
            Self::ConsumerLayersChanged => "consumerLayersChanged",
            Self::ConsumerScore => "consumerScore",
            Self::ModeratorMute => "moderator:mute",
            Self::ModeratorStopVideo => "moderator:stopVideo",
            Self::ModeratorStopScreenSharing => "moderator:stopScreenSharing",
            Self::ModeratorKick => "moderator:kick",
            Self::ModeratorLowerHand => "moderator:lowerHand",
            Self::GotRole => "gotRole",
            Self::LostRole => "lostRole",
            Self::AddConsentForRecording => "addConsentForRecording",
            Self::SetLocalRecording => "setLocalRecording",
        }
    }

    /// Look up the enum variant from a wire method name, used purely for
    /// tests and documentation; the live dispatcher (`room::dispatch`)
    /// matches on the raw string so unknown methods don't need a variant.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        use NotificationMethod::*;
        let all = [
            EnteredLobby,
            SignInRequired,
            OverRoomLimit,
            RoomReady,
            RoomBack,
            LockRoom,
            UnlockRoom,
            ParkedPeer,
            ParkedPeers,
            LobbyPeerClosed,
            LobbyPromotedPeer,
            LobbyChangeDisplayName,
            LobbyChangePicture,
            SetAccessCode,
            SetJoinByAccessCode,
            ActiveSpeaker,
            ChangeDisplayName,
            ChangePicture,
            RaisedHand,
            ChatMessage,
            ModeratorClearChat,
            SendFile,
            ProducerScore,
            NewPeer,
            PeerClosed,
            NewConsumer,
            ConsumerClosed,
            ConsumerPaused,
            ConsumerResumed,
            ConsumerLayersChanged,
            ConsumerScore,
            ModeratorMute,
            ModeratorStopVideo,
            ModeratorStopScreenSharing,
            ModeratorKick,
            ModeratorLowerHand,
            GotRole,
            LostRole,
            AddConsentForRecording,
            SetLocalRecording,
        ];
        all.into_iter().find(|m| m.wire_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_notification_method_name() {
        for method in [
            NotificationMethod::NewConsumer,
            NotificationMethod::ModeratorStopScreenSharing,
            NotificationMethod::SetLocalRecording,
        ] {
            let name = method.wire_name();
            assert_eq!(NotificationMethod::from_wire_name(name), Some(method));
        }
    }

    #[test]
    fn unknown_method_name_resolves_to_none() {
        assert_eq!(NotificationMethod::from_wire_name("totallyUnknown"), None);
    }
}
