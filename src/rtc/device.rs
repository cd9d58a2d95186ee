//! Device & Transport Manager seams (spec.md §4.2 — component 2).
//!
//! `SfuDevice` and `Transport` model the assumed "device abstraction"
//! from spec.md §1: `load(caps)`, `canProduce(kind)`,
//! `createSendTransport`, `createRecvTransport`,
//! `Transport.{produce,consume,restartIce}`. `rtc::native` provides a
//! concrete adapter over the `webrtc` crate (feature `native-rtc`,
//! grounded in the teacher's `webrtc::WebRtcClient`); `rtc::fake`
//! provides the hand-written test double used by `room_client` tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::producer::MediaKind;
use crate::rtc::types::{
    DtlsParameters, IceCandidates, IceParameters, IceServer, RtpCapabilities, RtpEncodingParameters,
    RtpParameters,
};
use crate::signaling::SignalingSession;

/// Parameters needed to construct a send or receive transport.
pub struct CreateTransportParams {
    pub id: String,
    pub ice_parameters: IceParameters,
    pub ice_candidates: IceCandidates,
    pub dtls_parameters: DtlsParameters,
    pub ice_servers: Vec<IceServer>,
    /// Forced when the browser flag is "firefox" and TURN servers are
    /// present (spec.md §4.2).
    pub force_relay: bool,
    /// Handle the transport uses to issue `connectWebRtcTransport` and
    /// `produce` requests itself (spec.md §4.2).
    pub signaling: SignalingSession,
}

/// The SFU device abstraction: loads router capabilities once, reports
/// whether it can produce a given kind, and creates the two transports
/// spec.md §3 names (`sendTransport`, `recvTransport`).
#[async_trait]
pub trait SfuDevice: Send + Sync {
    /// Load RTP capabilities obtained from `getRouterRtpCapabilities`,
    /// after the `urn:3gpp:video-orientation` header extension has been
    /// stripped (spec.md §4.2's "compatibility workaround").
    async fn load(&self, caps: RtpCapabilities) -> Result<()>;

    fn can_produce(&self, kind: MediaKind) -> bool;

    async fn create_send_transport(
        &self,
        params: CreateTransportParams,
    ) -> Result<Box<dyn Transport>>;

    async fn create_recv_transport(
        &self,
        params: CreateTransportParams,
    ) -> Result<Box<dyn Transport>>;
}

/// One WebRTC transport (unidirectional in role: send or recv).
#[async_trait]
pub trait Transport: Send + Sync {
    fn id(&self) -> &str;

    /// Issue the local `connect` callback's DTLS handshake; spec.md §4.2:
    /// "issue `connectWebRtcTransport` with the transport's
    /// `dtlsParameters`".
    async fn connect(&self, dtls_parameters: DtlsParameters) -> Result<()>;

    /// Produce a new local track on this (send) transport, returning the
    /// SFU-assigned producer id.
    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        encodings: Vec<RtpEncodingParameters>,
        app_data_source: &str,
    ) -> Result<String>;

    /// Consume a remote track on this (recv) transport.
    async fn consume(
        &self,
        producer_id: &str,
        rtp_parameters: RtpParameters,
    ) -> Result<String>;

    /// Request a fresh set of ICE parameters be applied to this
    /// transport after a `restartIce` signaling round-trip.
    async fn restart_ice(&self, ice_parameters: IceParameters) -> Result<()>;

    /// Current `connectionstatechange` value (`"new"`, `"connecting"`,
    /// `"connected"`, `"disconnected"`, `"failed"`, `"closed"`).
    fn connection_state(&self) -> String;

    /// Stream of `connectionstatechange` values, starting with the
    /// transport's state at creation. Drives ICE-restart recovery
    /// (spec.md §4.2, §8).
    fn subscribe_state(&self) -> tokio::sync::watch::Receiver<String>;

    async fn close(&self);
}
