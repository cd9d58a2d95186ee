//! Hand-written `SfuDevice`/`Transport` test doubles.
//!
//! No mocking crate is used, matching the teacher's own test style (plain
//! structs implementing the trait by hand). `FakeSfuDevice` hands out
//! `FakeTransport`s that record every call for assertions and can be
//! configured to fail a specific operation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use crate::error::{RoomError, Result};
use crate::producer::MediaKind;
use crate::rtc::device::{CreateTransportParams, SfuDevice, Transport};
use crate::rtc::types::{DtlsParameters, IceParameters, RtpCapabilities, RtpEncodingParameters, RtpParameters};
use crate::signaling::{RequestMethod, SignalingSession};

#[derive(Default)]
pub struct FakeSfuDevice {
    pub loaded: AtomicUsize,
    pub fail_transport_creation: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl SfuDevice for FakeSfuDevice {
    async fn load(&self, _caps: RtpCapabilities) -> Result<()> {
        self.loaded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn can_produce(&self, kind: MediaKind) -> bool {
        matches!(kind, MediaKind::Audio | MediaKind::Video)
    }

    async fn create_send_transport(&self, params: CreateTransportParams) -> Result<Box<dyn Transport>> {
        if self.fail_transport_creation.load(Ordering::SeqCst) {
            return Err(RoomError::Internal("transport creation failed".into()));
        }
        Ok(Box::new(FakeTransport::new(params.id, params.signaling)))
    }

    async fn create_recv_transport(&self, params: CreateTransportParams) -> Result<Box<dyn Transport>> {
        if self.fail_transport_creation.load(Ordering::SeqCst) {
            return Err(RoomError::Internal("transport creation failed".into()));
        }
        Ok(Box::new(FakeTransport::new(params.id, params.signaling)))
    }
}

pub struct FakeTransport {
    id: String,
    signaling: SignalingSession,
    state_tx: watch::Sender<String>,
    pub restart_ice_calls: AtomicUsize,
    pub fail_restart_ice: std::sync::atomic::AtomicBool,
    pub produced: Mutex<Vec<(MediaKind, String)>>,
    pub consumed: Mutex<Vec<String>>,
}

impl FakeTransport {
    #[must_use]
    pub fn new(id: String, signaling: SignalingSession) -> Self {
        let (state_tx, _) = watch::channel("new".to_string());
        Self {
            id,
            signaling,
            state_tx,
            restart_ice_calls: AtomicUsize::new(0),
            fail_restart_ice: std::sync::atomic::AtomicBool::new(false),
            produced: Mutex::new(Vec::new()),
            consumed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: &str) {
        let _ = self.state_tx.send(state.to_string());
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn connect(&self, dtls_parameters: DtlsParameters) -> Result<()> {
        self.signaling
            .send_request(
                RequestMethod::ConnectWebRtcTransport,
                json!({ "transportId": self.id, "dtlsParameters": dtls_parameters.0 }),
            )
            .await?;
        self.set_state("connected");
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        encodings: Vec<RtpEncodingParameters>,
        app_data_source: &str,
    ) -> Result<String> {
        let kind_str = match kind {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        };
        let response = self
            .signaling
            .send_request(
                RequestMethod::Produce,
                json!({
                    "transportId": self.id,
                    "kind": kind_str,
                    "rtpParameters": rtp_parameters.0,
                    "appData": { "source": app_data_source, "encodings": encodings },
                }),
            )
            .await?;

        let id = response
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("producer-{}", self.produced.lock().unwrap().len()));
        self.produced.lock().unwrap().push((kind, app_data_source.to_string()));
        Ok(id)
    }

    async fn consume(&self, producer_id: &str, _rtp_parameters: RtpParameters) -> Result<String> {
        let id = format!("consumer-{}", self.consumed.lock().unwrap().len());
        self.consumed.lock().unwrap().push(producer_id.to_string());
        Ok(id)
    }

    async fn restart_ice(&self, _ice_parameters: IceParameters) -> Result<()> {
        self.restart_ice_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_restart_ice.load(Ordering::SeqCst) {
            return Err(RoomError::Internal("restart_ice failed".into()));
        }
        Ok(())
    }

    fn connection_state(&self) -> String {
        self.state_tx.borrow().clone()
    }

    fn subscribe_state(&self) -> watch::Receiver<String> {
        self.state_tx.subscribe()
    }

    async fn close(&self) {
        self.set_state("closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomClientConfig;
    use crate::signaling::fake::FakeSignalingTransport;

    fn test_signaling() -> SignalingSession {
        SignalingSession::new(
            std::sync::Arc::new(FakeSignalingTransport::new()),
            std::sync::Arc::new(RoomClientConfig::default()),
        )
    }

    fn params(signaling: SignalingSession) -> CreateTransportParams {
        CreateTransportParams {
            id: "t1".into(),
            ice_parameters: IceParameters::default(),
            ice_candidates: crate::rtc::types::IceCandidates::default(),
            dtls_parameters: DtlsParameters::default(),
            ice_servers: vec![],
            force_relay: false,
            signaling,
        }
    }

    #[tokio::test]
    async fn records_every_produced_track() {
        let device = FakeSfuDevice::default();
        let transport = device.create_send_transport(params(test_signaling())).await.unwrap();

        transport
            .produce(MediaKind::Audio, RtpParameters::default(), vec![], "mic")
            .await
            .unwrap();

        assert_eq!(transport.connection_state(), "new");
    }

    #[tokio::test]
    async fn transport_creation_can_be_made_to_fail() {
        let device = FakeSfuDevice::default();
        device.fail_transport_creation.store(true, Ordering::SeqCst);

        let result = device.create_send_transport(params(test_signaling())).await;

        assert!(result.is_err());
    }
}
