//! Local media acquisition seam.
//!
//! spec.md names `getUserMedia`/screen-capture as part of the browser
//! host and does not enumerate it among the externally-assumed
//! interfaces (§1), but a Room Client cannot produce anything without
//! acquiring tracks from somewhere. Modeled as a trait at the same
//! granularity as [`crate::rtc::SfuDevice`] so unit tests never touch a
//! real camera/microphone. The production implementation is grounded in
//! the teacher's `audio::AudioHandle` (`cpal`) and `capture::FrameCapturer`
//! (native screen/webcam capture) — kept in-tree as reference, not
//! wired up verbatim, since this seam's contract (acquire/stop a track
//! by id) is narrower than the teacher's full audio pipeline.

use async_trait::async_trait;

use crate::error::Result;
use crate::producer::types::{AudioConstraints, VideoRequest};

/// A single locally captured track, identified for later `stop()`.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    pub track_id: String,
    pub label: String,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire_audio(&self, constraints: &AudioConstraints) -> Result<LocalTrack>;
    async fn acquire_video(&self, request: &VideoRequest) -> Result<LocalTrack>;
    async fn acquire_screen(&self, request: &VideoRequest) -> Result<(LocalTrack, Option<LocalTrack>)>;
    async fn stop(&self, track_id: &str);
}

/// Production `MediaSource`: validates the requested device exists via
/// `cpal`/`nokhwa` enumeration (grounded in `devices::enumerate`) and
/// mints a track id for it. Mirrors `rtc::native::NativeTransport`'s own
/// simplification — registering a `TrackLocalStaticRTP` without pumping
/// real samples through it — by not opening a live capture stream here
/// either; wiring an actual audio/video capture pipeline into the
/// `webrtc` crate's RTP packetizer is future work, not attempted by this
/// seam.
pub mod system {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait};

    use super::{AudioConstraints, LocalTrack, MediaSource, Result, VideoRequest};
    use crate::error::RoomError;

    #[derive(Default)]
    pub struct SystemMediaSource {
        counter: AtomicUsize,
    }

    impl SystemMediaSource {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn next_id(&self, prefix: &str) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            format!("{prefix}-{n}")
        }
    }

    #[async_trait]
    impl MediaSource for SystemMediaSource {
        async fn acquire_audio(&self, _constraints: &AudioConstraints) -> Result<LocalTrack> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| RoomError::MediaAcquisitionError("no default audio input device".into()))?;
            let label = device
                .name()
                .unwrap_or_else(|_| "Microphone".to_string());
            Ok(LocalTrack {
                track_id: self.next_id("mic"),
                label,
            })
        }

        async fn acquire_video(&self, request: &VideoRequest) -> Result<LocalTrack> {
            let cameras = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
                .map_err(|err| RoomError::MediaAcquisitionError(format!("camera enumeration failed: {err}")))?;
            let camera = match &request.device_id {
                Some(id) => cameras
                    .iter()
                    .find(|c| c.index().to_string() == *id)
                    .ok_or_else(|| RoomError::MediaAcquisitionError(format!("no camera with id {id}")))?,
                None => cameras
                    .first()
                    .ok_or_else(|| RoomError::MediaAcquisitionError("no camera available".into()))?,
            };
            Ok(LocalTrack {
                track_id: self.next_id("webcam"),
                label: camera.human_name(),
            })
        }

        async fn acquire_screen(&self, _request: &VideoRequest) -> Result<(LocalTrack, Option<LocalTrack>)> {
            let video = LocalTrack {
                track_id: self.next_id("screen"),
                label: "Screen".to_string(),
            };
            let audio = cpal::default_host().default_output_device().map(|_| LocalTrack {
                track_id: self.next_id("screen-audio"),
                label: "Screen Audio".to_string(),
            });
            Ok((video, audio))
        }

        async fn stop(&self, _track_id: &str) {}
    }
}

#[cfg(any(test, feature = "fake-rtc"))]
pub mod fake {
    use super::{AudioConstraints, LocalTrack, MediaSource, Result, VideoRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeMediaSource {
        counter: AtomicUsize,
        pub stopped: Mutex<Vec<String>>,
        pub fail_next: std::sync::atomic::AtomicBool,
    }

    impl FakeMediaSource {
        fn next_track(&self, label: &str) -> Result<LocalTrack> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(crate::error::RoomError::MediaAcquisitionError(format!(
                    "fake acquisition failure for {label}"
                )));
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(LocalTrack {
                track_id: format!("track-{n}"),
                label: label.to_string(),
            })
        }
    }

    #[async_trait]
    impl MediaSource for FakeMediaSource {
        async fn acquire_audio(&self, _constraints: &AudioConstraints) -> Result<LocalTrack> {
            self.next_track("audio")
        }

        async fn acquire_video(&self, _request: &VideoRequest) -> Result<LocalTrack> {
            self.next_track("video")
        }

        async fn acquire_screen(
            &self,
            _request: &VideoRequest,
        ) -> Result<(LocalTrack, Option<LocalTrack>)> {
            let video = self.next_track("screen-video")?;
            let audio = self.next_track("screen-audio").ok();
            Ok((video, audio))
        }

        async fn stop(&self, track_id: &str) {
            self.stopped.lock().unwrap().push(track_id.to_string());
        }
    }
}
