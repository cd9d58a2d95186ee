//! Speaking-detection feedback loop (spec.md §9 design note).
//!
//! Kept as an explicit small state machine rather than the
//! `volume_change → speaking → stopped_speaking → auto-mute →
//! producer.pause` callback soup the design note warns against.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingState {
    Idle,
    Speaking,
    /// Auto-paused by voice-activated-unmute going quiet again.
    PausedAuto,
}

/// Emitted by [`SpeakingDetector::on_volume`] for the Producer Registry
/// to act on (resume/pause the mic producer) and for the Reactive Store
/// Bridge to publish.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeakingEvent {
    VolumeChanged(f32),
    Speaking,
    StoppedSpeaking,
}

/// Volume-threshold speaking detector. One instance per local or remote
/// audio track (spec.md §4.3 local mic, §4.4 remote consumers share the
/// same shape).
pub struct SpeakingDetector {
    speaking_threshold_db: f32,
    /// Minimum change (dB) before a new `volume_change` is emitted, to
    /// reduce flicker on downward transitions (spec.md §4.3).
    flicker_threshold_db: f32,
    last_reported_db: f32,
    state: SpeakingState,
}

impl SpeakingDetector {
    #[must_use]
    pub fn new(speaking_threshold_db: f32) -> Self {
        Self {
            speaking_threshold_db,
            flicker_threshold_db: 0.5,
            last_reported_db: f32::NEG_INFINITY,
            state: SpeakingState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> SpeakingState {
        self.state
    }

    /// Feed a new volume sample (dBFS, higher is louder). Returns the
    /// events raised by this sample, in order.
    pub fn on_volume(&mut self, db: f32) -> Vec<SpeakingEvent> {
        let mut events = Vec::new();

        let delta = (db - self.last_reported_db).abs();
        let is_downward = db < self.last_reported_db;
        if !is_downward || delta >= self.flicker_threshold_db {
            self.last_reported_db = db;
            events.push(SpeakingEvent::VolumeChanged(db));
        }

        let now_speaking = db >= self.speaking_threshold_db;

        match (self.state, now_speaking) {
            (SpeakingState::Idle | SpeakingState::PausedAuto, true) => {
                self.state = SpeakingState::Speaking;
                events.push(SpeakingEvent::Speaking);
            }
            (SpeakingState::Speaking, false) => {
                self.state = SpeakingState::Idle;
                events.push(SpeakingEvent::StoppedSpeaking);
            }
            _ => {}
        }

        debug!(db, ?self.state, "speaking detector sample processed");
        events
    }

    /// Mark that voice-activated-unmute auto-paused the producer after a
    /// `StoppedSpeaking` event; re-entering `Speaking` clears this.
    pub fn mark_auto_paused(&mut self) {
        if self.state == SpeakingState::Idle {
            self.state = SpeakingState::PausedAuto;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_threshold_upward_emits_speaking() {
        let mut detector = SpeakingDetector::new(-50.0);
        let events = detector.on_volume(-40.0);
        assert!(events.contains(&SpeakingEvent::Speaking));
    }

    #[test]
    fn crossing_threshold_downward_emits_stopped_speaking() {
        let mut detector = SpeakingDetector::new(-50.0);
        detector.on_volume(-40.0);
        let events = detector.on_volume(-60.0);
        assert!(events.contains(&SpeakingEvent::StoppedSpeaking));
    }

    #[test]
    fn small_downward_fluctuation_is_not_reported_as_volume_change() {
        let mut detector = SpeakingDetector::new(-50.0);
        detector.on_volume(-40.0);
        let events = detector.on_volume(-40.2);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SpeakingEvent::VolumeChanged(_))));
    }

    #[test]
    fn auto_paused_state_returns_to_speaking_on_next_loud_sample() {
        let mut detector = SpeakingDetector::new(-50.0);
        detector.on_volume(-40.0);
        detector.on_volume(-60.0);
        detector.mark_auto_paused();
        assert_eq!(detector.state(), SpeakingState::PausedAuto);

        let events = detector.on_volume(-30.0);
        assert!(events.contains(&SpeakingEvent::Speaking));
        assert_eq!(detector.state(), SpeakingState::Speaking);
    }
}
