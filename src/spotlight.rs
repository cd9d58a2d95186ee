//! Spotlight Selector (spec.md §4.5 — component 5).
//!
//! Pure state: a recency-ordered speaker list, a manually-selected set
//! (always included), and the set of peers known to have video. No I/O
//! lives here — the Room Coordinator reads `recompute()`'s output and
//! drives `ConsumerRegistry::update_spotlights` with it.

use std::collections::HashSet;

pub struct SpotlightSelector {
    max_spotlights: usize,
    hide_no_video_participants: bool,
    /// Most-recently-active speaker first.
    speaker_list: Vec<String>,
    selected: Vec<String>,
    has_video: HashSet<String>,
}

impl SpotlightSelector {
    #[must_use]
    pub fn new(max_spotlights: usize, hide_no_video_participants: bool) -> Self {
        Self {
            max_spotlights,
            hide_no_video_participants,
            speaker_list: Vec::new(),
            selected: Vec::new(),
            has_video: HashSet::new(),
        }
    }

    pub fn set_max_spotlights(&mut self, max_spotlights: usize) {
        self.max_spotlights = max_spotlights;
    }

    pub fn set_has_video(&mut self, peer_id: &str, has_video: bool) {
        if has_video {
            self.has_video.insert(peer_id.to_string());
        } else {
            self.has_video.remove(peer_id);
        }
    }

    /// `activeSpeaker` notification for a non-self peer: move to front.
    pub fn on_active_speaker(&mut self, peer_id: &str) {
        self.speaker_list.retain(|p| p != peer_id);
        self.speaker_list.insert(0, peer_id.to_string());
    }

    /// `newPeer` notification: append to the back of the speaker list.
    pub fn on_new_peer(&mut self, peer_id: &str) {
        if !self.speaker_list.iter().any(|p| p == peer_id) {
            self.speaker_list.push(peer_id.to_string());
        }
    }

    /// `peerClosed` notification: drop from every tracked set.
    pub fn on_peer_closed(&mut self, peer_id: &str) {
        self.speaker_list.retain(|p| p != peer_id);
        self.selected.retain(|p| p != peer_id);
        self.has_video.remove(peer_id);
    }

    pub fn add_selected_peer(&mut self, peer_id: &str) {
        if !self.selected.iter().any(|p| p == peer_id) {
            self.selected.push(peer_id.to_string());
        }
    }

    /// Clears the selected set first, then selects exactly `peer_id`.
    pub fn set_selected_peer(&mut self, peer_id: &str) {
        self.selected.clear();
        self.selected.push(peer_id.to_string());
    }

    pub fn remove_selected_peer(&mut self, peer_id: &str) {
        self.selected.retain(|p| p != peer_id);
    }

    pub fn clear_selected_peers(&mut self) {
        self.selected.clear();
    }

    /// Recompute: `selected ∪ top-K-of-speaker-list` (`K = maxSpotlights -
    /// |selected|`), filtered by `hideNoVideoParticipants` if set.
    #[must_use]
    pub fn recompute(&self) -> Vec<String> {
        let mut result: Vec<String> = self.selected.clone();

        let k = self.max_spotlights.saturating_sub(result.len());
        for peer_id in self.speaker_list.iter().take(k) {
            if !result.iter().any(|p| p == peer_id) {
                result.push(peer_id.clone());
            }
        }

        if self.hide_no_video_participants {
            result.retain(|p| self.has_video.contains(p));
        }

        result.truncate(self.max_spotlights);
        result
    }

    /// Stub seam for the UI's selected-peer keyboard navigation, which
    /// spec.md §9 Open Question 3 notes was commented out upstream.
    /// Intentionally unimplemented rather than guessed at.
    pub fn select_next(&self) -> crate::error::Result<()> {
        Err(crate::error::RoomError::InvalidArgument(
            "keyboard navigation is not implemented".to_string(),
        ))
    }

    pub fn select_previous(&self) -> crate::error::Result<()> {
        Err(crate::error::RoomError::InvalidArgument(
            "keyboard navigation is not implemented".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_speaker_moves_peer_to_front_and_into_spotlights() {
        let mut selector = SpotlightSelector::new(2, false);
        selector.on_new_peer("p1");
        selector.on_new_peer("p2");
        selector.on_new_peer("p3");

        selector.on_active_speaker("p3");

        assert_eq!(selector.recompute(), vec!["p3".to_string(), "p1".to_string()]);
    }

    #[test]
    fn selected_peers_take_priority_over_speaker_list() {
        let mut selector = SpotlightSelector::new(2, false);
        selector.on_new_peer("p1");
        selector.on_new_peer("p2");
        selector.add_selected_peer("p2");
        selector.on_active_speaker("p1");

        let spotlights = selector.recompute();
        assert!(spotlights.contains(&"p2".to_string()));
        assert_eq!(spotlights.len(), 2);
    }

    #[test]
    fn peer_closed_removes_from_every_set() {
        let mut selector = SpotlightSelector::new(4, false);
        selector.on_new_peer("p1");
        selector.add_selected_peer("p1");

        selector.on_peer_closed("p1");

        assert!(selector.recompute().is_empty());
    }

    #[test]
    fn hide_no_video_participants_filters_spotlights_without_video() {
        let mut selector = SpotlightSelector::new(4, true);
        selector.on_new_peer("p1");
        selector.on_active_speaker("p1");
        selector.set_has_video("p1", false);

        assert!(selector.recompute().is_empty());

        selector.set_has_video("p1", true);
        assert_eq!(selector.recompute(), vec!["p1".to_string()]);
    }

    #[test]
    fn spotlight_count_never_exceeds_max() {
        let mut selector = SpotlightSelector::new(2, false);
        for peer in ["p1", "p2", "p3", "p4"] {
            selector.on_new_peer(peer);
        }
        assert!(selector.recompute().len() <= 2);
    }
}
