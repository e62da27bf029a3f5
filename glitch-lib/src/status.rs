//! Stream status: render watermark, recent actions and track history.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::mixer::action::{MetadataRecord, RenderAction};
use crate::render::pacing::unix_now;
use crate::track::{TrackDetails, TrackId};

/// Receiver for per-action metadata published by the render loop.
pub trait MetadataSink: Send + Sync {
    /// Called after `action` was rendered and written, with the watermark
    /// at which its audio begins.
    fn publish(&self, action: &RenderAction, record: MetadataRecord, started_at: f64);

    /// Called whenever the render watermark moves.
    fn set_rendered_until(&self, rendered_until: f64);
}

/// A track as it entered the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: TrackId,
    /// Wall-clock time (Unix seconds) its solo playback begins.
    pub start_time: f64,
    pub details: TrackDetails,
}

/// Serializable view of the stream for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub ts: f64,
    pub render_time: f64,
    pub tracks: Vec<HistoryEntry>,
    pub recent: Vec<MetadataRecord>,
}

#[derive(Debug, Default)]
struct StatusState {
    rendered_until: f64,
    records: VecDeque<MetadataRecord>,
    tracks: VecDeque<HistoryEntry>,
}

/// Bounded in-memory status store.
#[derive(Debug)]
pub struct StreamStatus {
    history: usize,
    state: Mutex<StatusState>,
}

impl StreamStatus {
    pub fn new(history: usize) -> Self {
        Self {
            history: history.max(1),
            state: Mutex::new(StatusState::default()),
        }
    }

    pub fn rendered_until(&self) -> f64 {
        self.state.lock().unwrap().rendered_until
    }

    pub fn records(&self) -> Vec<MetadataRecord> {
        self.state.lock().unwrap().records.iter().cloned().collect()
    }

    pub fn tracks(&self) -> Vec<HistoryEntry> {
        self.state.lock().unwrap().tracks.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.lock().unwrap();
        StatusSnapshot {
            ts: unix_now(),
            render_time: state.rendered_until,
            tracks: state.tracks.iter().cloned().collect(),
            recent: state.records.iter().cloned().collect(),
        }
    }
}

impl MetadataSink for StreamStatus {
    fn publish(&self, action: &RenderAction, record: MetadataRecord, started_at: f64) {
        let mut state = self.state.lock().unwrap();
        if let RenderAction::Playback { track, .. } | RenderAction::Terminate { track, .. } = action {
            let repeat = state.tracks.back().is_some_and(|last| last.id == track.id);
            if !repeat {
                state.tracks.push_back(HistoryEntry {
                    id: track.id,
                    start_time: started_at,
                    details: track.details.clone(),
                });
                if state.tracks.len() > self.history {
                    state.tracks.pop_front();
                }
            }
        }
        state.records.push_back(record);
        if state.records.len() > self.history {
            state.records.pop_front();
        }
    }

    fn set_rendered_until(&self, rendered_until: f64) {
        let mut state = self.state.lock().unwrap();
        state.rendered_until = state.rendered_until.max(rendered_until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::action::ActionKind;
    use crate::track::{MemorySource, TrackHandle};
    use std::sync::Arc;

    fn playback(id: u64) -> RenderAction {
        let details = TrackDetails {
            title: format!("Song {}", id),
            artist: "Someone".to_string(),
            ..TrackDetails::default()
        };
        RenderAction::Playback {
            track: Arc::new(TrackHandle::new(
                id,
                details,
                1.0,
                60.0,
                Box::new(MemorySource::silence(2, 0)),
            )),
            start: 0.0,
            duration: 10.0,
            fade: None,
        }
    }

    #[test]
    fn records_history_once_per_track() {
        let status = StreamStatus::new(8);
        for (id, at) in [(1, 100.0), (1, 110.0), (2, 120.0)] {
            let action = playback(id);
            let record = action.metadata(441_000);
            status.publish(&action, record, at);
        }
        let tracks = status.tracks();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].start_time, 100.0);
        assert_eq!(tracks[1].details.title, "Song 2");
        assert_eq!(status.records().len(), 3);
        assert_eq!(status.records()[0].action, ActionKind::Playback);
        assert_eq!(status.records()[0].tracks[0].end, 10.0);
    }

    #[test]
    fn history_is_bounded() {
        let status = StreamStatus::new(3);
        for id in 0..10 {
            let action = playback(id);
            status.publish(&action, action.metadata(0), id as f64);
        }
        assert_eq!(status.tracks().len(), 3);
        assert_eq!(status.tracks()[0].id, 7);
        assert_eq!(status.records().len(), 3);
    }

    #[test]
    fn watermark_never_decreases() {
        let status = StreamStatus::new(3);
        status.set_rendered_until(50.0);
        status.set_rendered_until(40.0);
        assert_eq!(status.rendered_until(), 50.0);

        let json = serde_json::to_value(status.snapshot()).unwrap();
        assert_eq!(json["render_time"], 50.0);
        assert!(json["tracks"].as_array().unwrap().is_empty());
    }
}
