//! Render actions emitted by the mixer.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::track::{TrackHandle, TrackId};

/// Direction of a linear gain ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeDirection {
    In,
    Out,
}

/// Linear ramp applied at one end of an action.
///
/// A fade in ramps up over the first `seconds` of the action; a fade out
/// ramps down over the last `seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fade {
    pub direction: FadeDirection,
    pub seconds: f64,
}

impl Fade {
    pub fn new(direction: FadeDirection, seconds: f64) -> Self {
        Self {
            direction,
            seconds: seconds.max(0.0),
        }
    }
}

/// Discriminant of a [`RenderAction`], used in logs and status records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    Playback,
    Crossfade,
    Terminate,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Playback => "Playback",
            ActionKind::Crossfade => "Crossfade",
            ActionKind::Terminate => "Terminate",
        };
        f.write_str(name)
    }
}

/// An instruction to produce a span of PCM audio.
///
/// All positions and durations are in seconds of the referenced track.
#[derive(Debug, Clone)]
pub enum RenderAction {
    /// Solo playback of one track.
    Playback {
        track: Arc<TrackHandle>,
        start: f64,
        duration: f64,
        fade: Option<Fade>,
    },
    /// Two tracks overlapped and summed.
    Crossfade {
        outgoing: Arc<TrackHandle>,
        incoming: Arc<TrackHandle>,
        start_out: f64,
        start_in: f64,
        duration: f64,
    },
    /// Final playback of the last track, faded to silence.
    Terminate {
        track: Arc<TrackHandle>,
        start: f64,
        duration: f64,
        fade: Fade,
    },
}

/// Actions emitted together by one mixer step, rendered in order.
pub type ActionBatch = Vec<RenderAction>;

impl RenderAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            RenderAction::Playback { .. } => ActionKind::Playback,
            RenderAction::Crossfade { .. } => ActionKind::Crossfade,
            RenderAction::Terminate { .. } => ActionKind::Terminate,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            RenderAction::Playback { duration, .. }
            | RenderAction::Crossfade { duration, .. }
            | RenderAction::Terminate { duration, .. } => *duration,
        }
    }

    /// Track ids touched by this action, outgoing first.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.spans().iter().map(|span| span.id).collect()
    }

    /// Which part of which track this action plays.
    pub fn spans(&self) -> Vec<TrackSpan> {
        match self {
            RenderAction::Playback {
                track,
                start,
                duration,
                ..
            }
            | RenderAction::Terminate {
                track,
                start,
                duration,
                ..
            } => vec![TrackSpan::new(track, *start, *duration)],
            RenderAction::Crossfade {
                outgoing,
                incoming,
                start_out,
                start_in,
                duration,
            } => vec![
                TrackSpan::new(outgoing, *start_out, *duration),
                TrackSpan::new(incoming, *start_in, *duration),
            ],
        }
    }

    /// Status record for this action once `samples` frames were rendered for it.
    pub fn metadata(&self, samples: usize) -> MetadataRecord {
        MetadataRecord {
            action: self.kind(),
            duration: self.duration(),
            samples,
            tracks: self.spans(),
        }
    }
}

/// Portion of a track covered by an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSpan {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub start: f64,
    pub end: f64,
}

impl TrackSpan {
    fn new(track: &TrackHandle, start: f64, duration: f64) -> Self {
        Self {
            id: track.id,
            title: track.details.title.clone(),
            artist: track.details.artist.clone(),
            start,
            end: start + duration,
        }
    }
}

/// Per-action record published after rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub action: ActionKind,
    pub duration: f64,
    /// Frames actually rendered.
    pub samples: usize,
    pub tracks: Vec<TrackSpan>,
}
