//! The `Track` aggregate: metadata, analysis and audio owned together.
//!
//! A track is built once from a [`TrackRequest`], at which point its analysis
//! is checked, its gain is derived from its loudness, and the validity rule is
//! applied. Render actions only ever see the shared [`TrackHandle`], which
//! never carries the (large) analysis payload.

mod decode;
mod source;

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::analysis::Analysis;
use crate::error::{AudioError, TrackError};
use crate::transitions::{audible_bounds, check_trims};

pub use decode::decode_file;
pub use source::{AudioSource, DecodedFile, MemorySource};

/// Identifier of a track in the catalog.
pub type TrackId = u64;

/// Loudness (dB) that maps to unity gain.
pub const LOUDNESS_THRESH: f64 = -8.0;

/// Map a track's loudness in dB to a linear gain.
///
/// Quieter tracks receive gain above 1.0, louder tracks below it.
pub fn gain(loudness: f64) -> f64 {
    1.0 - LOUDNESS_THRESH * (LOUDNESS_THRESH - loudness) / 100.0
}

/// Editorial metadata attached to a track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDetails {
    pub artist: String,
    pub title: String,
    /// Length in seconds as recorded in the catalog.
    pub length: f64,
    /// Number of beats to overlap with the next track. `0` disables crossfading.
    pub xfade: f64,
    /// Seconds trimmed from the in point.
    pub itrim: f64,
    /// Seconds trimmed from the out point.
    pub otrim: f64,
}

/// Everything needed to add a track to the mixer.
pub struct TrackRequest {
    pub id: TrackId,
    pub details: TrackDetails,
    pub analysis: Analysis,
    pub source: Box<dyn AudioSource>,
}

impl fmt::Debug for TrackRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackRequest")
            .field("id", &self.id)
            .field("details", &self.details)
            .finish()
    }
}

/// Render-side view of a track, shared between actions.
pub struct TrackHandle {
    pub id: TrackId,
    pub details: TrackDetails,
    pub gain: f32,
    /// Analysed duration in seconds.
    pub duration: f64,
    source: Mutex<Box<dyn AudioSource>>,
}

impl TrackHandle {
    pub fn new(
        id: TrackId,
        details: TrackDetails,
        gain: f32,
        duration: f64,
        source: Box<dyn AudioSource>,
    ) -> Self {
        Self {
            id,
            details,
            gain,
            duration,
            source: Mutex::new(source),
        }
    }

    /// Read interleaved samples for `frames` frames starting at `start_frame`.
    ///
    /// The result may be shorter than requested near the end of the audio.
    pub fn read_frames(&self, start_frame: usize, frames: usize) -> Result<Vec<f32>, AudioError> {
        self.source.lock().unwrap().read_frames(start_frame, frames)
    }

    /// Drop any decoded audio held by the source.
    pub fn release_audio(&self) {
        self.source.lock().unwrap().release();
    }
}

impl fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackHandle")
            .field("id", &self.id)
            .field("title", &self.details.title)
            .field("gain", &self.gain)
            .field("duration", &self.duration)
            .finish()
    }
}

/// A validated track waiting in (or at the head of) the mixer queue.
pub struct Track {
    handle: Arc<TrackHandle>,
    analysis: Option<Analysis>,
}

impl Track {
    /// Check, gain-compute and validate a requested track.
    ///
    /// # Errors
    /// Returns [`TrackError::Analysis`] for malformed analysis and
    /// [`TrackError::Invalid`] when the track has no audible content or is
    /// shorter than two transition windows.
    pub fn prepare(request: TrackRequest, transition_time: f64) -> Result<Self, TrackError> {
        let TrackRequest {
            id,
            details,
            analysis,
            source,
        } = request;

        analysis.validate()?;
        audible_bounds(&analysis)?;
        if analysis.duration < transition_time * 2.0 {
            return Err(TrackError::Invalid(format!(
                "track {} too short: {:.2}s with a {:.2}s transition",
                id, analysis.duration, transition_time
            )));
        }
        check_trims(&analysis, &details)?;

        let handle = TrackHandle::new(
            id,
            details,
            gain(analysis.loudness) as f32,
            analysis.duration,
            source,
        );

        Ok(Self {
            handle: Arc::new(handle),
            analysis: Some(analysis),
        })
    }

    pub fn id(&self) -> TrackId {
        self.handle.id
    }

    pub fn details(&self) -> &TrackDetails {
        &self.handle.details
    }

    pub fn gain(&self) -> f32 {
        self.handle.gain
    }

    pub fn duration(&self) -> f64 {
        self.handle.duration
    }

    pub fn handle(&self) -> &Arc<TrackHandle> {
        &self.handle
    }

    /// Analysis payload, or an error once it has been released.
    pub fn analysis(&self) -> Result<&Analysis, TrackError> {
        self.analysis
            .as_ref()
            .ok_or_else(|| TrackError::Invalid(format!("analysis of track {} was released", self.id())))
    }

    /// Discard the analysis payload once no further transition needs it.
    pub fn release_analysis(&mut self) {
        if self.analysis.take().is_some() {
            debug!("released analysis for track {}", self.id());
        }
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("handle", &self.handle)
            .field("analysed", &self.analysis.is_some())
            .finish()
    }
}
