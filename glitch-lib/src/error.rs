//! Error types shared across the mixing and broadcast pipeline.

use thiserror::Error;

/// Malformed or missing analysis data for a track.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("analysis has no segments")]
    NoSegments,
    #[error("{kind} {index} has a non-finite or negative timing ({start}s + {duration}s)")]
    BadTiming {
        kind: &'static str,
        index: usize,
        start: f64,
        duration: f64,
    },
    #[error("segment {0} has a non-finite loudness")]
    BadLoudness(usize),
    #[error("track duration {0}s is not a positive number")]
    BadDuration(f64),
}

/// Reasons a track cannot take part in a transition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    /// The track fails the validity rule (too short, silent, over-trimmed).
    #[error("invalid track: {0}")]
    Invalid(String),
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Failures while opening or decoding a track's audio.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("resample error: {0}")]
    Resample(String),
}

impl From<symphonia::core::errors::Error> for AudioError {
    fn from(value: symphonia::core::errors::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Failure rendering or delivering a single action.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("transcoder write failed: {0}")]
    Write(std::io::Error),
    #[error("invalid action span: {0}")]
    Span(String),
}

/// Failure acquiring the next track from the input.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid track descriptor {path}: {message}")]
    Descriptor { path: String, message: String },
    #[error("catalog is empty")]
    Empty,
    #[error("input closed")]
    Closed,
}

/// Errors raised by the mixer's batch generator.
#[derive(Error, Debug)]
pub enum MixerError {
    #[error("transition failed: {0}")]
    Transition(#[from] TrackError),
    #[error("track queue is in an inconsistent state: {0}")]
    Queue(String),
}

/// Errors that stop the whole pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to start transcoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("pipeline already started")]
    AlreadyStarted,
    #[error("mixer failed: {0}")]
    Mixer(#[from] MixerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transcoder exited with {0}")]
    Transcoder(String),
    #[error("{0} thread panicked")]
    Panicked(String),
}
