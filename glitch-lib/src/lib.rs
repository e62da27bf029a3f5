//! # Glitch Broadcast Library
//!
//! This library renders a never-ending radio program from analysed tracks.
//! Transitions are planned on the beat, rendered to PCM at real-time pace,
//! encoded by an external transcoder and fanned out to listeners from a
//! bounded ring of frame-aligned chunks.

pub mod analysis;
pub mod broadcast;
pub mod catalog;
pub mod error;
pub mod mixer;
pub mod pipeline;
pub mod render;
pub mod settings;
pub mod status;
pub mod track;
pub mod transitions;
