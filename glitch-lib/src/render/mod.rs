//! Render actions into interleaved 16-bit PCM.

pub mod pacing;

use crate::error::RenderError;
use crate::mixer::action::{Fade, FadeDirection, RenderAction};
use crate::settings::RenderSettings;
use crate::track::TrackHandle;

pub use pacing::{Pacer, Shutdown};

/// PCM produced for one action.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAudio {
    /// Interleaved signed 16-bit little-endian samples.
    pub pcm: Vec<u8>,
    pub frames: usize,
    pub sample_rate: u32,
}

impl RenderedAudio {
    /// Playback length of the rendered audio in seconds.
    pub fn seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Turns [`RenderAction`]s into PCM at a fixed output format.
#[derive(Debug, Clone)]
pub struct Renderer {
    sample_rate: u32,
    channels: usize,
}

impl Renderer {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            channels: settings.channels.max(1) as usize,
        }
    }

    /// Render one action.
    ///
    /// Audio missing at the end of a track is rendered as silence, so the
    /// output always covers the action's full duration.
    pub fn render(&self, action: &RenderAction) -> Result<RenderedAudio, RenderError> {
        let frames = self.frames_for(action.duration())?;
        let mixed = match action {
            RenderAction::Playback {
                track,
                start,
                fade,
                ..
            } => {
                let mut samples = self.read_scaled(track, *start, frames)?;
                if let Some(fade) = fade {
                    self.apply_fade(&mut samples, *fade);
                }
                samples
            }
            RenderAction::Terminate {
                track, start, fade, ..
            } => {
                let mut samples = self.read_scaled(track, *start, frames)?;
                self.apply_fade(&mut samples, *fade);
                samples
            }
            RenderAction::Crossfade {
                outgoing,
                incoming,
                start_out,
                start_in,
                ..
            } => {
                let mut out = self.read_scaled(outgoing, *start_out, frames)?;
                let mut into = self.read_scaled(incoming, *start_in, frames)?;
                self.apply_fade(&mut out, Fade::new(FadeDirection::Out, action.duration()));
                self.apply_fade(&mut into, Fade::new(FadeDirection::In, action.duration()));
                for (sample, other) in out.iter_mut().zip(into) {
                    *sample += other;
                }
                out
            }
        };

        Ok(RenderedAudio {
            pcm: to_pcm16(&mixed),
            frames,
            sample_rate: self.sample_rate,
        })
    }

    fn frames_for(&self, seconds: f64) -> Result<usize, RenderError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(RenderError::Span(format!("duration {}s", seconds)));
        }
        Ok((seconds * self.sample_rate as f64).round() as usize)
    }

    /// Read `frames` frames from `start` seconds, gain-scaled and zero-padded.
    fn read_scaled(
        &self,
        track: &TrackHandle,
        start: f64,
        frames: usize,
    ) -> Result<Vec<f32>, RenderError> {
        if !start.is_finite() {
            return Err(RenderError::Span(format!("start {}s", start)));
        }
        let start_frame = (start.max(0.0) * self.sample_rate as f64).round() as usize;
        let mut samples = if frames == 0 {
            Vec::new()
        } else {
            track.read_frames(start_frame, frames)?
        };
        samples.resize(frames * self.channels, 0.0);
        for sample in &mut samples {
            *sample *= track.gain;
        }
        Ok(samples)
    }

    fn apply_fade(&self, samples: &mut [f32], fade: Fade) {
        let total = samples.len() / self.channels;
        let fade_frames = ((fade.seconds * self.sample_rate as f64).round() as usize).min(total);
        if fade_frames == 0 {
            return;
        }
        for (frame, chunk) in samples.chunks_mut(self.channels).enumerate() {
            let level = match fade.direction {
                FadeDirection::In if frame < fade_frames => frame as f32 / fade_frames as f32,
                FadeDirection::Out if frame >= total - fade_frames => {
                    (total - frame) as f32 / fade_frames as f32
                }
                _ => continue,
            };
            for sample in chunk {
                *sample *= level;
            }
        }
    }
}

/// Clamp and convert float samples to signed 16-bit little-endian bytes.
pub fn to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        pcm.extend_from_slice(&value.to_le_bytes());
    }
    pcm
}
