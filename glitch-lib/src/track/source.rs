//! Audio sources that render actions read samples from.

use std::path::PathBuf;

use crate::error::AudioError;

use super::decode::decode_file;

/// Random-access supplier of interleaved PCM at the engine format.
pub trait AudioSource: Send {
    /// Read up to `frames` frames starting at `start_frame`.
    ///
    /// Returns fewer samples (possibly none) when the request runs past the
    /// end of the audio.
    fn read_frames(&mut self, start_frame: usize, frames: usize) -> Result<Vec<f32>, AudioError>;

    /// Release any cached audio. Later reads may reload it.
    fn release(&mut self) {}
}

/// Interleaved samples held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<f32>,
    channels: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        Self {
            samples,
            channels: channels.max(1) as usize,
        }
    }

    /// A source of `frames` silent frames.
    pub fn silence(channels: u16, frames: usize) -> Self {
        let channels = channels.max(1);
        Self::new(vec![0.0; frames * channels as usize], channels)
    }

    /// A source where every sample of every frame equals `value`.
    pub fn constant(value: f32, channels: u16, frames: usize) -> Self {
        let channels = channels.max(1);
        Self::new(vec![value; frames * channels as usize], channels)
    }
}

impl AudioSource for MemorySource {
    fn read_frames(&mut self, start_frame: usize, frames: usize) -> Result<Vec<f32>, AudioError> {
        Ok(slice_frames(&self.samples, self.channels, start_frame, frames).to_vec())
    }
}

/// A file decoded on first use and kept in memory until released.
#[derive(Debug)]
pub struct DecodedFile {
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    samples: Option<Vec<f32>>,
}

impl DecodedFile {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, channels: u16) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            channels: channels.max(1),
            samples: None,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl AudioSource for DecodedFile {
    fn read_frames(&mut self, start_frame: usize, frames: usize) -> Result<Vec<f32>, AudioError> {
        if self.samples.is_none() {
            log::info!("Decoding {}...", self.path.display());
            self.samples = Some(decode_file(&self.path, self.sample_rate, self.channels)?);
        }
        let samples = self.samples.as_deref().unwrap_or_default();
        Ok(slice_frames(samples, self.channels as usize, start_frame, frames).to_vec())
    }

    fn release(&mut self) {
        self.samples = None;
    }
}

fn slice_frames(samples: &[f32], channels: usize, start_frame: usize, frames: usize) -> &[f32] {
    let start = start_frame.saturating_mul(channels).min(samples.len());
    let end = start_frame
        .saturating_add(frames)
        .saturating_mul(channels)
        .min(samples.len());
    &samples[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_slices_by_frame() {
        let mut source = MemorySource::new(vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1], 2);
        assert_eq!(source.read_frames(1, 1).unwrap(), vec![1.0, 1.1]);
        assert_eq!(source.read_frames(2, 5).unwrap(), vec![2.0, 2.1]);
        assert!(source.read_frames(9, 2).unwrap().is_empty());
    }

    #[test]
    fn missing_file_reports_io_error() {
        let mut source = DecodedFile::new("/nonexistent/track.mp3", 44_100, 2);
        assert!(matches!(source.read_frames(0, 10), Err(AudioError::Io(_))));
    }
}
