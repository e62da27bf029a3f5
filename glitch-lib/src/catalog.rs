//! Directory-backed track catalog.
//!
//! Each `*.json` file in the catalog directory describes one track:
//!
//! ```json
//! {
//!   "id": 12,
//!   "filename": "some_song.mp3",
//!   "sequence": 4,
//!   "details": {"artist": "...", "title": "...", "xfade": 8, "itrim": 0, "otrim": 0},
//!   "analysis": {"segments": [...], "beats": [...], "tatums": [...], "loudness": -9.5, "duration": 201.3}
//! }
//! ```
//!
//! Audio is looked up next to the descriptor, then under `audio/`.
//!
//! The endless stream favours the least-played tracks; one-shot renders
//! follow `sequence` (default 0), ties keeping file name order.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::Analysis;
use crate::error::SourceError;
use crate::mixer::input::{Acquired, TrackSource};
use crate::settings::RenderSettings;
use crate::track::{DecodedFile, TrackDetails, TrackId, TrackRequest};

/// One catalog entry as stored on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackDescriptor {
    pub id: TrackId,
    pub filename: String,
    /// Position in one-shot renders.
    #[serde(default)]
    pub sequence: i64,
    #[serde(default)]
    pub details: TrackDetails,
    pub analysis: Analysis,
}

/// Tracks available for broadcast.
pub struct Catalog {
    root: PathBuf,
    entries: Vec<TrackDescriptor>,
    sample_rate: u32,
    channels: u16,
    rng: StdRng,
    /// Times each entry has been handed out by [`Catalog::next_random`].
    plays: Vec<u64>,
    last: Option<usize>,
}

impl Catalog {
    /// Load every descriptor in `root`, ordered by file name.
    ///
    /// # Errors
    /// Fails on unreadable directories, malformed descriptors, or an empty
    /// catalog.
    pub fn load(root: impl AsRef<Path>, render: &RenderSettings) -> Result<Self, SourceError> {
        let root = root.as_ref().to_path_buf();
        let mut paths: Vec<PathBuf> = fs::read_dir(&root)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let text = fs::read_to_string(&path)?;
            let descriptor: TrackDescriptor =
                serde_json::from_str(&text).map_err(|err| SourceError::Descriptor {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })?;
            entries.push(descriptor);
        }

        if entries.is_empty() {
            return Err(SourceError::Empty);
        }
        info!("Loaded {} tracks from {}", entries.len(), root.display());

        Ok(Self {
            root,
            plays: vec![0; entries.len()],
            entries,
            sample_rate: render.sample_rate,
            channels: render.channels,
            rng: StdRng::from_entropy(),
            last: None,
        })
    }

    /// Replace the random source, for reproducible selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TrackDescriptor] {
        &self.entries
    }

    /// How often the track with `id` has been picked so far.
    pub fn plays(&self, id: TrackId) -> u64 {
        self.entries
            .iter()
            .position(|entry| entry.id == id)
            .map_or(0, |index| self.plays[index])
    }

    /// A random pick among the least-played tracks, counted as played.
    ///
    /// The previous pick is never repeated while another track is equally
    /// unplayed.
    pub fn next_random(&mut self) -> Result<TrackRequest, SourceError> {
        let Some(&fewest) = self.plays.iter().min() else {
            return Err(SourceError::Empty);
        };
        let mut candidates: Vec<usize> = (0..self.entries.len())
            .filter(|&index| self.plays[index] == fewest)
            .collect();
        if candidates.len() > 1 {
            candidates.retain(|&index| Some(index) != self.last);
        }
        let index = candidates[self.rng.gen_range(0..candidates.len())];

        self.plays[index] += 1;
        self.last = Some(index);
        Ok(self.request(&self.entries[index]))
    }

    /// Every track ordered by `sequence`, for one-shot renders.
    pub fn all_in_order(&self) -> Vec<TrackRequest> {
        let mut ordered: Vec<&TrackDescriptor> = self.entries.iter().collect();
        ordered.sort_by_key(|entry| entry.sequence);
        ordered.into_iter().map(|entry| self.request(entry)).collect()
    }

    fn request(&self, entry: &TrackDescriptor) -> TrackRequest {
        TrackRequest {
            id: entry.id,
            details: entry.details.clone(),
            analysis: entry.analysis.clone(),
            source: Box::new(DecodedFile::new(
                self.audio_path(&entry.filename),
                self.sample_rate,
                self.channels,
            )),
        }
    }

    fn audio_path(&self, filename: &str) -> PathBuf {
        let direct = self.root.join(filename);
        if direct.exists() {
            return direct;
        }
        let nested = self.root.join("audio").join(filename);
        if !nested.exists() {
            warn!("Audio for {} not found under {}", filename, self.root.display());
        }
        nested
    }
}

impl TrackSource for Catalog {
    fn acquire(&mut self, _wait: Duration) -> Result<Acquired, SourceError> {
        self.next_random().map(Acquired::Track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_descriptor(dir: &Path, id: u64) {
        write_sequenced(dir, id, 0);
    }

    fn write_sequenced(dir: &Path, id: u64, sequence: i64) {
        let descriptor = json!({
            "id": id,
            "sequence": sequence,
            "filename": format!("track{}.mp3", id),
            "details": {"artist": "Artist", "title": format!("Title {}", id), "xfade": 8},
            "analysis": {
                "segments": [{"start": 0.0, "duration": 1.0, "loudness_max": -10.0}],
                "loudness": -10.0,
                "duration": 1.0
            }
        });
        fs::write(dir.join(format!("{:03}.json", id)), descriptor.to_string()).unwrap();
    }

    #[test]
    fn loads_descriptors_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for id in [3, 1, 2] {
            write_descriptor(dir.path(), id);
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = Catalog::load(dir.path(), &RenderSettings::default()).unwrap();
        let ids: Vec<u64> = catalog.all_in_order().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(catalog.entries()[0].details.xfade, 8.0);
    }

    #[test]
    fn random_selection_avoids_immediate_repeat() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), 1);
        write_descriptor(dir.path(), 2);
        let mut catalog = Catalog::load(dir.path(), &RenderSettings::default())
            .unwrap()
            .with_seed(7);

        let mut last = catalog.next_random().unwrap().id;
        for _ in 0..20 {
            let next = catalog.next_random().unwrap().id;
            assert_ne!(next, last);
            last = next;
        }
    }

    #[test]
    fn random_selection_prefers_least_played() {
        let dir = tempfile::tempdir().unwrap();
        for id in 1..=4 {
            write_descriptor(dir.path(), id);
        }
        let mut catalog = Catalog::load(dir.path(), &RenderSettings::default())
            .unwrap()
            .with_seed(11);

        for round in 1..=3 {
            let mut picked: Vec<u64> = (0..4).map(|_| catalog.next_random().unwrap().id).collect();
            picked.sort();
            assert_eq!(picked, vec![1, 2, 3, 4]);
            assert!((1..=4).all(|id| catalog.plays(id) == round));
        }
    }

    #[test]
    fn one_shot_order_follows_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write_sequenced(dir.path(), 1, 3);
        write_sequenced(dir.path(), 2, 1);
        write_sequenced(dir.path(), 3, 2);
        write_sequenced(dir.path(), 4, 1);

        let catalog = Catalog::load(dir.path(), &RenderSettings::default()).unwrap();
        let ids: Vec<u64> = catalog.all_in_order().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
        assert_eq!(catalog.plays(1), 0);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Catalog::load(dir.path(), &RenderSettings::default()),
            Err(SourceError::Empty)
        ));
    }

    #[test]
    fn malformed_descriptor_names_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        match Catalog::load(dir.path(), &RenderSettings::default()) {
            Err(SourceError::Descriptor { path, .. }) => assert!(path.ends_with("bad.json")),
            other => panic!("unexpected result {:?}", other.err()),
        }
    }
}
