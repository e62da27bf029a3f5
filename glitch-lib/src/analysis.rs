//! Rhythm and loudness analysis consumed by the transition planner.
//!
//! Analysis is computed elsewhere and arrives as plain data: segments with
//! their loudness peak, beats, tatums, and track-level loudness/duration.
//! Nothing in this crate performs beat detection.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// A contiguous grain of audio with its peak loudness in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub duration: f64,
    #[serde(alias = "loudnessMax")]
    pub loudness_max: f64,
}

/// A rhythmic pulse marker (beat or tatum).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub start: f64,
    pub duration: f64,
}

impl Pulse {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }
}

/// Full analysis payload for one track. Times are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub beats: Vec<Pulse>,
    #[serde(default)]
    pub tatums: Vec<Pulse>,
    /// Overall loudness in dB.
    pub loudness: f64,
    /// Track duration in seconds.
    pub duration: f64,
}

impl Analysis {
    /// Check the payload for values that would poison the timing arithmetic.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(AnalysisError::BadDuration(self.duration));
        }
        if self.segments.is_empty() {
            return Err(AnalysisError::NoSegments);
        }
        for (index, segment) in self.segments.iter().enumerate() {
            check_timing("segment", index, segment.start, segment.duration)?;
            if !segment.loudness_max.is_finite() {
                return Err(AnalysisError::BadLoudness(index));
            }
        }
        for (index, beat) in self.beats.iter().enumerate() {
            check_timing("beat", index, beat.start, beat.duration)?;
        }
        for (index, tatum) in self.tatums.iter().enumerate() {
            check_timing("tatum", index, tatum.start, tatum.duration)?;
        }
        Ok(())
    }
}

fn check_timing(
    kind: &'static str,
    index: usize,
    start: f64,
    duration: f64,
) -> Result<(), AnalysisError> {
    if start.is_finite() && duration.is_finite() && start >= 0.0 && duration >= 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::BadTiming {
            kind,
            index,
            start,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> Analysis {
        Analysis {
            segments: vec![Segment {
                start: 0.0,
                duration: 1.0,
                loudness_max: -10.0,
            }],
            beats: vec![Pulse::new(0.0, 0.5)],
            tatums: vec![],
            loudness: -9.0,
            duration: 1.0,
        }
    }

    #[test]
    fn accepts_well_formed_analysis() {
        assert_eq!(analysis().validate(), Ok(()));
    }

    #[test]
    fn rejects_missing_segments() {
        let mut analysis = analysis();
        analysis.segments.clear();
        assert_eq!(analysis.validate(), Err(AnalysisError::NoSegments));
    }

    #[test]
    fn rejects_negative_beat_timing() {
        let mut analysis = analysis();
        analysis.beats.push(Pulse::new(-1.0, 0.5));
        assert!(matches!(
            analysis.validate(),
            Err(AnalysisError::BadTiming { kind: "beat", index: 1, .. })
        ));
    }

    #[test]
    fn deserializes_camel_case_loudness() {
        let json = r#"{
            "segments": [{"start": 0.0, "duration": 0.5, "loudnessMax": -12.5}],
            "loudness": -9.0,
            "duration": 0.5
        }"#;
        let analysis: Analysis = serde_json::from_str(json).expect("deserialize analysis");
        assert_eq!(analysis.segments[0].loudness_max, -12.5);
        assert!(analysis.beats.is_empty());
        assert!(analysis.tatums.is_empty());
    }
}
