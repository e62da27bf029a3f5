//! Engine configuration.
//!
//! Every section deserializes with defaults so a partial JSON file only
//! needs to name the values it changes.

use serde::{Deserialize, Serialize};

/// Output sample rate expected by the transcoder.
pub const SAMPLE_RATE: u32 = 44_100;
/// Output channel count expected by the transcoder.
pub const CHANNELS: u16 = 2;
/// MPEG-1 Layer III frame sync prefix.
pub const MP3_FRAME_MARKER: [u8; 2] = [0xFF, 0xFB];

/// Top-level settings for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub mixer: MixerSettings,
    pub render: RenderSettings,
    pub broadcast: BroadcastSettings,
    pub transcoder: TranscoderSettings,
    pub status: StatusSettings,
}

impl EngineSettings {
    /// Parse settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Track lifecycle and transition parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// Seconds reserved for a transition; tracks shorter than twice this are rejected.
    pub transition_time: f64,
    /// Fade-in applied to the very first track of a stream, in seconds.
    pub initial_fade: f64,
    /// Fade-out applied by the final terminate action, in seconds.
    pub fade_out: f64,
    /// How often a blocking wait for input re-checks the stop flag.
    pub input_poll_ms: u64,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            transition_time: 30.0,
            initial_fade: 2.0,
            fade_out: 3.0,
            input_poll_ms: 250,
        }
    }
}

/// PCM rendering and pacing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub sample_rate: u32,
    pub channels: u16,
    /// Hold output to real-time rate. Disabled for one-shot renders.
    pub pace: bool,
    /// Head start given to the watermark at startup, in seconds.
    pub initial_lead: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            pace: true,
            initial_lead: 10.0,
        }
    }
}

/// Ring buffer and listener parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    /// Minimum bytes accumulated before a chunk may be sealed.
    pub chunk_threshold: usize,
    /// Number of sealed chunks retained.
    pub capacity: usize,
    pub frame_marker: [u8; 2],
    /// Size of each read from the transcoder output.
    pub read_size: usize,
    /// How many chunks behind the frontier a new listener starts.
    pub listener_lead: u64,
    pub listener_poll_ms: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            chunk_threshold: 1024 * 1024,
            capacity: 32,
            frame_marker: MP3_FRAME_MARKER,
            read_size: 4096,
            listener_lead: 1,
            listener_poll_ms: 1000,
        }
    }
}

/// External transcoder command line.
///
/// `{sample_rate}` and `{channels}` in `args` are replaced with the render
/// settings when the process is spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderSettings {
    pub program: String,
    pub args: Vec<String>,
}

impl TranscoderSettings {
    /// Arguments with the PCM format placeholders filled in from `render`.
    pub fn command_args(&self, render: &RenderSettings) -> Vec<String> {
        let sample_rate = render.sample_rate.to_string();
        let channels = render.channels.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{sample_rate}", &sample_rate)
                    .replace("{channels}", &channels)
            })
            .collect()
    }
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        let args = [
            "-hide_banner",
            "-loglevel",
            "warning",
            "-ac",
            "{channels}",
            "-f",
            "s16le",
            "-ar",
            "{sample_rate}",
            "-i",
            "-",
            "-f",
            "mp3",
            "-",
        ];
        Self {
            program: "ffmpeg".to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

/// Status reporting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    /// Number of recent metadata records and track history entries kept.
    pub history: usize,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self { history: 64 }
    }
}
