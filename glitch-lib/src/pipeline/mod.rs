//! Wiring of mixer, renderer, transcoder and broadcast ring.
//!
//! Two threads run while the engine is started:
//!
//! - the render thread pulls batches from the mixer, renders them, writes the
//!   PCM to the transcoder and paces itself to real time;
//! - the reader thread drains the transcoder output into the ring buffer (or a
//!   file for one-shot renders).

mod driver;
pub mod transcoder;

use log::{error, info, warn};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::broadcast::{ChunkRing, FrameChunker};
use crate::error::{PipelineError, SourceError, TrackError};
use crate::mixer::{inbox, InboxSender, Mixer, MixerHandle, TrackSource};
use crate::render::{Pacer, Renderer, Shutdown};
use crate::settings::{BroadcastSettings, EngineSettings};
use crate::status::StreamStatus;
use crate::track::TrackRequest;

use driver::RenderLoop;
pub use transcoder::Transcoder;

/// Where the transcoder's output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Chunked into the ring buffer for listeners.
    Broadcast,
    /// Written to a file, via a `.partial` sibling renamed on success.
    File(PathBuf),
}

/// Stop controls detached from the [`Engine`].
#[derive(Clone)]
pub struct EngineControl {
    mixer: MixerHandle,
    shutdown: Arc<Shutdown>,
}

impl EngineControl {
    /// Graceful stop: the current track fades out and the stream ends.
    pub fn stop(&self) {
        info!("Stop requested.");
        self.mixer.stop();
    }

    /// Immediate stop: aborts pacing waits and stops after the current action.
    pub fn shutdown(&self) {
        info!("Shutdown requested.");
        self.mixer.stop();
        self.shutdown.trigger();
    }
}

struct Running {
    render: JoinHandle<Result<(), PipelineError>>,
    reader: JoinHandle<Result<(), PipelineError>>,
    transcoder: Transcoder,
    output: Output,
}

/// The broadcast engine.
pub struct Engine {
    settings: EngineSettings,
    mixer: Option<Mixer>,
    handle: MixerHandle,
    inbox: Option<InboxSender>,
    ring: Arc<ChunkRing>,
    status: Arc<StreamStatus>,
    shutdown: Arc<Shutdown>,
    running: Option<Running>,
}

impl Engine {
    /// Engine fed through its own inbox; see [`Engine::enqueue_all`].
    pub fn new(settings: EngineSettings) -> Self {
        let (sender, receiver) = inbox();
        let mut engine = Self::with_source(settings, Box::new(receiver));
        engine.inbox = Some(sender);
        engine
    }

    /// Engine that pulls tracks from `source` whenever its queue runs low.
    pub fn with_source(settings: EngineSettings, source: Box<dyn TrackSource>) -> Self {
        let mixer = Mixer::new(settings.mixer.clone(), source);
        let handle = mixer.handle();
        Self {
            ring: Arc::new(ChunkRing::new(settings.broadcast.capacity)),
            status: Arc::new(StreamStatus::new(settings.status.history)),
            shutdown: Arc::new(Shutdown::new()),
            settings,
            mixer: Some(mixer),
            handle,
            inbox: None,
            running: None,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn ring(&self) -> Arc<ChunkRing> {
        Arc::clone(&self.ring)
    }

    pub fn status(&self) -> Arc<StreamStatus> {
        Arc::clone(&self.status)
    }

    pub fn mixer(&self) -> MixerHandle {
        self.handle.clone()
    }

    /// Validate and queue a track directly, bypassing the input source.
    pub fn add_track(&self, request: TrackRequest) -> Result<(), TrackError> {
        self.handle.add_track(request)
    }

    /// Queue every request in order, then mark the input finished.
    ///
    /// Only available on engines built with [`Engine::new`].
    pub fn enqueue_all(
        &self,
        requests: impl IntoIterator<Item = TrackRequest>,
    ) -> Result<(), SourceError> {
        match &self.inbox {
            Some(sender) => sender.enqueue_all(requests),
            None => Err(SourceError::Closed),
        }
    }

    /// Spawn the transcoder and the render and reader threads.
    pub fn start(&mut self, output: Output) -> Result<(), PipelineError> {
        if self.mixer.is_none() {
            return Err(PipelineError::AlreadyStarted);
        }
        let (transcoder, stdin, stdout) =
            Transcoder::spawn(&self.settings.transcoder, &self.settings.render)?;
        let mixer = self.mixer.take().ok_or(PipelineError::AlreadyStarted)?;

        let render_settings = &self.settings.render;
        let render_loop = RenderLoop {
            mixer,
            renderer: Renderer::new(render_settings),
            pacer: Pacer::new(render_settings.initial_lead, render_settings.pace),
            sink: self.status.clone(),
            shutdown: self.shutdown.clone(),
        };
        let render = thread::Builder::new()
            .name("glitch-render".to_string())
            .spawn(move || {
                let mut stdin = stdin;
                let result = render_loop.run(&mut stdin);
                // Dropping stdin lets the transcoder flush and exit.
                drop(stdin);
                result
            })?;

        let reader = {
            let ring = self.ring.clone();
            let broadcast = self.settings.broadcast.clone();
            let output = output.clone();
            thread::Builder::new()
                .name("glitch-reader".to_string())
                .spawn(move || match output {
                    Output::Broadcast => {
                        pump(stdout, &broadcast, &ring)?;
                        Ok(())
                    }
                    Output::File(path) => {
                        copy_to_file(stdout, &partial_path(&path))?;
                        Ok(())
                    }
                })?
        };

        info!("Engine started ({:?}).", output);
        self.running = Some(Running {
            render,
            reader,
            transcoder,
            output,
        });
        Ok(())
    }

    /// Cloneable stop controls usable from other threads.
    pub fn control(&self) -> EngineControl {
        EngineControl {
            mixer: self.handle.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn stop(&self) {
        self.control().stop();
    }

    pub fn shutdown(&self) {
        self.control().shutdown();
    }

    /// Wait for the threads and the transcoder to finish.
    ///
    /// For file output the `.partial` file is renamed into place only when
    /// every stage succeeded.
    pub fn wait(&mut self) -> Result<(), PipelineError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        let render = join(running.render, "render");
        let reader = join(running.reader, "reader");
        let transcoder = running.transcoder.wait();

        let result = render.and(reader).and(transcoder);
        if let Output::File(path) = &running.output {
            let partial = partial_path(path);
            match &result {
                Ok(()) => {
                    fs::rename(&partial, path)?;
                    info!("Wrote {}", path.display());
                }
                Err(err) => {
                    warn!("Render failed, leaving {}: {}", partial.display(), err);
                }
            }
        }
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.running.is_some() {
            self.shutdown();
            if let Err(err) = self.wait() {
                error!("Engine stopped with an error: {}", err);
            }
        }
    }
}

fn join(
    handle: JoinHandle<Result<(), PipelineError>>,
    name: &str,
) -> Result<(), PipelineError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(PipelineError::Panicked(name.to_string())))
}

/// Drain `input` into `ring`, sealing chunks at frame boundaries.
///
/// The remainder is sealed and the ring closed once `input` reaches EOF.
pub fn pump(
    mut input: impl Read,
    settings: &BroadcastSettings,
    ring: &ChunkRing,
) -> io::Result<u64> {
    let mut chunker = FrameChunker::new(settings.frame_marker, settings.chunk_threshold);
    let mut buffer = vec![0_u8; settings.read_size.max(1)];
    let mut total = 0_u64;

    let result = loop {
        match input.read(&mut buffer) {
            Ok(0) => break Ok(total),
            Ok(read) => {
                total += read as u64;
                for chunk in chunker.push(&buffer[..read]) {
                    ring.append(chunk);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => break Err(err),
        }
    };

    if let Some(rest) = chunker.finish() {
        ring.append(rest);
    }
    ring.close();
    info!("Transcoder output ended after {} bytes.", total);
    result
}

fn copy_to_file(mut input: impl Read, path: &Path) -> io::Result<u64> {
    let mut file = BufWriter::new(File::create(path)?);
    let written = io::copy(&mut input, &mut file)?;
    file.flush()?;
    Ok(written)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_seals_remainder_and_closes() {
        let settings = BroadcastSettings {
            chunk_threshold: 4,
            read_size: 3,
            ..BroadcastSettings::default()
        };
        let ring = ChunkRing::new(8);
        let data: Vec<u8> = [[0xFF, 0xFB, 1, 2, 3, 4]; 3].concat();
        assert_eq!(pump(&data[..], &settings, &ring).unwrap(), 18);

        let chunks = ring.snapshot();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.bytes.starts_with(&[0xFF, 0xFB])));
        assert!(ring.is_closed());
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/out.mp3")),
            PathBuf::from("/tmp/out.mp3.partial")
        );
    }

    #[test]
    fn enqueue_requires_inbox() {
        let (_sender, receiver) = inbox();
        let engine = Engine::with_source(EngineSettings::default(), Box::new(receiver));
        assert!(matches!(engine.enqueue_all(Vec::new()), Err(SourceError::Closed)));
    }

    #[test]
    fn second_start_is_rejected() {
        let mut engine = Engine::new(passthrough_settings());
        engine.mixer.take();
        assert!(matches!(
            engine.start(Output::Broadcast),
            Err(PipelineError::AlreadyStarted)
        ));
    }

    #[test]
    fn failed_spawn_keeps_engine_startable() {
        let mut settings = passthrough_settings();
        settings.transcoder.program = "definitely-not-an-encoder".to_string();
        let mut engine = Engine::new(settings);

        for _ in 0..2 {
            assert!(matches!(
                engine.start(Output::Broadcast),
                Err(PipelineError::Spawn { .. })
            ));
        }
        assert!(engine.mixer.is_some());
    }

    fn passthrough_settings() -> EngineSettings {
        let mut settings = EngineSettings::default();
        settings.mixer.transition_time = 5.0;
        settings.mixer.input_poll_ms = 10;
        settings.render.pace = false;
        settings.broadcast.chunk_threshold = 64 * 1024;
        settings.transcoder.program = "cat".to_string();
        settings.transcoder.args = Vec::new();
        settings
    }

    #[cfg(unix)]
    mod end_to_end {
        use super::*;
        use crate::analysis::{Analysis, Pulse, Segment};
        use crate::mixer::ActionKind;
        use crate::track::{MemorySource, TrackDetails};

        fn request(id: u64, seconds: usize) -> TrackRequest {
            TrackRequest {
                id,
                details: TrackDetails {
                    title: format!("Track {}", id),
                    xfade: 4.0,
                    ..TrackDetails::default()
                },
                analysis: Analysis {
                    segments: (0..seconds)
                        .map(|i| Segment {
                            start: i as f64,
                            duration: 1.0,
                            loudness_max: -10.0,
                        })
                        .collect(),
                    beats: (0..seconds * 2)
                        .map(|i| Pulse::new(i as f64 * 0.5, 0.5))
                        .collect(),
                    tatums: Vec::new(),
                    loudness: -10.0,
                    duration: seconds as f64,
                },
                source: Box::new(MemorySource::constant(0.1, 2, seconds * 44_100)),
            }
        }

        fn rendered_bytes(status: &StreamStatus) -> usize {
            status.records().iter().map(|record| record.samples * 4).sum()
        }

        #[test]
        fn one_shot_render_reaches_listeners() {
            let mut engine = Engine::new(passthrough_settings());
            engine
                .enqueue_all(vec![request(1, 12), request(2, 12)])
                .unwrap();
            engine.start(Output::Broadcast).unwrap();
            engine.wait().unwrap();

            let status = engine.status();
            let kinds: Vec<ActionKind> = status.records().iter().map(|r| r.action).collect();
            assert_eq!(
                kinds,
                vec![ActionKind::Playback, ActionKind::Crossfade, ActionKind::Terminate]
            );
            assert_eq!(status.tracks().len(), 1);
            assert_eq!(status.tracks()[0].id, 1);

            let ring = engine.ring();
            assert!(ring.is_closed());
            let streamed: usize = ring.snapshot().iter().map(|chunk| chunk.bytes.len()).sum();
            assert_eq!(streamed, rendered_bytes(&status));
            assert_eq!(streamed, 14 * 44_100 * 4);
        }

        #[test]
        fn one_shot_render_to_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("program.raw");

            let mut engine = Engine::new(passthrough_settings());
            engine
                .enqueue_all(vec![request(1, 12), request(2, 12)])
                .unwrap();
            engine.start(Output::File(path.clone())).unwrap();
            engine.wait().unwrap();

            let written = fs::metadata(&path).unwrap().len() as usize;
            assert_eq!(written, rendered_bytes(&engine.status()));
            assert!(!partial_path(&path).exists());
        }

        #[test]
        fn stop_fades_out_while_waiting_for_input() {
            let mut engine = Engine::new(passthrough_settings());
            engine.start(Output::Broadcast).unwrap();
            engine.add_track(request(1, 12)).unwrap();
            engine.add_track(request(2, 12)).unwrap();

            let status = engine.status();
            while status.records().len() < 2 {
                thread::sleep(std::time::Duration::from_millis(5));
            }
            engine.stop();
            engine.wait().unwrap();

            let records = status.records();
            assert_eq!(records.len(), 3);
            assert_eq!(records[2].action, ActionKind::Terminate);
            assert_eq!(records[2].tracks[0].id, 2);
        }

        #[test]
        fn shutdown_interrupts_paced_render() {
            let mut settings = passthrough_settings();
            settings.render.pace = true;
            settings.render.initial_lead = 0.0;
            let mut engine = Engine::new(settings);
            engine
                .enqueue_all(vec![request(1, 12), request(2, 12)])
                .unwrap();
            engine.start(Output::Broadcast).unwrap();

            let status = engine.status();
            while status.records().is_empty() {
                thread::sleep(std::time::Duration::from_millis(5));
            }
            let started = std::time::Instant::now();
            engine.shutdown();
            engine.wait().unwrap();

            assert!(started.elapsed() < std::time::Duration::from_secs(5));
            assert_eq!(status.records().len(), 1);
        }
    }
}
