//! Track queue and the batch-producing mixer loop.
//!
//! The mixer keeps an ordered queue of validated tracks. Each call to
//! [`Mixer::next_batch`] advances its state machine by one step:
//!
//! - **Priming**: pull tracks from the input until two are queued, then emit
//!   the faded-in solo playback of the first.
//! - **Steady**: plan the transition from the head to the next track, emit it,
//!   and drop the head.
//! - **Draining**: one track left; block on the input (polling the stop flag)
//!   until another arrives, the input ends, or a stop is requested.
//! - **Stopping**: emit a single terminate for the current track.
//! - **Done**: no further batches.

pub mod action;
pub mod input;

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::{MixerError, TrackError};
use crate::settings::MixerSettings;
use crate::track::{Track, TrackRequest};
use crate::transitions::{self, TransitionRequest};

pub use action::{ActionBatch, ActionKind, Fade, FadeDirection, MetadataRecord, RenderAction, TrackSpan};
pub use input::{inbox, Acquired, InboxSender, TrackInbox, TrackSource};

struct MixerShared {
    tracks: Mutex<VecDeque<Track>>,
    stop: AtomicBool,
    transition_time: f64,
}

/// Cloneable control surface for a running mixer.
#[derive(Clone)]
pub struct MixerHandle {
    shared: Arc<MixerShared>,
}

impl MixerHandle {
    fn new(transition_time: f64) -> Self {
        Self {
            shared: Arc::new(MixerShared {
                tracks: Mutex::new(VecDeque::new()),
                stop: AtomicBool::new(false),
                transition_time,
            }),
        }
    }

    /// Validate a track and append it to the queue.
    ///
    /// # Errors
    /// Returns the validation error; the queue is left untouched.
    pub fn add_track(&self, request: TrackRequest) -> Result<(), TrackError> {
        let track = Track::prepare(request, self.shared.transition_time)?;
        debug!("queued track {} (gain {:.3})", track.id(), track.gain());
        self.shared.tracks.lock().unwrap().push_back(track);
        Ok(())
    }

    /// Request a graceful stop: the current track is faded out and the
    /// mixer finishes.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.shared.tracks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lifecycle phase of a [`Mixer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerPhase {
    Priming,
    Steady,
    Draining,
    Stopping,
    Done,
}

/// Produces [`ActionBatch`]es from a queue of tracks.
pub struct Mixer {
    handle: MixerHandle,
    source: Box<dyn TrackSource>,
    settings: MixerSettings,
    phase: MixerPhase,
    /// Position in the head track up to which audio has been emitted.
    cursor: f64,
    /// Whether the head's solo playback has already been emitted.
    solo_emitted: bool,
    /// Whether the head has produced any audio yet.
    head_started: bool,
    input_ended: bool,
    waiting: bool,
}

impl Mixer {
    pub fn new(settings: MixerSettings, source: Box<dyn TrackSource>) -> Self {
        Self {
            handle: MixerHandle::new(settings.transition_time),
            source,
            settings,
            phase: MixerPhase::Priming,
            cursor: 0.0,
            solo_emitted: false,
            head_started: false,
            input_ended: false,
            waiting: false,
        }
    }

    pub fn handle(&self) -> MixerHandle {
        self.handle.clone()
    }

    pub fn phase(&self) -> MixerPhase {
        self.phase
    }

    /// Advance the state machine until a batch is ready or the mixer finishes.
    ///
    /// Returns `Ok(None)` once the mixer is done. Invalid input tracks are
    /// logged and skipped; only planning failures surface as errors.
    pub fn next_batch(&mut self) -> Result<Option<ActionBatch>, MixerError> {
        loop {
            match self.phase {
                MixerPhase::Priming => {
                    if self.handle.is_stopped() {
                        info!("Stopped before any track was played.");
                        self.phase = MixerPhase::Done;
                    } else if self.handle.len() >= 2 {
                        let batch = self.initial_batch()?;
                        self.phase = MixerPhase::Steady;
                        return Ok(Some(batch));
                    } else if self.input_ended {
                        self.phase = if self.handle.is_empty() {
                            MixerPhase::Done
                        } else {
                            MixerPhase::Stopping
                        };
                    } else {
                        self.pull_track();
                    }
                }
                MixerPhase::Steady => {
                    if self.handle.is_stopped() {
                        self.phase = MixerPhase::Stopping;
                    } else if self.handle.len() >= 2 {
                        return self.transition_batch().map(Some);
                    } else {
                        self.phase = MixerPhase::Draining;
                    }
                }
                MixerPhase::Draining => {
                    if self.handle.is_stopped() || self.input_ended {
                        self.phase = MixerPhase::Stopping;
                    } else if self.handle.len() >= 2 {
                        self.phase = MixerPhase::Steady;
                    } else {
                        self.pull_track();
                    }
                }
                MixerPhase::Stopping => {
                    self.phase = MixerPhase::Done;
                    if let Some(batch) = self.terminate_batch()? {
                        return Ok(Some(batch));
                    }
                }
                MixerPhase::Done => return Ok(None),
            }
        }
    }

    /// Faded-in solo playback of the head, planned against the next track.
    fn initial_batch(&mut self) -> Result<ActionBatch, MixerError> {
        let tracks = self.handle.shared.tracks.lock().unwrap();
        let (head, next) = head_pair(&tracks)?;
        let action = transitions::initial_playback(
            &TransitionRequest {
                outgoing: head,
                incoming: next,
                stream_position: 0.0,
                include_playback: true,
                stay_time: head.duration().max(next.duration()),
                transition_time: self.settings.transition_time,
            },
            self.settings.initial_fade,
        )?;
        info!("Starting stream with track {}.", head.id());
        self.cursor = action.duration();
        self.solo_emitted = true;
        self.head_started = true;
        Ok(vec![action])
    }

    /// Transition from the head into the next track, then retire the head.
    fn transition_batch(&mut self) -> Result<ActionBatch, MixerError> {
        let mut tracks = self.handle.shared.tracks.lock().unwrap();
        let transition = {
            let (head, next) = head_pair(&tracks)?;
            info!("Mixing track {} into track {}.", head.id(), next.id());
            transitions::make_transition(&TransitionRequest {
                outgoing: head,
                incoming: next,
                stream_position: self.cursor,
                include_playback: !self.solo_emitted,
                stay_time: head.duration().max(next.duration()),
                transition_time: self.settings.transition_time,
            })?
        };

        if let Some(mut finished) = tracks.pop_front() {
            finished.release_analysis();
        }
        self.cursor = transition.next_position;
        self.solo_emitted = false;
        self.head_started = true;
        Ok(transition.actions)
    }

    fn terminate_batch(&mut self) -> Result<Option<ActionBatch>, MixerError> {
        let tracks = self.handle.shared.tracks.lock().unwrap();
        let Some(current) = tracks.front() else {
            return Ok(None);
        };
        if !self.head_started && self.handle.is_stopped() {
            return Ok(None);
        }
        info!("Fading out track {}.", current.id());
        let action = transitions::terminate(current, self.cursor, self.settings.fade_out)?;
        Ok(Some(vec![action]))
    }

    fn pull_track(&mut self) {
        if !self.waiting {
            info!("Waiting for a new track.");
            self.waiting = true;
        }
        let wait = Duration::from_millis(self.settings.input_poll_ms);
        match self.source.acquire(wait) {
            Ok(Acquired::Track(request)) => {
                let id = request.id;
                match self.handle.add_track(request) {
                    Ok(()) => {
                        info!("Got a new track: {}.", id);
                        self.waiting = false;
                    }
                    Err(TrackError::Invalid(reason)) => {
                        warn!("Track {} rejected, trying another: {}", id, reason);
                    }
                    Err(err) => {
                        error!("Could not add track {}: {}", id, err);
                    }
                }
            }
            Ok(Acquired::Ended) => {
                info!("Input ended.");
                self.input_ended = true;
            }
            Ok(Acquired::Idle) => {}
            Err(err) => {
                error!("Could not get a new track: {}", err);
                thread::sleep(wait);
            }
        }
    }
}

impl Iterator for Mixer {
    type Item = Result<ActionBatch, MixerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

fn head_pair(tracks: &VecDeque<Track>) -> Result<(&Track, &Track), MixerError> {
    match (tracks.front(), tracks.get(1)) {
        (Some(head), Some(next)) => Ok((head, next)),
        _ => Err(MixerError::Queue(format!(
            "expected two queued tracks, found {}",
            tracks.len()
        ))),
    }
}
