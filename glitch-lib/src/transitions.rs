//! Transition planning between two analysed tracks.
//!
//! All functions here are pure: they read analysis data and return timing
//! parameters or render actions. The position reached inside the incoming
//! track is returned to the caller instead of being kept in shared state.

use std::sync::Arc;

use crate::analysis::{Analysis, Pulse, Segment};
use crate::error::TrackError;
use crate::mixer::action::{Fade, FadeDirection, RenderAction};
use crate::track::{Track, TrackDetails};

/// Segments at or below this peak loudness (dB) are treated as silence.
pub const AUDIBLE_THRESHOLD_DB: f64 = -60.0;
/// Tatums averaged for the local tempo estimate.
const TEMPO_TATUMS: usize = 16;
/// Segments averaged when too few tatums exist.
const TEMPO_SEGMENTS: usize = 8;
/// Beats averaged for the lead-in estimate.
const LEAD_IN_BEATS: usize = 8;

/// First and last audible instants of a track, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudibleBounds {
    /// Start of the first segment above the threshold.
    pub first_viable: f64,
    /// End of the last segment above the threshold.
    pub last_viable: f64,
}

/// Timing parameters for leaving a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionPlan {
    /// Solo-playback anchor: start of the halfway segment.
    pub playback_start: f64,
    /// Solo playback length measured from the anchor.
    pub playback_duration: f64,
    /// Beat-snapped start of the crossfade window.
    pub mix_start: f64,
    /// Length of the crossfade window.
    pub mix_duration: f64,
    /// Local tempo estimate used for snapping.
    pub avg_beat_duration: f64,
}

impl TransitionPlan {
    pub fn playback_end(&self) -> f64 {
        self.playback_start + self.playback_duration
    }
}

/// Locate the audible span of a track.
///
/// # Errors
/// Returns [`TrackError::Invalid`] when no segment is louder than
/// [`AUDIBLE_THRESHOLD_DB`].
pub fn audible_bounds(analysis: &Analysis) -> Result<AudibleBounds, TrackError> {
    let audible = |segment: &&Segment| segment.loudness_max > AUDIBLE_THRESHOLD_DB;
    let last = analysis.segments.iter().rev().find(audible);
    let first = analysis.segments.iter().find(audible);
    match (first, last) {
        (Some(first), Some(last)) => Ok(AudibleBounds {
            first_viable: first.start,
            last_viable: last.start + last.duration,
        }),
        _ => Err(TrackError::Invalid("no audible content".to_string())),
    }
}

/// Average pulse length near the end of a track.
///
/// Uses the last 16 tatums, or the last 8 segments when fewer tatums exist.
pub fn local_tempo(analysis: &Analysis) -> f64 {
    if analysis.tatums.len() >= TEMPO_TATUMS {
        let tail = &analysis.tatums[analysis.tatums.len() - TEMPO_TATUMS..];
        return mean(tail.iter().map(|tatum| tatum.duration));
    }
    let count = analysis.segments.len().min(TEMPO_SEGMENTS);
    let tail = &analysis.segments[analysis.segments.len() - count..];
    mean(tail.iter().map(|segment| segment.duration))
}

/// Offset of the implied beat grid origin before the first detected beat.
///
/// The result is always `<= 0`.
pub fn lead_in(analysis: &Analysis) -> f64 {
    let (earliest, average) = match analysis.beats.first() {
        Some(first) => {
            let count = analysis.beats.len().min(LEAD_IN_BEATS);
            let average = mean(analysis.beats[..count].iter().map(|beat| beat.duration));
            (first.start, average)
        }
        None => match analysis.segments.first() {
            Some(segment) => (segment.start, segment.duration),
            None => return 0.0,
        },
    };

    if earliest <= 0.0 {
        return earliest;
    }
    if average <= 0.0 {
        return 0.0;
    }
    let steps = (earliest / average).ceil();
    (earliest - steps * average).min(0.0)
}

/// Compute how to leave a track, overlapping `beats_to_mix` beats with its successor.
///
/// # Errors
/// Returns [`TrackError::Invalid`] when the track has no audible content.
pub fn plan_exit(analysis: &Analysis, beats_to_mix: f64) -> Result<TransitionPlan, TrackError> {
    let bounds = audible_bounds(analysis)?;
    let avg_beat_duration = local_tempo(analysis);

    let halfway = &analysis.segments[analysis.segments.len() / 2];
    let playback_start = halfway.start;

    let (playback_end, from_end) = if beats_to_mix > 0.0 {
        (
            bounds.last_viable - avg_beat_duration * beats_to_mix,
            (beats_to_mix as usize).max(1),
        )
    } else {
        (bounds.last_viable, 1)
    };

    let anchor = pulse_from_end(&analysis.tatums, from_end)
        .map(|tatum| tatum.start)
        .unwrap_or_else(|| segment_from_end(&analysis.segments, from_end).start);
    let mix_start = snap_forward(anchor, playback_end, avg_beat_duration);

    Ok(TransitionPlan {
        playback_start,
        playback_duration: playback_end - playback_start,
        mix_start,
        mix_duration: bounds.last_viable - mix_start,
        avg_beat_duration,
    })
}

/// Reject a track whose out-trim would consume its whole solo playback.
pub fn check_trims(analysis: &Analysis, details: &TrackDetails) -> Result<TransitionPlan, TrackError> {
    let plan = plan_exit(analysis, details.xfade)?;
    if plan.playback_duration - details.otrim < 0.0 {
        return Err(TrackError::Invalid(format!(
            "track too short: {:.2}s of playback cannot lose {:.2}s of out-trim",
            plan.playback_duration, details.otrim
        )));
    }
    Ok(plan)
}

/// Inputs for a transition from the current head to the next track.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    pub outgoing: &'a Track,
    pub incoming: &'a Track,
    /// Position reached inside `outgoing` by earlier actions.
    pub stream_position: f64,
    /// Whether the solo playback of `outgoing` still has to be emitted.
    pub include_playback: bool,
    /// Upper bound on the solo playback length.
    pub stay_time: f64,
    /// Length of the incoming track's solo lead when crossfading is disabled.
    pub transition_time: f64,
}

/// Actions for one transition plus the position reached in the incoming track.
#[derive(Debug, Clone)]
pub struct Transition {
    pub plan: TransitionPlan,
    pub actions: Vec<RenderAction>,
    pub next_position: f64,
}

/// Build the render actions that move from `outgoing` into `incoming`.
///
/// With `xfade == 0` this yields two back-to-back playbacks. Otherwise the
/// outgoing solo playback is followed by a crossfade that starts on the
/// beat-snapped mix point and enters the incoming track at its first audible
/// segment.
pub fn make_transition(request: &TransitionRequest<'_>) -> Result<Transition, TrackError> {
    let outgoing = request.outgoing;
    let incoming = request.incoming;
    let out_details = outgoing.details();
    let in_details = incoming.details();

    let plan = check_trims(outgoing.analysis()?, out_details)?;
    let incoming_analysis = incoming.analysis()?;
    let incoming_start = audible_bounds(incoming_analysis)?.first_viable + in_details.itrim;

    let mut actions = Vec::with_capacity(2);

    if out_details.xfade <= 0.0 {
        if request.include_playback {
            let duration = (plan.playback_duration - out_details.otrim).min(request.stay_time);
            actions.push(playback(outgoing, request.stream_position, duration, None));
        }
        actions.push(playback(incoming, incoming_start, request.transition_time, None));
        return Ok(Transition {
            plan,
            actions,
            next_position: incoming_start + request.transition_time,
        });
    }

    let offset = lead_in(incoming_analysis);
    if request.include_playback {
        let duration =
            (plan.playback_duration - out_details.otrim - offset).min(request.stay_time);
        actions.push(playback(outgoing, request.stream_position, duration, None));
    }
    actions.push(RenderAction::Crossfade {
        outgoing: Arc::clone(outgoing.handle()),
        incoming: Arc::clone(incoming.handle()),
        start_out: plan.mix_start - offset,
        start_in: incoming_start,
        duration: plan.mix_duration,
    });

    Ok(Transition {
        plan,
        actions,
        next_position: incoming_start + plan.mix_duration,
    })
}

/// Solo playback of the first track of a stream, faded in.
pub fn initial_playback(
    request: &TransitionRequest<'_>,
    fade_in: f64,
) -> Result<RenderAction, TrackError> {
    let transition = make_transition(&TransitionRequest {
        include_playback: true,
        ..*request
    })?;
    match transition.actions.into_iter().next() {
        Some(RenderAction::Playback {
            track,
            start,
            duration,
            ..
        }) => Ok(RenderAction::Playback {
            track,
            start,
            duration,
            fade: Some(Fade::new(FadeDirection::In, fade_in)),
        }),
        _ => Err(TrackError::Invalid("transition produced no playback".to_string())),
    }
}

/// Final action for a track with no successor: play out its remainder and fade to silence.
pub fn terminate(
    track: &Track,
    stream_position: f64,
    fade_out: f64,
) -> Result<RenderAction, TrackError> {
    let bounds = audible_bounds(track.analysis()?)?;
    let start = stream_position.max(0.0);
    let duration = (bounds.last_viable - start).max(0.0);
    Ok(RenderAction::Terminate {
        track: Arc::clone(track.handle()),
        start,
        duration,
        fade: Fade::new(FadeDirection::Out, fade_out.min(duration)),
    })
}

fn playback(track: &Track, start: f64, duration: f64, fade: Option<Fade>) -> RenderAction {
    RenderAction::Playback {
        track: Arc::clone(track.handle()),
        start,
        duration: duration.max(0.0),
        fade,
    }
}

fn snap_forward(anchor: f64, target: f64, step: f64) -> f64 {
    if anchor >= target || step <= 0.0 {
        return anchor;
    }
    let steps = ((target - anchor) / step).ceil();
    let mut snapped = anchor + steps * step;
    // Guard against rounding leaving the candidate a hair short.
    while snapped < target {
        snapped += step;
    }
    snapped
}

fn pulse_from_end(pulses: &[Pulse], from_end: usize) -> Option<&Pulse> {
    if pulses.is_empty() {
        return None;
    }
    pulses.get(pulses.len().saturating_sub(from_end))
}

fn segment_from_end(segments: &[Segment], from_end: usize) -> &Segment {
    &segments[segments.len().saturating_sub(from_end)]
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
