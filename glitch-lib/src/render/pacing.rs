//! Real-time pacing of rendered audio.
//!
//! Rendering runs ahead of wall-clock time by at most a fixed lead. After each
//! action the watermark advances by the audio's duration and the render thread
//! sleeps until wall-clock time catches up with it.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Cancellable one-way signal used to abort pacing waits.
#[derive(Debug, Default)]
pub struct Shutdown {
    triggered: Mutex<bool>,
    condvar: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal and wake every waiter.
    pub fn trigger(&self) {
        *self.triggered.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock().unwrap()
    }

    /// Sleep for `timeout` or until triggered. Returns `true` when triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.triggered.lock().unwrap();
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap();
        *guard
    }
}

/// Seconds since the Unix epoch as a float.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// Tracks how far rendering has run ahead of wall-clock time.
#[derive(Debug, Clone)]
pub struct Pacer {
    rendered_until: f64,
    enabled: bool,
}

impl Pacer {
    /// Start the watermark `initial_lead` seconds in the past.
    pub fn new(initial_lead: f64, enabled: bool) -> Self {
        Self::starting_at(unix_now() - initial_lead, enabled)
    }

    pub fn starting_at(rendered_until: f64, enabled: bool) -> Self {
        Self {
            rendered_until,
            enabled,
        }
    }

    /// Wall-clock time (Unix seconds) up to which audio has been rendered.
    pub fn rendered_until(&self) -> f64 {
        self.rendered_until
    }

    /// Account for `seconds` of newly rendered audio.
    pub fn advance(&mut self, seconds: f64) -> f64 {
        self.rendered_until += seconds.max(0.0);
        self.rendered_until
    }

    /// How long to sleep before rendering more. Zero when unpaced or behind.
    pub fn delay(&self, now: f64) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let ahead = self.rendered_until - now;
        if ahead > 0.0 {
            Duration::from_secs_f64(ahead)
        } else {
            Duration::ZERO
        }
    }

    /// Sleep until wall-clock time reaches the watermark.
    ///
    /// Returns `false` if `shutdown` fired during the wait.
    pub fn wait(&self, shutdown: &Shutdown) -> bool {
        let delay = self.delay(unix_now());
        if delay.is_zero() {
            return !shutdown.is_triggered();
        }
        log::debug!("Sleeping for {:.3}s.", delay.as_secs_f64());
        !shutdown.wait_timeout(delay)
    }
}
