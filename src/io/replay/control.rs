// src/io/replay/control.rs
//
// Playback control for recorded sessions.
//
// The virtual clock maps wall time onto recording time:
//
//   elapsed(now) = base + (now - origin - paused) * speed
//
// `origin` is re-anchored on start, seek, loop and speed changes, so a jump
// never rewrites the spacing of the entries after it. Time spent paused is
// accumulated in `paused` and excluded from elapsed time.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Playback state machine: Stopped -> Playing <-> Paused -> Stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "STOPPED",
            PlaybackState::Playing => "PLAYING",
            PlaybackState::Paused => "PAUSED",
        }
    }
}

/// Virtual clock plus pacing settings.
#[derive(Clone, Debug)]
pub struct PlaybackControl {
    state: PlaybackState,
    /// Playback speed multiplier (1.0 = realtime)
    speed: f64,
    /// Speed 0 disables pacing (deliver as fast as polled)
    pacing_enabled: bool,
    origin: Instant,
    /// Recording seconds at `origin`
    base: f64,
    paused: Duration,
    pause_started: Option<Instant>,
}

impl PlaybackControl {
    /// Create a stopped control with the given initial speed.
    pub fn new(initial_speed: f64, now: Instant) -> Self {
        let pacing_enabled = initial_speed > 0.0;
        Self {
            state: PlaybackState::Stopped,
            speed: if pacing_enabled { initial_speed } else { 1.0 },
            pacing_enabled,
            origin: now,
            base: 0.0,
            paused: Duration::ZERO,
            pause_started: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    /// Read the current playback speed
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Check if pacing is enabled
    pub fn is_pacing_enabled(&self) -> bool {
        self.pacing_enabled
    }

    /// Set playback speed. Returns error if speed is negative.
    /// Speed of 0 disables pacing; the clock is re-anchored so already
    /// elapsed recording time is kept.
    pub fn set_speed(&mut self, speed: f64, now: Instant) -> Result<(), String> {
        if speed < 0.0 {
            return Err("Speed cannot be negative".to_string());
        }
        let elapsed = self.elapsed(now);
        if speed == 0.0 {
            self.pacing_enabled = false;
        } else {
            self.pacing_enabled = true;
            self.speed = speed;
        }
        self.anchor(elapsed, now);
        Ok(())
    }

    /// Point the clock at `recording_secs` as of `now`.
    pub fn anchor(&mut self, recording_secs: f64, now: Instant) {
        self.origin = now;
        self.base = recording_secs;
        self.paused = Duration::ZERO;
        if self.pause_started.is_some() {
            self.pause_started = Some(now);
        }
    }

    /// Begin accounting a pause. No-op unless playing.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        self.state = PlaybackState::Paused;
        self.pause_started = Some(now);
        true
    }

    /// End a pause, excluding its duration from elapsed time.
    pub fn unpause(&mut self, now: Instant) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        if let Some(started) = self.pause_started.take() {
            self.paused += now.saturating_duration_since(started);
        }
        self.state = PlaybackState::Playing;
        true
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.pause_started = None;
    }

    /// Recording seconds elapsed at `now`. Frozen while paused.
    pub fn elapsed(&self, now: Instant) -> f64 {
        let effective_now = self.pause_started.unwrap_or(now);
        let running = effective_now
            .saturating_duration_since(self.origin)
            .saturating_sub(self.paused);
        self.base + running.as_secs_f64() * self.speed
    }
}
