//! Master clock state machine.

use serde::{Deserialize, Serialize};

use crate::audio::context::ContextState;

/// Lowest and highest playback rates the clock accepts
pub const MIN_PLAYBACK_RATE: f64 = 0.25;
pub const MAX_PLAYBACK_RATE: f64 = 4.0;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackState {
    /// No audio context yet
    Uninitialized,
    /// Context created, nothing played
    Initialized,
    /// Running: timeline position = (context time - start_instant) * rate
    Playing { start_instant: f64 },
    /// Stopped at a specific timeline position
    Paused { position: f64 },
}

impl PlaybackState {
    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }

    /// Check if paused
    pub fn is_paused(&self) -> bool {
        matches!(self, PlaybackState::Paused { .. })
    }

    /// Timeline position for a given context time and rate
    pub fn current_position(&self, context_time: f64, rate: f64) -> f64 {
        match self {
            PlaybackState::Uninitialized | PlaybackState::Initialized => 0.0,
            PlaybackState::Playing { start_instant } => {
                ((context_time - start_instant) * rate).max(0.0)
            }
            PlaybackState::Paused { position } => *position,
        }
    }

    /// Start instant that makes `(context_time - start) * rate == position`
    pub fn anchor(position: f64, context_time: f64, rate: f64) -> PlaybackState {
        PlaybackState::Playing {
            start_instant: context_time - position / rate,
        }
    }
}

/// Clamp a requested rate into the supported range
pub fn clamp_playback_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return 1.0;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Read-only snapshot of the master clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub current_time: f64,
    pub is_playing: bool,
    pub playback_rate: f64,
    /// Last measured video-minus-audio drift, seconds
    pub drift: f64,
    pub audio_context_state: Option<ContextState>,
}
