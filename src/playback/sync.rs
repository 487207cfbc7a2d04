//! Drift detection and correction.
//! Video follows audio: corrections only ever touch the video element.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::core::manifest::SyncManifest;
use crate::core::time::{from_millis, Seconds};
use crate::media::element::MediaElement;

/// Where the audio should be at a given timeline time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedAudioPosition {
    pub track_id: String,
    /// Seconds into the track
    pub offset: Seconds,
}

/// Find the audio track whose `[start, start + duration)` window holds `current_time`
pub fn get_expected_audio_position(
    manifest: &SyncManifest,
    current_time: Seconds,
) -> Option<ExpectedAudioPosition> {
    manifest
        .audio_track_at(current_time)
        .map(|track| ExpectedAudioPosition {
            track_id: track.id.clone(),
            offset: current_time - track.start_time,
        })
}

/// Measured drift between an expected and an actual position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftMeasurement {
    /// actual - expected; positive means the element is ahead
    pub drift: Seconds,
    pub within_tolerance: bool,
}

/// What `correct_drift` did to the element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftCorrection {
    /// Drift under one frame: rate reset to the base rate
    Reset,
    /// Playback rate nudged toward convergence
    Nudge { rate: f64 },
    /// Position jumped by the full drift, rate reset to the base rate
    HardSeek { to: Seconds },
}

/// Two-tier drift corrector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftCorrector {
    tolerance: Seconds,
    frame_threshold: Seconds,
    hard_seek_threshold: Seconds,
    max_rate_adjustment: f64,
}

impl DriftCorrector {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            tolerance: from_millis(config.drift_tolerance_ms),
            frame_threshold: from_millis(config.frame_threshold_ms),
            hard_seek_threshold: from_millis(config.hard_seek_threshold_ms),
            max_rate_adjustment: config.max_rate_adjustment,
        }
    }

    pub fn tolerance(&self) -> Seconds {
        self.tolerance
    }

    pub fn calculate_drift(&self, expected: Seconds, actual: Seconds) -> DriftMeasurement {
        let drift = actual - expected;
        DriftMeasurement {
            drift,
            within_tolerance: drift.abs() <= self.tolerance,
        }
    }

    /// Rate that closes `drift` without a seek: ahead slows down, behind speeds up
    pub fn nudge_rate(&self, drift: Seconds) -> f64 {
        self.nudge_rate_around(drift, 1.0)
    }

    /// [`nudge_rate`](Self::nudge_rate) relative to `base_rate`, the rate the clock runs at
    pub fn nudge_rate_around(&self, drift: Seconds, base_rate: f64) -> f64 {
        let adjustment = (drift.abs() / self.hard_seek_threshold * self.max_rate_adjustment)
            .min(self.max_rate_adjustment);
        if drift > 0.0 {
            base_rate * (1.0 - adjustment)
        } else {
            base_rate * (1.0 + adjustment)
        }
    }

    pub fn correct_drift<E: MediaElement + ?Sized>(
        &self,
        element: &E,
        drift: Seconds,
    ) -> DriftCorrection {
        self.correct_drift_at_rate(element, drift, 1.0)
    }

    /// Correct `drift` for an element that should be playing at `base_rate`
    pub fn correct_drift_at_rate<E: MediaElement + ?Sized>(
        &self,
        element: &E,
        drift: Seconds,
        base_rate: f64,
    ) -> DriftCorrection {
        let magnitude = drift.abs();

        if magnitude < self.frame_threshold {
            element.set_playback_rate(base_rate);
            return DriftCorrection::Reset;
        }

        if magnitude <= self.hard_seek_threshold {
            let rate = self.nudge_rate_around(drift, base_rate);
            element.set_playback_rate(rate);
            debug!(drift, rate, base_rate, "drift nudged");
            return DriftCorrection::Nudge { rate };
        }

        let to = (element.current_time() - drift).max(0.0);
        element.set_current_time(to);
        element.set_playback_rate(base_rate);
        info!(drift, to, "drift too large; hard seek");
        DriftCorrection::HardSeek { to }
    }
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}
