//! Engine tuning knobs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Thresholds and timings for the sync engine. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Drift within this window needs no action (about 2-3 frames at 60fps)
    pub drift_tolerance_ms: f64,
    /// Below one frame at 60fps the playback rate is reset to normal
    pub frame_threshold_ms: f64,
    /// Above this the drift corrector seeks instead of nudging the rate
    pub hard_seek_threshold_ms: f64,
    /// Largest playback-rate nudge, as a fraction of normal speed
    pub max_rate_adjustment: f64,
    /// `MasterClock::sync_with_video` forces the video position past this gap
    pub clock_sync_threshold_ms: f64,
    pub monitor_interval_ms: u64,
    pub drift_history_len: usize,
    pub buffer_timeout_ms: u64,
    /// Ceiling on a single preload or track fetch
    pub fetch_timeout_ms: u64,
    pub min_buffer_percent: f64,
    pub transition_duration_ms: u64,
    /// Cadence of the master clock's time-update loop
    pub update_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_tolerance_ms: 50.0,
            frame_threshold_ms: 16.0,
            hard_seek_threshold_ms: 500.0,
            max_rate_adjustment: 0.05,
            clock_sync_threshold_ms: 100.0,
            monitor_interval_ms: 100,
            drift_history_len: 60,
            buffer_timeout_ms: 10_000,
            fetch_timeout_ms: 30_000,
            min_buffer_percent: 10.0,
            transition_duration_ms: 16,
            update_interval_ms: 16,
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval_ms == 0 || self.update_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "polling intervals must be positive".into(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_ms must be positive".into()));
        }
        for (name, value) in [
            ("drift_tolerance_ms", self.drift_tolerance_ms),
            ("frame_threshold_ms", self.frame_threshold_ms),
            ("hard_seek_threshold_ms", self.hard_seek_threshold_ms),
            ("clock_sync_threshold_ms", self.clock_sync_threshold_ms),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if self.frame_threshold_ms > self.hard_seek_threshold_ms {
            return Err(ConfigError::Invalid(format!(
                "frame_threshold_ms ({}) exceeds hard_seek_threshold_ms ({})",
                self.frame_threshold_ms, self.hard_seek_threshold_ms
            )));
        }
        if !(0.0..1.0).contains(&self.max_rate_adjustment) {
            return Err(ConfigError::Invalid(
                "max_rate_adjustment must be in [0, 1)".into(),
            ));
        }
        if self.drift_history_len == 0 {
            return Err(ConfigError::Invalid("drift_history_len must be positive".into()));
        }
        Ok(())
    }

    pub fn buffer_timeout(&self) -> Duration {
        Duration::from_millis(self.buffer_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn transition_duration(&self) -> Duration {
        Duration::from_millis(self.transition_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SyncConfig::from_json_str(r#"{"hard_seek_threshold_ms": 750}"#).unwrap();
        assert_eq!(config.hard_seek_threshold_ms, 750.0);
        assert_eq!(config.drift_tolerance_ms, 50.0);
        assert_eq!(config.buffer_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let err = SyncConfig::from_json_str(
            r#"{"frame_threshold_ms": 600, "hard_seek_threshold_ms": 500}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = SyncConfig::from_json_str(r#"{"monitor_interval_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_non_positive_thresholds() {
        for json in [
            r#"{"hard_seek_threshold_ms": 0}"#,
            r#"{"hard_seek_threshold_ms": -500, "frame_threshold_ms": -600}"#,
            r#"{"drift_tolerance_ms": 0}"#,
            r#"{"frame_threshold_ms": -1}"#,
            r#"{"clock_sync_threshold_ms": 0}"#,
            r#"{"fetch_timeout_ms": 0}"#,
        ] {
            let err = SyncConfig::from_json_str(json).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{json} accepted");
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"monitor_interval_ms": 250}}"#).unwrap();

        let config = SyncConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.monitor_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file() {
        let err = SyncConfig::from_json_file("/nonexistent/reelsync.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
