//! Audio tracks scheduled against the master timeline.

use serde::{Deserialize, Serialize};

use crate::core::time::Seconds;

/// Category of an audio track, used for per-category muting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Voice,
    Music,
    Sfx,
}

/// An audio track placed on the master timeline.
///
/// Immutable once scheduled; a new track list replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub id: String,
    pub url: String,
    /// Absolute start on the master timeline
    pub start_time: Seconds,
    pub duration: Seconds,
    /// 0.0 to 1.0
    pub volume: f32,
    #[serde(rename = "type")]
    pub track_type: TrackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<Seconds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<Seconds>,
}

/// Where a timeline position falls relative to a track's window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackPlacement {
    /// Track starts `delay` timeline-seconds after the position
    Upcoming { delay: Seconds },
    /// Position is `offset` seconds into the track
    Active { offset: Seconds },
    /// Track has already finished
    Ended,
}

impl AudioTrack {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        track_type: TrackType,
        start_time: Seconds,
        duration: Seconds,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            start_time,
            duration,
            volume: 1.0,
            track_type,
            fade_in: None,
            fade_out: None,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_fades(mut self, fade_in: Option<Seconds>, fade_out: Option<Seconds>) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    /// Absolute end of the track
    pub fn end_time(&self) -> Seconds {
        self.start_time + self.duration
    }

    /// `[start_time, start_time + duration)`
    pub fn contains(&self, time: Seconds) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// Classify a timeline position against this track's window.
    pub fn placement(&self, time: Seconds) -> TrackPlacement {
        if time < self.start_time {
            TrackPlacement::Upcoming {
                delay: self.start_time - time,
            }
        } else if time < self.end_time() {
            TrackPlacement::Active {
                offset: time - self.start_time,
            }
        } else {
            TrackPlacement::Ended
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn music() -> AudioTrack {
        AudioTrack::new("m1", "music.mp3", TrackType::Music, 10.0, 20.0)
    }

    #[test]
    fn test_placement() {
        let track = music();

        assert_eq!(track.placement(4.0), TrackPlacement::Upcoming { delay: 6.0 });
        assert_eq!(track.placement(10.0), TrackPlacement::Active { offset: 0.0 });
        assert_eq!(track.placement(25.0), TrackPlacement::Active { offset: 15.0 });
        assert_eq!(track.placement(30.0), TrackPlacement::Ended);
    }

    #[test]
    fn test_volume_is_clamped() {
        assert_eq!(music().with_volume(1.7).volume, 1.0);
        assert_eq!(music().with_volume(-0.2).volume, 0.0);
    }

    #[test]
    fn test_deserialize_wire_shape() {
        let json = r#"{"id":"v","url":"v.wav","startTime":1.5,"duration":3.0,"volume":0.8,"type":"voice","fadeIn":0.5}"#;
        let track: AudioTrack = serde_json::from_str(json).unwrap();

        assert_eq!(track.track_type, TrackType::Voice);
        assert_eq!(track.start_time, 1.5);
        assert_eq!(track.fade_in, Some(0.5));
        assert_eq!(track.fade_out, None);
    }
}
