//! Sync manifest: the absolute-timing description of a stitched sequence.

use serde::{Deserialize, Serialize};

use crate::core::clip::{build_video_clips, ClipInput, VideoClip};
use crate::core::time::Seconds;
use crate::core::track::AudioTrack;

/// Alignment anchor at a clip boundary, or at the end of the sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPoint {
    pub time: Seconds,
    /// Clip starting at this point; `None` for the terminal point
    pub video_clip_id: Option<String>,
    /// Audio tracks audible at this point
    pub audio_track_ids: Vec<String>,
}

/// Immutable once built. Rebuild when the clip list changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    pub video_tracks: Vec<VideoClip>,
    pub audio_tracks: Vec<AudioTrack>,
    pub total_duration: Seconds,
    pub sync_points: Vec<SyncPoint>,
}

impl SyncManifest {
    /// Build from clip inputs in playback order plus the audio track list.
    pub fn build(clips: &[ClipInput], audio_tracks: Vec<AudioTrack>) -> Self {
        Self::from_clips(build_video_clips(clips), audio_tracks)
    }

    /// Build from clips already placed on the timeline.
    pub fn from_clips(video_tracks: Vec<VideoClip>, audio_tracks: Vec<AudioTrack>) -> Self {
        let total_duration = video_tracks
            .iter()
            .map(VideoClip::end_time)
            .fold(0.0, f64::max);

        let active_at = |time: Seconds| -> Vec<String> {
            audio_tracks
                .iter()
                .filter(|track| track.contains(time))
                .map(|track| track.id.clone())
                .collect()
        };

        let mut sync_points: Vec<SyncPoint> = video_tracks
            .iter()
            .map(|clip| SyncPoint {
                time: clip.start_time,
                video_clip_id: Some(clip.id.clone()),
                audio_track_ids: active_at(clip.start_time),
            })
            .collect();

        if !video_tracks.is_empty() {
            sync_points.push(SyncPoint {
                time: total_duration,
                video_clip_id: None,
                audio_track_ids: active_at(total_duration),
            });
        }

        Self {
            video_tracks,
            audio_tracks,
            total_duration,
            sync_points,
        }
    }

    /// Clip playing at `time`, if any
    pub fn clip_at(&self, time: Seconds) -> Option<&VideoClip> {
        self.video_tracks.iter().find(|clip| clip.contains(time))
    }

    /// First audio track whose window contains `time`
    pub fn audio_track_at(&self, time: Seconds) -> Option<&AudioTrack> {
        self.audio_tracks.iter().find(|track| track.contains(time))
    }

    /// Sync point closest to `time`, for snapping seeks to a clip boundary
    pub fn nearest_sync_point(&self, time: Seconds) -> Option<&SyncPoint> {
        self.sync_points.iter().min_by(|a, b| {
            (a.time - time)
                .abs()
                .total_cmp(&(b.time - time).abs())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::track::TrackType;

    fn three_clips() -> Vec<ClipInput> {
        (0..3)
            .map(|i| ClipInput::new(format!("clip-{i}"), format!("clip-{i}.mp4"), 5.0))
            .collect()
    }

    #[test]
    fn test_three_clip_manifest() {
        let manifest = SyncManifest::build(&three_clips(), Vec::new());

        let starts: Vec<f64> = manifest.video_tracks.iter().map(|c| c.start_time).collect();
        assert_eq!(starts, vec![0.0, 5.0, 10.0]);
        assert_eq!(manifest.total_duration, 15.0);

        let points: Vec<f64> = manifest.sync_points.iter().map(|p| p.time).collect();
        assert_eq!(points, vec![0.0, 5.0, 10.0, 15.0]);
        assert_eq!(manifest.sync_points[3].video_clip_id, None);
    }

    #[test]
    fn test_sync_points_list_active_audio() {
        let tracks = vec![
            AudioTrack::new("voice", "v.wav", TrackType::Voice, 0.0, 6.0),
            AudioTrack::new("music", "m.mp3", TrackType::Music, 4.0, 20.0),
        ];
        let manifest = SyncManifest::build(&three_clips(), tracks);

        assert_eq!(manifest.sync_points[0].audio_track_ids, vec!["voice"]);
        assert_eq!(manifest.sync_points[1].audio_track_ids, vec!["voice", "music"]);
        assert_eq!(manifest.sync_points[3].audio_track_ids, vec!["music"]);
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = SyncManifest::build(&[], Vec::new());
        assert_eq!(manifest.total_duration, 0.0);
        assert!(manifest.sync_points.is_empty());
        assert!(manifest.nearest_sync_point(3.0).is_none());
    }

    #[test]
    fn test_lookups() {
        let manifest = SyncManifest::build(&three_clips(), Vec::new());

        assert_eq!(manifest.clip_at(7.0).map(|c| c.id.as_str()), Some("clip-1"));
        assert!(manifest.clip_at(15.0).is_none());
        assert_eq!(manifest.nearest_sync_point(9.1).map(|p| p.time), Some(10.0));
    }
}
