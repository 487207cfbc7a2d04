//! Frame boundary and timestamp calculation.
//!
//! Clip start times are always derived from the full prefix sum of the
//! durations before them, never from a previous clip's rounded start, so a
//! long sequence accumulates no drift at clip boundaries.

use serde::{Deserialize, Serialize};

use crate::core::clip::VideoClip;
use crate::core::time::{constants::FRAME_PRECISION, round_to, Seconds};

/// Distance from a clip edge (seconds) that counts as "at the boundary"
pub const BOUNDARY_WINDOW: Seconds = 0.05;

/// Cumulative start offset of each clip, given the clip durations in order.
pub fn calculate_absolute_timestamps<I>(durations: I) -> Vec<Seconds>
where
    I: IntoIterator<Item = Seconds>,
{
    let mut offsets = Vec::new();
    let mut elapsed = 0.0;
    for duration in durations {
        offsets.push(elapsed);
        elapsed += duration;
    }
    offsets
}

/// Frame start times in `[0, duration)` at `1/fps` spacing.
pub fn calculate_frame_boundaries(duration: Seconds, fps: f64) -> Vec<Seconds> {
    if !(fps > 0.0) || !(duration > 0.0) {
        return Vec::new();
    }

    let frame_count = (duration * fps).ceil() as usize;
    (0..frame_count)
        .map(|index| round_to(index as f64 / fps, FRAME_PRECISION))
        .filter(|time| *time < duration)
        .collect()
}

/// Round an arbitrary time to the nearest frame boundary.
pub fn snap_to_frame(time: Seconds, fps: f64) -> Seconds {
    if !(fps > 0.0) {
        return time;
    }
    round_to((time * fps).round() / fps, FRAME_PRECISION)
}

/// Where an absolute time falls within a clip sequence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipBoundary {
    pub clip_index: usize,
    pub local_time: Seconds,
    /// Within [`BOUNDARY_WINDOW`] of either edge of the owning clip
    pub at_boundary: bool,
}

/// Locate the clip owning `time`. Past-the-end resolves to the last clip at its full duration.
pub fn calculate_clip_boundary(clips: &[VideoClip], time: Seconds) -> ClipBoundary {
    let Some(last) = clips.last() else {
        return ClipBoundary::default();
    };

    let time = time.max(0.0);
    for (clip_index, clip) in clips.iter().enumerate() {
        if clip.contains(time) {
            let local_time = time - clip.start_time;
            return ClipBoundary {
                clip_index,
                local_time,
                at_boundary: is_near_edge(local_time, clip.duration),
            };
        }
    }

    ClipBoundary {
        clip_index: clips.len() - 1,
        local_time: last.duration,
        at_boundary: true,
    }
}

fn is_near_edge(local_time: Seconds, duration: Seconds) -> bool {
    local_time < BOUNDARY_WINDOW || duration - local_time < BOUNDARY_WINDOW
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clip::{build_video_clips, ClipInput};

    fn clips(durations: &[f64]) -> Vec<VideoClip> {
        let inputs: Vec<ClipInput> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| ClipInput::new(format!("clip-{i}"), format!("clip-{i}.mp4"), *d))
            .collect();
        build_video_clips(&inputs)
    }

    #[test]
    fn test_timestamps_are_prefix_sums() {
        let durations = [5.1, 3.33, 0.7, 12.005, 4.2, 1.0 / 3.0, 2.9];
        let offsets = calculate_absolute_timestamps(durations);

        assert_eq!(offsets.len(), durations.len());
        assert_eq!(offsets[0], 0.0);
        for i in 0..durations.len() {
            let expected: f64 = durations[..i].iter().sum();
            assert_eq!(offsets[i], expected);
        }
    }

    #[test]
    fn test_timestamps_empty() {
        assert!(calculate_absolute_timestamps(Vec::<f64>::new()).is_empty());
    }

    #[test]
    fn test_frame_boundaries() {
        let frames = calculate_frame_boundaries(0.1, 30.0);
        assert_eq!(frames, vec![0.0, 0.033333, 0.066667]);

        let frames = calculate_frame_boundaries(1.0, 24.0);
        assert_eq!(frames.len(), 24);
        assert_eq!(frames[23], 0.958333);
    }

    #[test]
    fn test_frame_boundaries_invalid_input() {
        assert!(calculate_frame_boundaries(0.0, 30.0).is_empty());
        assert!(calculate_frame_boundaries(1.0, 0.0).is_empty());
        assert!(calculate_frame_boundaries(1.0, f64::NAN).is_empty());
    }

    #[test]
    fn test_snap_to_frame() {
        assert_eq!(snap_to_frame(0.02, 30.0), 0.033333);
        assert_eq!(snap_to_frame(0.01, 30.0), 0.0);
        assert_eq!(snap_to_frame(1.0, 24.0), 1.0);
        assert_eq!(snap_to_frame(1.234, 0.0), 1.234);
    }

    #[test]
    fn test_snap_is_idempotent() {
        for fps in [23.976, 24.0, 25.0, 29.97, 30.0, 60.0] {
            let mut t = 0.0;
            while t < 10.0 {
                let once = snap_to_frame(t, fps);
                assert_eq!(snap_to_frame(once, fps), once, "t={t} fps={fps}");
                t += 0.0137;
            }
        }
    }

    #[test]
    fn test_clip_boundary_inside() {
        let seq = clips(&[5.0, 5.0, 5.0]);

        let b = calculate_clip_boundary(&seq, 7.5);
        assert_eq!(b.clip_index, 1);
        assert!((b.local_time - 2.5).abs() < 1e-9);
        assert!(!b.at_boundary);
    }

    #[test]
    fn test_clip_boundary_edges() {
        let seq = clips(&[5.0, 5.0, 5.0]);

        let start = calculate_clip_boundary(&seq, 5.02);
        assert_eq!(start.clip_index, 1);
        assert!(start.at_boundary);

        let end = calculate_clip_boundary(&seq, 9.97);
        assert_eq!(end.clip_index, 1);
        assert!(end.at_boundary);
    }

    #[test]
    fn test_clip_boundary_past_end() {
        let seq = clips(&[5.0, 5.0, 5.0]);

        let b = calculate_clip_boundary(&seq, 42.0);
        assert_eq!(b.clip_index, 2);
        assert_eq!(b.local_time, 5.0);
        assert!(b.at_boundary);
    }

    #[test]
    fn test_clip_boundary_empty() {
        assert_eq!(calculate_clip_boundary(&[], 3.0), ClipBoundary::default());
    }
}
