//! Timing view of a video clip on the master timeline.

use serde::{Deserialize, Serialize};

use crate::core::time::Seconds;
use crate::core::timing::calculate_absolute_timestamps;

/// A clip as supplied by the caller, before it has been placed on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInput {
    pub id: String,
    pub url: String,
    pub duration: Seconds,
}

impl ClipInput {
    pub fn new(id: impl Into<String>, url: impl Into<String>, duration: Seconds) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            duration,
        }
    }
}

/// A clip placed on the master timeline.
///
/// Derived from an ordered list of [`ClipInput`]s by [`build_video_clips`]; clips
/// are contiguous with no gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoClip {
    pub id: String,
    pub url: String,
    pub start_time: Seconds,
    pub duration: Seconds,
}

impl VideoClip {
    /// Absolute end of the clip
    pub fn end_time(&self) -> Seconds {
        self.start_time + self.duration
    }

    /// Half-open containment: the end instant belongs to the next clip
    pub fn contains(&self, time: Seconds) -> bool {
        time >= self.start_time && time < self.end_time()
    }
}

/// Place clips back to back, starting at zero.
pub fn build_video_clips(inputs: &[ClipInput]) -> Vec<VideoClip> {
    let offsets = calculate_absolute_timestamps(inputs.iter().map(|clip| clip.duration));

    inputs
        .iter()
        .zip(offsets)
        .map(|(input, start_time)| VideoClip {
            id: input.id.clone(),
            url: input.url.clone(),
            start_time,
            duration: input.duration,
        })
        .collect()
}
