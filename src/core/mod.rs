//! Core timing types.
//!
//! This module provides the timeline data structures shared by the playback
//! engine: clip placement, audio tracks, the sync manifest, and the pure frame
//! and timestamp calculations. All time values are absolute seconds (f64).

pub mod clip;
pub mod manifest;
pub mod time;
pub mod timing;
pub mod track;

// Re-export core data structures for easier access.
pub use clip::{build_video_clips, ClipInput, VideoClip};
pub use manifest::{SyncManifest, SyncPoint};
pub use time::Seconds;
pub use timing::{
    calculate_absolute_timestamps, calculate_clip_boundary, calculate_frame_boundaries,
    snap_to_frame, ClipBoundary,
};
pub use track::{AudioTrack, TrackPlacement, TrackType};
