//! reelsync: audio-clocked playback synchronization for stitched clip sequences.
//!
//! A [`MasterClock`] driven by an audio context is the only timing authority.
//! Video elements follow it through the drift detector, clip handoffs go
//! through buffer-verified transitions, and the continuity resolver picks the
//! visual anchors for the next generated clip.

pub mod audio;
pub mod config;
pub mod continuity;
pub mod core;
pub mod error;
pub mod fetch;
pub mod media;
pub mod playback;
pub mod worker;

pub use audio::{AudioContext, ManualContext, MasterClock, SystemContext};
pub use config::SyncConfig;
pub use error::{ClockError, ConfigError, MediaError, Result, SyncError, WorkerError};
pub use fetch::{fetch_with_deadline, FetchError, Fetcher, FileFetcher, MemoryFetcher, StalledFetcher};
pub use playback::{AudioSyncMonitor, PlaybackSession};
