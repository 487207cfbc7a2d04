//! Media element abstraction.
//!
//! The engine never creates playback surfaces; it drives elements owned by the
//! embedding UI through this trait. Elements behave like DOM handles: all
//! methods take `&self` and implementors use interior mutability.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::MediaError;

/// How much media data an element holds, ordered from nothing to enough
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A contiguous buffered span, in element-local seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0.0
    }
}

/// Events an element publishes to its subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata,
    CanPlay,
    CanPlayThrough,
    Ended,
    Error(String),
}

pub trait MediaElement: Send + Sync {
    fn src(&self) -> Option<String>;
    fn set_src(&self, url: &str);
    /// Begin (re)loading the current source
    fn load(&self);

    fn ready_state(&self) -> ReadyState;
    /// NaN until metadata is known
    fn duration(&self) -> f64;
    fn buffered(&self) -> Vec<TimeRange>;
    /// Last error reported by the element, if any
    fn error(&self) -> Option<String>;

    fn current_time(&self) -> f64;
    fn set_current_time(&self, time: f64);
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);

    fn opacity(&self) -> f32;
    fn set_opacity(&self, opacity: f32);
    fn set_visible(&self, visible: bool);

    fn play(&self) -> Result<(), MediaError>;
    fn pause(&self);
    fn is_paused(&self) -> bool;

    /// Subscribe to element events. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;

    /// Clear buffers and revoke any object URLs held by the element
    fn release(&self) {}
}

/// Whether a reported duration can be used for buffer math
pub fn is_valid_duration(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}
