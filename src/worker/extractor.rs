//! Frame extraction capability.
//!
//! Hardware frame decoding is platform specific. The worker only asks
//! whether an extractor is available; when it is not, the caller extracts
//! frames on its own thread.

use crate::core::time::Seconds;
use crate::worker::protocol::DecodedFrame;

pub trait FrameExtractor: Send {
    fn is_supported(&self) -> bool;

    /// Decode the frames nearest to each of `timestamps` from an encoded clip
    fn extract(&mut self, bytes: &[u8], timestamps: &[Seconds]) -> Result<Vec<DecodedFrame>, String>;
}

/// No hardware decoder on this platform
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedExtractor;

impl FrameExtractor for UnsupportedExtractor {
    fn is_supported(&self) -> bool {
        false
    }

    fn extract(&mut self, _bytes: &[u8], _timestamps: &[Seconds]) -> Result<Vec<DecodedFrame>, String> {
        Err("frame extraction is not supported on this platform".into())
    }
}
