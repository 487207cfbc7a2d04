//! Time helpers for the master timeline.
//! All timeline positions are absolute seconds (f64) from the start of the stitched sequence.

/// Seconds on the master timeline
pub type Seconds = f64;

/// Time constants for conversions
pub mod constants {
    pub const MILLIS_PER_SECOND: f64 = 1_000.0;

    /// Decimal places used when snapping to frame boundaries
    pub const FRAME_PRECISION: i32 = 6;
}

/// Convert milliseconds to seconds
#[inline]
pub fn from_millis(millis: f64) -> Seconds {
    millis / constants::MILLIS_PER_SECOND
}

/// Convert seconds to milliseconds
#[inline]
pub fn to_millis(seconds: Seconds) -> f64 {
    seconds * constants::MILLIS_PER_SECOND
}

/// Round to a fixed number of decimal places
#[inline]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Format time as HH:MM:SS.mmm
pub fn format_time(seconds: Seconds) -> String {
    let total_millis = to_millis(seconds.max(0.0)).round() as i64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1_000;
    let millis = total_millis % 1_000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}
