//! Decoded audio held in memory for scheduling.
//! Samples are interleaved PCM f32.

/// Decoded audio buffer
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>, // Interleaved samples (L, R, L, R, ...)
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
        }
    }

    /// Silence of the given length
    pub fn silent(duration: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = (duration.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels.max(1) as usize], sample_rate, channels)
    }

    /// Number of sample frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Linearly interpolated sample at `time` seconds into the buffer.
    ///
    /// Channels beyond the buffer's own wrap around, so mono feeds every output channel.
    pub fn sample_at(&self, time: f64, channel: usize) -> f32 {
        let frames = self.frame_count();
        if frames == 0 || time < 0.0 {
            return 0.0;
        }

        let channel = channel % self.channels as usize;
        let position = time * self.sample_rate as f64;
        let index = position.floor() as usize;
        if index >= frames {
            return 0.0;
        }

        let current = self.samples[index * self.channels as usize + channel];
        let next = if index + 1 < frames {
            self.samples[(index + 1) * self.channels as usize + channel]
        } else {
            current
        };
        let fraction = (position - index as f64) as f32;
        current + (next - current) * fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 48_000 * 2], 48_000, 2);
        assert_eq!(buffer.frame_count(), 48_000);
        assert_eq!(buffer.duration(), 1.0);
        assert_eq!(AudioBuffer::silent(0.5, 8_000, 1).frame_count(), 4_000);
    }

    #[test]
    fn test_sample_at_interpolates() {
        // 4 frames mono at 4 Hz: one frame every 0.25s
        let buffer = AudioBuffer::new(vec![0.0, 1.0, 0.0, -1.0], 4, 1);

        assert_eq!(buffer.sample_at(0.25, 0), 1.0);
        assert_eq!(buffer.sample_at(0.125, 0), 0.5);
        assert_eq!(buffer.sample_at(1.0, 0), 0.0);
        assert_eq!(buffer.sample_at(-0.1, 0), 0.0);
    }

    #[test]
    fn test_mono_feeds_all_channels() {
        let buffer = AudioBuffer::new(vec![0.5, 0.5], 2, 1);
        assert_eq!(buffer.sample_at(0.0, 0), 0.5);
        assert_eq!(buffer.sample_at(0.0, 1), 0.5);
    }
}
