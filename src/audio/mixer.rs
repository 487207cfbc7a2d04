//! Voice mixing against the audio-context clock.
//!
//! A voice is one scheduled playback of a decoded buffer. Every timing value
//! here is context time, so voices started in the same scheduling pass stay
//! sample-aligned regardless of when the output callback runs.

use std::sync::Arc;

use crate::audio::buffer::AudioBuffer;
use crate::audio::envelope::GainEnvelope;

pub type VoiceId = u64;

/// What to play and when
#[derive(Debug, Clone)]
pub struct VoiceSpec {
    pub buffer: Arc<AudioBuffer>,
    /// Context time at which playback begins
    pub when: f64,
    /// Seconds into the buffer where playback begins
    pub offset: f64,
    /// Seconds of buffer to play from `offset`; `None` plays to the end
    pub duration: Option<f64>,
    pub playback_rate: f64,
    /// Shape automation, multiplied by `gain`
    pub envelope: GainEnvelope,
    /// Live gain (volume and mute)
    pub gain: f32,
}

impl VoiceSpec {
    pub fn new(buffer: Arc<AudioBuffer>, when: f64) -> Self {
        Self {
            buffer,
            when,
            offset: 0.0,
            duration: None,
            playback_rate: 1.0,
            envelope: GainEnvelope::constant(1.0),
            gain: 1.0,
        }
    }

    /// Buffer position where playback stops
    fn end_offset(&self) -> f64 {
        let buffer_end = self.buffer.duration();
        match self.duration {
            Some(duration) => (self.offset + duration).min(buffer_end),
            None => buffer_end,
        }
    }

    /// Context time at which the voice falls silent
    pub fn end_time(&self) -> f64 {
        let rate = if self.playback_rate > 0.0 { self.playback_rate } else { 1.0 };
        self.when + (self.end_offset() - self.offset).max(0.0) / rate
    }

    /// Buffer position at context time `t`, if the voice is sounding then
    fn position_at(&self, t: f64) -> Option<f64> {
        if t < self.when {
            return None;
        }
        let position = self.offset + (t - self.when) * self.playback_rate;
        (position < self.end_offset()).then_some(position)
    }
}

/// Active voices plus the master gain
#[derive(Debug, Default)]
pub struct VoiceMixer {
    voices: Vec<(VoiceId, VoiceSpec)>,
    next_id: VoiceId,
    master_gain: f32,
}

impl VoiceMixer {
    pub fn new() -> Self {
        Self {
            voices: Vec::new(),
            next_id: 1,
            master_gain: 1.0,
        }
    }

    pub fn add(&mut self, voice: VoiceSpec) -> VoiceId {
        let id = self.next_id;
        self.next_id += 1;
        self.voices.push((id, voice));
        id
    }

    pub fn stop(&mut self, id: VoiceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|(voice_id, _)| *voice_id != id);
        self.voices.len() != before
    }

    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    pub fn set_gain(&mut self, id: VoiceId, gain: f32) {
        if let Some((_, voice)) = self.voices.iter_mut().find(|(voice_id, _)| *voice_id == id) {
            voice.gain = gain;
        }
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain;
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn voice(&self, id: VoiceId) -> Option<&VoiceSpec> {
        self.voices
            .iter()
            .find(|(voice_id, _)| *voice_id == id)
            .map(|(_, voice)| voice)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Drop voices that finished before context time `t`
    pub fn prune(&mut self, t: f64) {
        self.voices.retain(|(_, voice)| voice.end_time() > t);
    }

    /// Mix all voices into `out` (interleaved), whose first frame plays at context time `start`.
    pub fn render(&self, start: f64, out: &mut [f32], channels: u16, sample_rate: u32) {
        out.fill(0.0);
        let channels = channels.max(1) as usize;
        let sample_rate = sample_rate.max(1) as f64;

        for (frame_index, frame) in out.chunks_mut(channels).enumerate() {
            let t = start + frame_index as f64 / sample_rate;
            for (_, voice) in &self.voices {
                let Some(position) = voice.position_at(t) else {
                    continue;
                };
                let gain = voice.envelope.value_at(t) * voice.gain * self.master_gain;
                if gain == 0.0 {
                    continue;
                }
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample += voice.buffer.sample_at(position, channel) * gain;
                }
            }
        }
    }
}
