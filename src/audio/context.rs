//! Audio contexts: the hardware-backed time authority behind the master clock.
//!
//! A context owns a monotonic clock (`current_time`) and the voices scheduled
//! against it. The master clock never reads wall time directly.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::audio::mixer::{VoiceId, VoiceMixer, VoiceSpec};
use crate::error::ClockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// Waiting for `resume()`, typically until a user gesture
    Suspended,
    Running,
    Closed,
}

pub trait AudioContext: Send {
    /// Context clock in seconds. Frozen while suspended.
    fn current_time(&self) -> f64;
    fn state(&self) -> ContextState;
    fn resume(&mut self) -> Result<(), ClockError>;
    fn close(&mut self);
    fn sample_rate(&self) -> u32;

    fn start_voice(&mut self, voice: VoiceSpec) -> VoiceId;
    fn stop_voice(&mut self, id: VoiceId);
    fn set_voice_gain(&mut self, id: VoiceId, gain: f32);
    fn set_master_gain(&mut self, gain: f32);
}

/// Builds a fresh context for each clock initialization
pub type ContextFactory = Box<dyn Fn() -> Result<Box<dyn AudioContext>, ClockError> + Send + Sync>;

#[derive(Debug)]
struct ManualInner {
    time: f64,
    state: ContextState,
    sample_rate: u32,
    mixer: VoiceMixer,
}

/// Context whose clock only moves when told to.
///
/// Clones share the same clock and voices, so a host can keep a handle to
/// drive time after handing the context to a [`MasterClock`](crate::audio::MasterClock).
/// Used for offline rendering and deterministic tests.
#[derive(Debug, Clone)]
pub struct ManualContext {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualInner {
                time: 0.0,
                state: ContextState::Running,
                sample_rate,
                mixer: VoiceMixer::new(),
            })),
        }
    }

    /// Starts suspended, as a browser context created without a user gesture would
    pub fn suspended(sample_rate: u32) -> Self {
        let context = Self::new(sample_rate);
        context.inner.lock().state = ContextState::Suspended;
        context
    }

    /// Move the clock forward. Ignored unless running.
    pub fn advance(&self, seconds: f64) {
        let mut inner = self.inner.lock();
        if inner.state == ContextState::Running {
            inner.time += seconds.max(0.0);
        }
    }

    /// Render `frames` of interleaved output at the current time, then advance past them.
    pub fn render(&self, frames: usize, channels: u16) -> Vec<f32> {
        let mut inner = self.inner.lock();
        let mut out = vec![0.0; frames * channels.max(1) as usize];
        if inner.state != ContextState::Running {
            return out;
        }
        let sample_rate = inner.sample_rate;
        inner.mixer.render(inner.time, &mut out, channels, sample_rate);
        inner.time += frames as f64 / sample_rate as f64;
        let now = inner.time;
        inner.mixer.prune(now);
        out
    }

    pub fn active_voices(&self) -> usize {
        self.inner.lock().mixer.len()
    }

    /// Snapshot of a scheduled voice
    pub fn voice(&self, id: VoiceId) -> Option<VoiceSpec> {
        self.inner.lock().mixer.voice(id).cloned()
    }

    pub fn master_gain(&self) -> f32 {
        self.inner.lock().mixer.master_gain()
    }

    /// Factory handing out clones of this context
    pub fn factory(&self) -> ContextFactory {
        let context = self.clone();
        Box::new(move || Ok(Box::new(context.clone()) as Box<dyn AudioContext>))
    }
}

impl AudioContext for ManualContext {
    fn current_time(&self) -> f64 {
        self.inner.lock().time
    }

    fn state(&self) -> ContextState {
        self.inner.lock().state
    }

    fn resume(&mut self) -> Result<(), ClockError> {
        let mut inner = self.inner.lock();
        match inner.state {
            ContextState::Closed => Err(ClockError::ContextClosed),
            _ => {
                inner.state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        let mut inner = self.inner.lock();
        inner.mixer.stop_all();
        inner.state = ContextState::Closed;
    }

    fn sample_rate(&self) -> u32 {
        self.inner.lock().sample_rate
    }

    fn start_voice(&mut self, voice: VoiceSpec) -> VoiceId {
        self.inner.lock().mixer.add(voice)
    }

    fn stop_voice(&mut self, id: VoiceId) {
        self.inner.lock().mixer.stop(id);
    }

    fn set_voice_gain(&mut self, id: VoiceId, gain: f32) {
        self.inner.lock().mixer.set_gain(id, gain);
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.inner.lock().mixer.set_master_gain(gain);
    }
}

/// Context driven by the monotonic system clock, with no audio output.
///
/// Keeps timing and voice bookkeeping when no output device is available.
#[derive(Debug)]
pub struct SystemContext {
    sample_rate: u32,
    state: ContextState,
    /// Context time accumulated before the current running stretch
    banked: f64,
    running_since: Option<Instant>,
    mixer: VoiceMixer,
}

impl SystemContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: ContextState::Running,
            banked: 0.0,
            running_since: Some(Instant::now()),
            mixer: VoiceMixer::new(),
        }
    }

    pub fn factory(sample_rate: u32) -> ContextFactory {
        Box::new(move || Ok(Box::new(SystemContext::new(sample_rate)) as Box<dyn AudioContext>))
    }

    /// Freeze the clock until `resume()`
    pub fn suspend(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.banked += since.elapsed().as_secs_f64();
        }
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
        }
    }
}

impl AudioContext for SystemContext {
    fn current_time(&self) -> f64 {
        self.banked
            + self
                .running_since
                .map(|since| since.elapsed().as_secs_f64())
                .unwrap_or(0.0)
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<(), ClockError> {
        match self.state {
            ContextState::Closed => Err(ClockError::ContextClosed),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.running_since = Some(Instant::now());
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        self.suspend();
        self.mixer.stop_all();
        self.state = ContextState::Closed;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_voice(&mut self, voice: VoiceSpec) -> VoiceId {
        let now = self.current_time();
        self.mixer.prune(now);
        self.mixer.add(voice)
    }

    fn stop_voice(&mut self, id: VoiceId) {
        self.mixer.stop(id);
    }

    fn set_voice_gain(&mut self, id: VoiceId, gain: f32) {
        self.mixer.set_gain(id, gain);
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.mixer.set_master_gain(gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBuffer;

    #[test]
    fn test_manual_clock_only_moves_when_running() {
        let mut context = ManualContext::suspended(48_000);
        context.advance(1.0);
        assert_eq!(context.current_time(), 0.0);

        context.resume().unwrap();
        context.advance(1.0);
        assert_eq!(context.current_time(), 1.0);

        context.close();
        assert!(matches!(context.resume(), Err(ClockError::ContextClosed)));
    }

    #[test]
    fn test_manual_clones_share_state() {
        let context = ManualContext::new(48_000);
        let mut handle: Box<dyn AudioContext> = Box::new(context.clone());
        context.advance(0.25);
        assert_eq!(handle.current_time(), 0.25);

        let buffer = Arc::new(AudioBuffer::silent(1.0, 48_000, 1));
        handle.start_voice(VoiceSpec::new(buffer, 0.5));
        assert_eq!(context.active_voices(), 1);
    }

    #[test]
    fn test_manual_render_advances_time() {
        let context = ManualContext::new(10);
        let buffer = Arc::new(AudioBuffer::new(vec![1.0; 10], 10, 1));
        context.clone().start_voice(VoiceSpec::new(buffer, 0.0));

        let out = context.render(5, 1);
        assert_eq!(out, vec![1.0; 5]);
        assert_eq!(context.current_time(), 0.5);

        context.render(10, 1);
        assert_eq!(context.active_voices(), 0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let mut context = SystemContext::new(48_000);
        let a = context.current_time();
        let b = context.current_time();
        assert!(b >= a);

        context.suspend();
        let frozen = context.current_time();
        assert_eq!(context.current_time(), frozen);
        assert_eq!(context.state(), ContextState::Suspended);

        context.resume().unwrap();
        assert!(context.current_time() >= frozen);
    }
}
