//! cpal output stream as the audio context.
//! The count of frames consumed by the device is the clock; the output
//! callback mixes every scheduled voice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::audio::context::{AudioContext, ContextFactory, ContextState};
use crate::audio::mixer::{VoiceId, VoiceMixer, VoiceSpec};
use crate::error::ClockError;

/// Commands for the thread that owns the (non-Send) cpal stream
enum StreamCommand {
    Play,
    Pause,
    Close,
}

pub struct CpalContext {
    mixer: Arc<Mutex<VoiceMixer>>,
    frames_played: Arc<AtomicU64>,
    commands: Sender<StreamCommand>,
    sample_rate: u32,
    state: ContextState,
    stream_thread: Option<JoinHandle<()>>,
}

impl CpalContext {
    /// Open the default output device and start its stream
    pub fn open() -> Result<Self, ClockError> {
        let mixer = Arc::new(Mutex::new(VoiceMixer::new()));
        let frames_played = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = channel::bounded::<Result<u32, ClockError>>(1);
        let (command_tx, command_rx) = channel::unbounded::<StreamCommand>();

        let thread_mixer = Arc::clone(&mixer);
        let thread_frames = Arc::clone(&frames_played);
        let stream_thread = thread::Builder::new()
            .name("reelsync-audio".into())
            .spawn(move || {
                let stream = match build_stream(thread_mixer, thread_frames) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for command in command_rx.iter() {
                    match command {
                        StreamCommand::Play => {
                            if let Err(err) = stream.play() {
                                warn!("cpal play stream error: {}", err);
                            }
                        }
                        StreamCommand::Pause => {
                            if let Err(err) = stream.pause() {
                                warn!("cpal pause stream error: {}", err);
                            }
                        }
                        StreamCommand::Close => break,
                    }
                }
            })
            .map_err(|e| ClockError::ContextUnavailable(e.to_string()))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| ClockError::ContextUnavailable("audio thread exited".into()))??;

        Ok(Self {
            mixer,
            frames_played,
            commands: command_tx,
            sample_rate,
            state: ContextState::Running,
            stream_thread: Some(stream_thread),
        })
    }

    pub fn factory() -> ContextFactory {
        Box::new(|| Ok(Box::new(CpalContext::open()?) as Box<dyn AudioContext>))
    }
}

fn build_stream(
    mixer: Arc<Mutex<VoiceMixer>>,
    frames_played: Arc<AtomicU64>,
) -> Result<(cpal::Stream, u32), ClockError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| ClockError::ContextUnavailable("no audio output device".into()))?;
    let default_config = device
        .default_output_config()
        .map_err(|e| ClockError::ContextUnavailable(format!("cpal default config error: {e}")))?;
    let sample_rate = default_config.sample_rate().0;
    let channels = default_config.channels();
    let stream_config = cpal::StreamConfig::from(default_config);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = (data.len() / channels.max(1) as usize) as u64;
                let start = frames_played.load(Ordering::Acquire) as f64 / sample_rate as f64;
                // Never block the device thread; a contended lock costs one buffer of silence.
                match mixer.try_lock() {
                    Some(mut mixer) => {
                        mixer.render(start, data, channels, sample_rate);
                        mixer.prune(start);
                    }
                    None => data.fill(0.0),
                }
                frames_played.fetch_add(frames, Ordering::Release);
            },
            |err| error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| ClockError::ContextUnavailable(format!("cpal build stream error: {e}")))?;

    stream
        .play()
        .map_err(|e| ClockError::ContextUnavailable(format!("cpal play stream error: {e}")))?;

    Ok((stream, sample_rate))
}

impl AudioContext for CpalContext {
    fn current_time(&self) -> f64 {
        self.frames_played.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<(), ClockError> {
        match self.state {
            ContextState::Closed => Err(ClockError::ContextClosed),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.commands
                    .send(StreamCommand::Play)
                    .map_err(|_| ClockError::ContextClosed)?;
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }
        let _ = self.commands.send(StreamCommand::Pause);
        let _ = self.commands.send(StreamCommand::Close);
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
        self.mixer.lock().stop_all();
        self.state = ContextState::Closed;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_voice(&mut self, voice: VoiceSpec) -> VoiceId {
        self.mixer.lock().add(voice)
    }

    fn stop_voice(&mut self, id: VoiceId) {
        self.mixer.lock().stop(id);
    }

    fn set_voice_gain(&mut self, id: VoiceId, gain: f32) {
        self.mixer.lock().set_gain(id, gain);
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.mixer.lock().set_master_gain(gain);
    }
}

impl Drop for CpalContext {
    fn drop(&mut self) {
        self.close();
    }
}
