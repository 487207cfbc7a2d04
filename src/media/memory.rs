//! In-memory media element for headless playback and simulation.
//!
//! Holds the same state a browser element would expose and lets the host
//! drive loading, buffering and playback explicitly.

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::MediaError;
use crate::media::element::{MediaElement, MediaEvent, ReadyState, TimeRange};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug)]
struct State {
    src: Option<String>,
    ready_state: ReadyState,
    duration: f64,
    buffered: Vec<TimeRange>,
    error: Option<String>,
    current_time: f64,
    playback_rate: f64,
    opacity: f32,
    visible: bool,
    paused: bool,
    reject_play: Option<String>,
    preloaded_duration: Option<f64>,
    released: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            src: None,
            ready_state: ReadyState::HaveNothing,
            duration: f64::NAN,
            buffered: Vec::new(),
            error: None,
            current_time: 0.0,
            playback_rate: 1.0,
            opacity: 1.0,
            visible: true,
            paused: true,
            reject_play: None,
            preloaded_duration: None,
            released: false,
        }
    }
}

pub struct MemoryElement {
    state: Mutex<State>,
    events: broadcast::Sender<MediaEvent>,
}

impl MemoryElement {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            events,
        }
    }

    /// An element with `url` fully buffered
    pub fn loaded(url: &str, duration: f64) -> Self {
        let element = Self::new();
        element.set_src(url);
        element.finish_loading(duration);
        element
    }

    /// Make `load()` complete immediately with a fully buffered media of `duration`
    pub fn with_instant_load(self, duration: f64) -> Self {
        self.state.lock().preloaded_duration = Some(duration);
        self
    }

    /// Make subsequent `play()` calls fail, as an autoplay policy would
    pub fn reject_play(&self, reason: &str) {
        self.state.lock().reject_play = Some(reason.to_string());
    }

    pub fn set_metadata(&self, duration: f64) {
        {
            let mut state = self.state.lock();
            state.duration = duration;
            state.ready_state = state.ready_state.max(ReadyState::HaveMetadata);
        }
        self.emit(MediaEvent::LoadedMetadata);
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().ready_state = ready_state;
    }

    pub fn set_buffered(&self, ranges: Vec<TimeRange>) {
        self.state.lock().buffered = ranges;
    }

    /// Metadata, full buffer and `HaveEnoughData`, then `canplaythrough`
    pub fn finish_loading(&self, duration: f64) {
        {
            let mut state = self.state.lock();
            state.duration = duration;
            state.buffered = vec![TimeRange::new(0.0, duration)];
            state.ready_state = ReadyState::HaveEnoughData;
        }
        self.emit(MediaEvent::LoadedMetadata);
        self.emit(MediaEvent::CanPlayThrough);
    }

    pub fn fail(&self, message: &str) {
        self.state.lock().error = Some(message.to_string());
        self.emit(MediaEvent::Error(message.to_string()));
    }

    /// Advance the playhead by `wall_seconds` of real time at the current rate
    pub fn advance(&self, wall_seconds: f64) {
        let mut state = self.state.lock();
        if !state.paused {
            state.current_time += wall_seconds * state.playback_rate;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    pub fn emit(&self, event: MediaEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryElement {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaElement for MemoryElement {
    fn src(&self) -> Option<String> {
        self.state.lock().src.clone()
    }

    fn set_src(&self, url: &str) {
        let mut state = self.state.lock();
        let preloaded_duration = state.preloaded_duration;
        let reject_play = state.reject_play.take();
        *state = State {
            src: Some(url.to_string()),
            preloaded_duration,
            reject_play,
            ..State::default()
        };
    }

    fn load(&self) {
        let preloaded = self.state.lock().preloaded_duration;
        if let Some(duration) = preloaded {
            self.finish_loading(duration);
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.state.lock().buffered.clone()
    }

    fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, time: f64) {
        self.state.lock().current_time = time.max(0.0);
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().playback_rate = rate;
    }

    fn opacity(&self) -> f32 {
        self.state.lock().opacity
    }

    fn set_opacity(&self, opacity: f32) {
        self.state.lock().opacity = opacity.clamp(0.0, 1.0);
    }

    fn set_visible(&self, visible: bool) {
        self.state.lock().visible = visible;
    }

    fn play(&self) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.reject_play {
            return Err(MediaError::PlayRejected(reason.clone()));
        }
        if state.src.is_none() {
            return Err(MediaError::NoSource);
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.buffered.clear();
        state.ready_state = ReadyState::HaveNothing;
        state.src = None;
        state.paused = true;
        state.released = true;
    }
}
