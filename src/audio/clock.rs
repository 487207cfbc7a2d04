//! Master clock: the single timing authority for a playback session.
//!
//! Time comes from the audio context, never from a video element. Every
//! track started by one `play()` is scheduled against the same context
//! instant, so tracks stay sample-aligned with each other. Video follows
//! audio, never the reverse.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::buffer::AudioBuffer;
use crate::audio::context::{AudioContext, ContextFactory, ContextState};
use crate::audio::decode::{decode_audio, extension_hint};
use crate::audio::envelope::GainEnvelope;
use crate::audio::mixer::{VoiceId, VoiceSpec};
use crate::config::SyncConfig;
use crate::core::time::{from_millis, Seconds};
use crate::core::track::{AudioTrack, TrackPlacement, TrackType};
use crate::error::ClockError;
use crate::fetch::{fetch_with_deadline, Fetcher};
use crate::media::element::MediaElement;
use crate::playback::state::{clamp_playback_rate, ClockState, PlaybackState};

pub type TimeUpdateCallback = Arc<dyn Fn(Seconds) + Send + Sync>;
pub type DriftCallback = Arc<dyn Fn(Seconds) + Send + Sync>;

struct LoadedTrack {
    track: AudioTrack,
    buffer: Arc<AudioBuffer>,
}

struct ClockInner {
    config: SyncConfig,
    context: Option<Box<dyn AudioContext>>,
    state: PlaybackState,
    playback_rate: f64,
    drift: f64,
    master_volume: f32,
    tracks: Vec<LoadedTrack>,
    /// (index into `tracks`, voice) for every scheduled source
    active_voices: Vec<(usize, VoiceId)>,
    volume_overrides: HashMap<String, f32>,
    muted_types: HashSet<TrackType>,
    on_time_update: Option<TimeUpdateCallback>,
    on_drift_detected: Option<DriftCallback>,
}

impl ClockInner {
    fn context_time(&self) -> f64 {
        self.context
            .as_ref()
            .map(|context| context.current_time())
            .unwrap_or(0.0)
    }

    fn position(&self) -> Seconds {
        self.state
            .current_position(self.context_time(), self.playback_rate)
    }

    fn gain_for(&self, track: &AudioTrack) -> f32 {
        if self.muted_types.contains(&track.track_type) {
            return 0.0;
        }
        self.volume_overrides
            .get(&track.id)
            .copied()
            .unwrap_or(track.volume)
    }

    fn stop_voices(&mut self) {
        let voices: Vec<_> = self.active_voices.drain(..).collect();
        if let Some(context) = self.context.as_mut() {
            for (_, voice) in voices {
                context.stop_voice(voice);
            }
        }
    }

    fn schedule_track(&mut self, index: usize, from: Seconds) {
        let Some(loaded) = self.tracks.get(index) else {
            return;
        };
        let gain = self.gain_for(&loaded.track);
        let rate = self.playback_rate;
        let Some(context) = self.context.as_mut() else {
            return;
        };
        let now = context.current_time();

        if let Some(voice) = plan_voice(&loaded.track, &loaded.buffer, from, now, rate, gain) {
            let id = context.start_voice(voice);
            self.active_voices.push((index, id));
        }
    }

    fn schedule_all(&mut self, from: Seconds) {
        for index in 0..self.tracks.len() {
            self.schedule_track(index, from);
        }
        debug!(
            from,
            scheduled = self.active_voices.len(),
            tracks = self.tracks.len(),
            "audio tracks scheduled"
        );
    }

    fn refresh_gains(&mut self) {
        let updates: Vec<(VoiceId, f32)> = self
            .active_voices
            .iter()
            .filter_map(|(index, voice)| {
                self.tracks
                    .get(*index)
                    .map(|loaded| (*voice, self.gain_for(&loaded.track)))
            })
            .collect();
        if let Some(context) = self.context.as_mut() {
            for (voice, gain) in updates {
                context.set_voice_gain(voice, gain);
            }
        }
    }
}

/// Plan the voice for `track` when playback starts at timeline position `from`.
///
/// `now` is the context time of the start instant. Returns `None` for tracks
/// that have already ended. Fades are linear ramps anchored to context time.
pub fn plan_voice(
    track: &AudioTrack,
    buffer: &Arc<AudioBuffer>,
    from: Seconds,
    now: f64,
    rate: f64,
    gain: f32,
) -> Option<VoiceSpec> {
    let (when, offset) = match track.placement(from) {
        TrackPlacement::Upcoming { delay } => (now + delay / rate, 0.0),
        TrackPlacement::Active { offset } => (now, offset),
        TrackPlacement::Ended => return None,
    };

    let play_len = track.duration.min(buffer.duration());
    if offset >= play_len {
        return None;
    }

    // Context time at which track-local time `tau` is heard.
    let at = |tau: f64| now + (track.start_time + tau - from) / rate;

    Some(VoiceSpec {
        buffer: Arc::clone(buffer),
        when,
        offset,
        duration: Some(play_len - offset),
        playback_rate: rate,
        envelope: fade_envelope(track, offset, play_len, at),
        gain,
    })
}

/// Fade shape (0..1) at track-local time `tau`
fn fade_shape(fade_in: Option<f64>, fade_out: Option<f64>, play_len: f64, tau: f64) -> f32 {
    let fade_in = fade_in
        .filter(|f| *f > 0.0)
        .map(|f| (tau / f).clamp(0.0, 1.0))
        .unwrap_or(1.0);
    let fade_out = fade_out
        .filter(|f| *f > 0.0)
        .map(|f| ((play_len - tau) / f).clamp(0.0, 1.0))
        .unwrap_or(1.0);
    fade_in.min(fade_out) as f32
}

fn fade_envelope(
    track: &AudioTrack,
    offset: f64,
    play_len: f64,
    at: impl Fn(f64) -> f64,
) -> GainEnvelope {
    let fade_in = track.fade_in.filter(|f| *f > 0.0);
    let fade_out = track.fade_out.filter(|f| *f > 0.0);
    let shape = |tau: f64| fade_shape(fade_in, fade_out, play_len, tau);

    let mut envelope = GainEnvelope::constant(shape(offset));
    if fade_in.is_none() && fade_out.is_none() {
        return envelope;
    }

    // Breakpoints of min(fade-in ramp, fade-out ramp), including where they cross.
    let mut breakpoints = vec![play_len];
    if let Some(fi) = fade_in {
        breakpoints.push(fi);
    }
    if let Some(fo) = fade_out {
        breakpoints.push(play_len - fo);
    }
    if let (Some(fi), Some(fo)) = (fade_in, fade_out) {
        breakpoints.push(play_len * fi / (fi + fo));
    }
    breakpoints.retain(|tau| *tau > offset && *tau <= play_len);
    breakpoints.sort_by(f64::total_cmp);
    breakpoints.dedup();

    envelope.set_value_at(shape(offset), at(offset));
    for tau in breakpoints {
        envelope.linear_ramp_to(shape(tau), at(tau));
    }
    envelope
}

/// Session-scoped master clock handle. Clones share the same clock.
#[derive(Clone)]
pub struct MasterClock {
    inner: Arc<Mutex<ClockInner>>,
    factory: Arc<ContextFactory>,
    fetcher: Arc<dyn Fetcher>,
    /// Cancelled by `destroy` to abandon track fetches still in flight
    loads: Arc<Mutex<CancellationToken>>,
    update_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MasterClock {
    pub fn new(config: SyncConfig, factory: ContextFactory, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                config,
                context: None,
                state: PlaybackState::Uninitialized,
                playback_rate: 1.0,
                drift: 0.0,
                master_volume: 1.0,
                tracks: Vec::new(),
                active_voices: Vec::new(),
                volume_overrides: HashMap::new(),
                muted_types: HashSet::new(),
                on_time_update: None,
                on_drift_detected: None,
            })),
            factory: Arc::new(factory),
            fetcher,
            loads: Arc::new(Mutex::new(CancellationToken::new())),
            update_loop: Arc::new(Mutex::new(None)),
        }
    }

    /// Create the audio context and master gain. Returns false if no context could be created.
    pub fn initialize(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.context.is_some() {
            return true;
        }

        match (self.factory)() {
            Ok(context) if context.state() == ContextState::Closed => {
                error!("audio context factory returned a closed context; session has no master clock");
                false
            }
            Ok(mut context) => {
                context.set_master_gain(inner.master_volume);
                info!(
                    sample_rate = context.sample_rate(),
                    state = ?context.state(),
                    "audio context created"
                );
                inner.context = Some(context);
                if inner.state == PlaybackState::Uninitialized {
                    inner.state = PlaybackState::Initialized;
                }
                true
            }
            Err(err) => {
                error!(error = %err, "audio context creation failed; session has no master clock");
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().context.is_some()
    }

    /// Resume a suspended context. Call from a user-gesture handler.
    pub fn resume(&self) -> Result<(), ClockError> {
        if !self.initialize() {
            return Err(ClockError::ContextUnavailable("initialization failed".into()));
        }
        let mut inner = self.inner.lock();
        match inner.context.as_mut() {
            Some(context) => context.resume(),
            None => Err(ClockError::ContextClosed),
        }
    }

    /// Fetch, decode and add a track. Failures are logged and leave the track out.
    pub async fn load_track(&self, track: AudioTrack) -> bool {
        let cancel = self.loads.lock().clone();
        let timeout = self.inner.lock().config.fetch_timeout();
        let fetched = fetch_with_deadline(self.fetcher.as_ref(), &track.url, timeout, &cancel).await;
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(track_id = %track.id, error = %err, "audio track failed to load; playing without it");
                return false;
            }
        };

        let extension = extension_hint(&track.url).map(str::to_owned);
        let decoded =
            tokio::task::spawn_blocking(move || decode_audio(bytes, extension.as_deref())).await;

        match decoded {
            Ok(Ok(buffer)) => {
                self.load_decoded(track, buffer);
                true
            }
            Ok(Err(err)) => {
                warn!(track_id = %track.id, error = %err, "audio track failed to decode; playing without it");
                false
            }
            Err(err) => {
                warn!(track_id = %track.id, error = %err, "audio decode task failed");
                false
            }
        }
    }

    /// Load tracks in order; returns how many loaded
    pub async fn load_tracks(&self, tracks: Vec<AudioTrack>) -> usize {
        let mut loaded = 0;
        for track in tracks {
            if self.load_track(track).await {
                loaded += 1;
            }
        }
        loaded
    }

    /// Add an already decoded track. Scheduled immediately if the clock is running.
    pub fn load_decoded(&self, track: AudioTrack, buffer: AudioBuffer) {
        let mut inner = self.inner.lock();
        debug!(track_id = %track.id, seconds = buffer.duration(), "audio track loaded");
        inner.tracks.push(LoadedTrack {
            track,
            buffer: Arc::new(buffer),
        });
        if inner.state.is_playing() {
            let position = inner.position();
            let index = inner.tracks.len() - 1;
            inner.schedule_track(index, position);
        }
    }

    /// Stop and drop every loaded track, ahead of a wholesale reload
    pub fn clear_tracks(&self) {
        let mut inner = self.inner.lock();
        inner.stop_voices();
        inner.tracks.clear();
    }

    pub fn track_count(&self) -> usize {
        self.inner.lock().tracks.len()
    }

    /// Start playing from `from_time`, or from the paused position.
    pub fn play(&self, from_time: Option<Seconds>) -> Result<(), ClockError> {
        if !self.initialize() {
            return Err(ClockError::ContextUnavailable("initialization failed".into()));
        }

        {
            let mut inner = self.inner.lock();
            if let Some(context) = inner.context.as_mut() {
                if context.state() == ContextState::Suspended {
                    if let Err(err) = context.resume() {
                        warn!(error = %err, "audio context still suspended; resume() after a user gesture");
                    }
                }
            }

            let position = from_time.unwrap_or_else(|| inner.position()).max(0.0);
            let now = inner.context_time();
            let rate = inner.playback_rate;

            inner.stop_voices();
            inner.state = PlaybackState::anchor(position, now, rate);
            inner.schedule_all(position);
            debug!(position, rate, "master clock playing");
        }

        self.start_update_loop();
        Ok(())
    }

    /// Freeze at the current position; a later `play(None)` resumes exactly here.
    pub fn pause(&self) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.is_playing() {
                return;
            }
            let position = inner.position();
            inner.stop_voices();
            inner.state = PlaybackState::Paused { position };
            debug!(position, "master clock paused");
        }
        self.stop_update_loop();
    }

    pub fn seek(&self, time: Seconds) {
        let time = time.max(0.0);
        let playing = self.inner.lock().state.is_playing();
        if playing {
            self.pause();
            if let Err(err) = self.play(Some(time)) {
                warn!(error = %err, "resume after seek failed");
            }
        } else {
            self.inner.lock().state = PlaybackState::Paused { position: time };
        }
    }

    /// Clamp to [0.25, 4] and re-anchor so the current position does not jump.
    pub fn set_playback_rate(&self, rate: f64) {
        let rate = clamp_playback_rate(rate);
        let mut inner = self.inner.lock();
        if inner.state.is_playing() {
            let position = inner.position();
            let now = inner.context_time();
            inner.playback_rate = rate;
            inner.state = PlaybackState::anchor(position, now, rate);
            inner.stop_voices();
            inner.schedule_all(position);
        } else {
            inner.playback_rate = rate;
        }
    }

    pub fn current_time(&self) -> Seconds {
        self.inner.lock().position()
    }

    pub fn playback_rate(&self) -> f64 {
        self.inner.lock().playback_rate
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().state.is_playing()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn state(&self) -> ClockState {
        let inner = self.inner.lock();
        ClockState {
            current_time: inner.position(),
            is_playing: inner.state.is_playing(),
            playback_rate: inner.playback_rate,
            drift: inner.drift,
            audio_context_state: inner.context.as_ref().map(|context| context.state()),
        }
    }

    pub fn set_track_volume(&self, track_id: &str, volume: f32) {
        let mut inner = self.inner.lock();
        inner
            .volume_overrides
            .insert(track_id.to_string(), volume.clamp(0.0, 1.0));
        inner.refresh_gains();
    }

    pub fn mute_track_type(&self, track_type: TrackType, muted: bool) {
        let mut inner = self.inner.lock();
        if muted {
            inner.muted_types.insert(track_type);
        } else {
            inner.muted_types.remove(&track_type);
        }
        inner.refresh_gains();
    }

    pub fn set_master_volume(&self, volume: f32) {
        let mut inner = self.inner.lock();
        inner.master_volume = volume.clamp(0.0, 1.0);
        let volume = inner.master_volume;
        if let Some(context) = inner.context.as_mut() {
            context.set_master_gain(volume);
        }
    }

    pub fn on_time_update(&self, callback: impl Fn(Seconds) + Send + Sync + 'static) {
        self.inner.lock().on_time_update = Some(Arc::new(callback));
    }

    pub fn on_drift_detected(&self, callback: impl Fn(Seconds) + Send + Sync + 'static) {
        self.inner.lock().on_drift_detected = Some(Arc::new(callback));
    }

    /// Snap `element` to the audio clock if it drifted past the sync threshold.
    ///
    /// Returns the measured drift (video minus audio). Audio is the ground
    /// truth: only the video position is ever changed.
    pub fn sync_with_video<E: MediaElement + ?Sized>(&self, element: &E) -> Seconds {
        let (audio_time, threshold) = {
            let inner = self.inner.lock();
            if inner.context.is_none() {
                return 0.0;
            }
            (inner.position(), from_millis(inner.config.clock_sync_threshold_ms))
        };

        let video_time = element.current_time();
        let drift = video_time - audio_time;

        let callback = {
            let mut inner = self.inner.lock();
            inner.drift = drift;
            inner.on_drift_detected.clone()
        };

        if drift.abs() > threshold {
            element.set_current_time(audio_time);
            info!(drift, audio_time, "video resynced to master clock");
            if let Some(callback) = callback {
                callback(drift);
            }
        }
        drift
    }

    /// Run one update step: report the current time to `on_time_update`.
    /// Returns `None` when the clock is not playing.
    pub fn tick(&self) -> Option<Seconds> {
        tick(&self.inner)
    }

    fn start_update_loop(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime; drive time updates with tick()");
            return;
        };
        let interval = self.inner.lock().config.update_interval();
        let weak: Weak<Mutex<ClockInner>> = Arc::downgrade(&self.inner);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if tick(&inner).is_none() {
                    break;
                }
            }
        });

        if let Some(previous) = self.update_loop.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop_update_loop(&self) {
        if let Some(task) = self.update_loop.lock().take() {
            task.abort();
        }
    }

    /// Stop everything and close the context. Safe to call repeatedly.
    pub fn destroy(&self) {
        self.stop_update_loop();
        std::mem::replace(&mut *self.loads.lock(), CancellationToken::new()).cancel();

        let mut inner = self.inner.lock();
        inner.stop_voices();
        if let Some(mut context) = inner.context.take() {
            context.close();
            info!("audio context closed");
        }
        inner.tracks.clear();
        inner.volume_overrides.clear();
        inner.muted_types.clear();
        inner.on_time_update = None;
        inner.on_drift_detected = None;
        inner.state = PlaybackState::Uninitialized;
        inner.drift = 0.0;
    }
}

fn tick(inner: &Mutex<ClockInner>) -> Option<Seconds> {
    let (time, callback) = {
        let inner = inner.lock();
        if !inner.state.is_playing() {
            return None;
        }
        (inner.position(), inner.on_time_update.clone())
    };
    // Callback runs unlocked so it may call back into the clock.
    if let Some(callback) = callback {
        callback(time);
    }
    Some(time)
}
