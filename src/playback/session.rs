//! Playback session: one master clock, one manifest, one active video element.
//!
//! The session is the single construction point for the clock. Nothing here
//! is global, so two sessions never share timing state.

use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::clock::MasterClock;
use crate::audio::context::ContextFactory;
use crate::config::SyncConfig;
use crate::core::manifest::SyncManifest;
use crate::core::time::Seconds;
use crate::error::ClockError;
use crate::fetch::Fetcher;
use crate::media::element::MediaElement;
use crate::playback::monitor::{AudioSyncMonitor, DriftSample, DriftStats};
use crate::playback::transition::{select_transition, TransitionOutcome};

pub struct PlaybackSession {
    config: SyncConfig,
    clock: MasterClock,
    manifest: Arc<SyncManifest>,
    monitor: AudioSyncMonitor,
    active: Option<Arc<dyn MediaElement>>,
    /// Clip the active element was aligned to when it took over
    active_clip: Option<String>,
}

impl PlaybackSession {
    pub fn new(config: SyncConfig, factory: ContextFactory, fetcher: Arc<dyn Fetcher>) -> Self {
        let clock = MasterClock::new(config.clone(), factory, fetcher);
        let manifest = Arc::new(SyncManifest::default());
        let monitor = AudioSyncMonitor::new(Arc::new(clock.clone()), Arc::clone(&manifest), &config);
        Self {
            config,
            clock,
            manifest,
            monitor,
            active: None,
            active_clip: None,
        }
    }

    pub fn clock(&self) -> &MasterClock {
        &self.clock
    }

    pub fn manifest(&self) -> &Arc<SyncManifest> {
        &self.manifest
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Replace the manifest and reload its audio tracks. Returns how many tracks loaded.
    pub async fn load(&mut self, manifest: SyncManifest) -> usize {
        let manifest = Arc::new(manifest);
        self.clock.clear_tracks();
        let loaded = self.clock.load_tracks(manifest.audio_tracks.clone()).await;
        self.monitor.set_manifest(Arc::clone(&manifest));
        info!(
            clips = manifest.video_tracks.len(),
            tracks = manifest.audio_tracks.len(),
            loaded,
            total_duration = manifest.total_duration,
            "manifest loaded"
        );
        self.manifest = manifest;
        loaded
    }

    /// Hand the screen to `incoming`, atomically if it is ready and by crossfade otherwise.
    pub async fn switch_to(&mut self, incoming: Arc<dyn MediaElement>) -> TransitionOutcome {
        let time = self.clock.current_time();
        let clip_id = self.manifest.clip_at(time).map(|clip| clip.id.clone());
        self.align(incoming.as_ref(), time);
        incoming.set_playback_rate(self.clock.playback_rate());
        let strategy = select_transition(incoming.as_ref(), &self.config);
        let outcome = strategy
            .execute(self.active.as_deref(), incoming.as_ref())
            .await;
        debug!(kind = ?outcome.kind, clip_id = ?clip_id, "clip switched");

        match &clip_id {
            Some(clip_id) => self.monitor.set_element(clip_id.clone(), Arc::clone(&incoming)),
            None => self.monitor.clear_element(),
        }
        self.active = Some(incoming);
        self.active_clip = clip_id;
        outcome
    }

    pub fn active_element(&self) -> Option<&Arc<dyn MediaElement>> {
        self.active.as_ref()
    }

    /// Put `element` at the clip-local position for timeline time `time`
    fn align(&self, element: &dyn MediaElement, time: Seconds) {
        if let Some(clip) = self.manifest.clip_at(time) {
            element.set_current_time(time - clip.start_time);
        }
    }

    /// Clip the active element shows, if any
    pub fn active_clip(&self) -> Option<&str> {
        self.active_clip.as_deref()
    }

    /// Re-align the active element if the clock is still inside its clip.
    /// Outside it the element is left alone until `switch_to` installs the next one.
    fn align_active(&self, element: &dyn MediaElement) {
        let time = self.clock.current_time();
        match self.manifest.clip_at(time) {
            Some(clip) if Some(clip.id.as_str()) == self.active_clip.as_deref() => {
                element.set_current_time(time - clip.start_time);
            }
            _ => debug!(time, "clock outside the active clip; awaiting switch"),
        }
    }

    pub fn play(&self, from_time: Option<Seconds>) -> Result<(), ClockError> {
        self.clock.play(from_time)?;
        if let Some(element) = &self.active {
            self.align_active(element.as_ref());
            if let Err(err) = element.play() {
                debug!(error = %err, "active element play() rejected");
            }
        }
        Ok(())
    }

    pub fn pause(&self) {
        self.clock.pause();
        if let Some(element) = &self.active {
            element.pause();
        }
    }

    pub fn seek(&self, time: Seconds) {
        self.clock.seek(time);
        if let Some(element) = &self.active {
            self.align_active(element.as_ref());
        }
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.clock.set_playback_rate(rate);
        if let Some(element) = &self.active {
            element.set_playback_rate(self.clock.playback_rate());
        }
    }

    pub fn on_drift(&self, callback: impl Fn(&DriftSample) + Send + Sync + 'static) {
        self.monitor.on_drift(callback);
    }

    pub fn start_monitoring(&self) -> bool {
        self.monitor.start()
    }

    pub fn stop_monitoring(&self) {
        self.monitor.stop();
    }

    pub fn check_drift(&self) -> Option<DriftSample> {
        self.monitor.tick()
    }

    pub fn drift_stats(&self) -> DriftStats {
        self.monitor.stats()
    }

    /// Stop monitoring and tear down the clock. The active element stays
    /// owned by whoever created it and is only paused here.
    pub fn destroy(&mut self) {
        self.monitor.stop();
        self.monitor.clear_element();
        self.active_clip = None;
        if let Some(element) = self.active.take() {
            element.pause();
        }
        self.clock.destroy();
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBuffer;
    use crate::audio::context::{AudioContext, ContextState, ManualContext};
    use crate::core::clip::ClipInput;
    use crate::core::track::{AudioTrack, TrackType};
    use crate::fetch::MemoryFetcher;
    use crate::media::memory::MemoryElement;
    use crate::playback::transition::TransitionKind;

    fn session(context: &ManualContext) -> PlaybackSession {
        PlaybackSession::new(
            SyncConfig::default(),
            context.factory(),
            Arc::new(MemoryFetcher::new()),
        )
    }

    fn clips() -> Vec<ClipInput> {
        vec![
            ClipInput::new("a", "a.mp4", 5.0),
            ClipInput::new("b", "b.mp4", 5.0),
            ClipInput::new("c", "c.mp4", 5.0),
        ]
    }

    #[tokio::test]
    async fn test_load_replaces_tracks() {
        let context = ManualContext::new(1_000);
        let mut session = session(&context);
        session
            .clock()
            .load_decoded(
                AudioTrack::new("old", "old.wav", TrackType::Music, 0.0, 1.0),
                AudioBuffer::silent(1.0, 1_000, 1),
            );

        // nothing fetchable: tracks are absent, not an error
        let loaded = session
            .load(SyncManifest::build(
                &clips(),
                vec![AudioTrack::new("vo", "missing.wav", TrackType::Voice, 0.0, 5.0)],
            ))
            .await;
        assert_eq!(loaded, 0);
        assert_eq!(session.clock().track_count(), 0);
        assert_eq!(session.manifest().total_duration, 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_aligns_and_plays() {
        let context = ManualContext::new(1_000);
        let mut session = session(&context);
        session.load(SyncManifest::build(&clips(), Vec::new())).await;

        let first: Arc<dyn MediaElement> = Arc::new(MemoryElement::loaded("a.mp4", 5.0));
        let outcome = session.switch_to(Arc::clone(&first)).await;
        assert_eq!(outcome.kind, TransitionKind::Atomic);

        session.play(Some(6.5)).unwrap();
        let second: Arc<dyn MediaElement> = Arc::new(MemoryElement::loaded("b.mp4", 5.0));
        session.switch_to(Arc::clone(&second)).await;

        assert_eq!(second.current_time(), 1.5);
        assert!(!second.is_paused());
        assert!(first.is_paused());
    }

    #[tokio::test]
    async fn test_destroy_twice() {
        let context = ManualContext::new(1_000);
        let mut session = session(&context);
        session.play(Some(0.0)).unwrap();
        session.start_monitoring();

        session.destroy();
        session.destroy();
        assert_eq!(context.state(), ContextState::Closed);
        assert!(!session.clock().is_playing());
    }
}
