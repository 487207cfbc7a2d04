//! Periodic drift monitoring against a sync manifest.
//!
//! Every tick compares where the active video element says it is with where
//! the master clock says the timeline is, corrects the video when needed, and
//! records the sample in a rolling history. The element is tracked together
//! with the clip it shows; while the clock is in another clip no sample is
//! taken, and within the boundary window samples are recorded uncorrected.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::audio::clock::MasterClock;
use crate::config::SyncConfig;
use crate::core::manifest::SyncManifest;
use crate::core::time::Seconds;
use crate::core::timing::calculate_clip_boundary;
use crate::media::element::MediaElement;
use crate::playback::sync::{get_expected_audio_position, DriftCorrection, DriftCorrector};

/// Source of truth for the timeline position
pub trait TimelineClock: Send + Sync {
    fn timeline_time(&self) -> Seconds;
    fn is_running(&self) -> bool;
    /// Rate the timeline advances at; video is corrected around it
    fn playback_rate(&self) -> f64;
}

impl TimelineClock for MasterClock {
    fn timeline_time(&self) -> Seconds {
        self.current_time()
    }

    fn is_running(&self) -> bool {
        self.is_playing()
    }

    fn playback_rate(&self) -> f64 {
        MasterClock::playback_rate(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftSample {
    pub clock_time: Seconds,
    pub track_id: String,
    /// Offset into the audio track the clock expects
    pub expected: Seconds,
    /// Offset into the audio track the video actually shows
    pub actual: Seconds,
    pub drift: Seconds,
    pub within_tolerance: bool,
}

/// Summary of the rolling drift history
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftStats {
    pub samples: usize,
    pub average: Seconds,
    pub max_abs: Seconds,
    pub out_of_tolerance: usize,
}

impl DriftStats {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a DriftSample>) -> Self {
        let mut stats = DriftStats::default();
        let mut total = 0.0;
        for sample in samples {
            stats.samples += 1;
            total += sample.drift;
            stats.max_abs = stats.max_abs.max(sample.drift.abs());
            if !sample.within_tolerance {
                stats.out_of_tolerance += 1;
            }
        }
        if stats.samples > 0 {
            stats.average = total / stats.samples as f64;
        }
        stats
    }
}

pub type DriftSampleCallback = Arc<dyn Fn(&DriftSample) + Send + Sync>;

struct TrackedElement {
    clip_id: String,
    element: Arc<dyn MediaElement>,
}

struct MonitorState {
    manifest: Arc<SyncManifest>,
    element: Option<TrackedElement>,
    history: VecDeque<DriftSample>,
    callback: Option<DriftSampleCallback>,
}

struct MonitorCore {
    clock: Arc<dyn TimelineClock>,
    corrector: DriftCorrector,
    history_len: usize,
    state: Mutex<MonitorState>,
}

impl MonitorCore {
    fn tick(&self) -> Option<DriftSample> {
        let (manifest, clip_id, element) = {
            let state = self.state.lock();
            let tracked = state.element.as_ref()?;
            (
                Arc::clone(&state.manifest),
                tracked.clip_id.clone(),
                Arc::clone(&tracked.element),
            )
        };

        let clock_time = self.clock.timeline_time();
        let Some(expected) = get_expected_audio_position(&manifest, clock_time) else {
            trace!(clock_time, "no audio track active; skipping drift sample");
            return None;
        };

        let boundary = calculate_clip_boundary(&manifest.video_tracks, clock_time);
        let clip = manifest.video_tracks.get(boundary.clip_index)?;
        if clip.id != clip_id {
            trace!(
                clock_time,
                element_clip = %clip_id,
                clock_clip = %clip.id,
                "clock left the element's clip; waiting for switch"
            );
            return None;
        }

        let actual_time = clip.start_time + element.current_time();
        let measurement = self.corrector.calculate_drift(clock_time, actual_time);
        let base_rate = self.clock.playback_rate();
        let off_rate = (element.playback_rate() - base_rate).abs() > f64::EPSILON;

        if boundary.at_boundary {
            trace!(clock_time, clip_id = %clip.id, "at clip boundary; sample left uncorrected");
        } else if !measurement.within_tolerance || off_rate {
            let correction =
                self.corrector
                    .correct_drift_at_rate(element.as_ref(), measurement.drift, base_rate);
            if let DriftCorrection::HardSeek { to } = correction {
                debug!(clip_id = %clip.id, to, "monitor hard-seeked video");
            }
        }

        let sample = DriftSample {
            clock_time,
            track_id: expected.track_id,
            expected: expected.offset,
            actual: expected.offset + measurement.drift,
            drift: measurement.drift,
            within_tolerance: measurement.within_tolerance,
        };

        let callback = {
            let mut state = self.state.lock();
            if state.history.len() == self.history_len {
                state.history.pop_front();
            }
            state.history.push_back(sample.clone());
            state.callback.clone()
        };
        if let Some(callback) = callback {
            callback(&sample);
        }
        Some(sample)
    }
}

/// Drift monitor polling at a fixed cadence until stopped
pub struct AudioSyncMonitor {
    core: Arc<MonitorCore>,
    interval: std::time::Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AudioSyncMonitor {
    pub fn new(
        clock: Arc<dyn TimelineClock>,
        manifest: Arc<SyncManifest>,
        config: &SyncConfig,
    ) -> Self {
        let history_len = config.drift_history_len.max(1);
        Self {
            core: Arc::new(MonitorCore {
                clock,
                corrector: DriftCorrector::new(config),
                history_len,
                state: Mutex::new(MonitorState {
                    manifest,
                    element: None,
                    history: VecDeque::with_capacity(history_len),
                    callback: None,
                }),
            }),
            interval: config.monitor_interval(),
            task: Mutex::new(None),
        }
    }

    /// Element currently showing clip `clip_id` of the manifest
    pub fn set_element(&self, clip_id: impl Into<String>, element: Arc<dyn MediaElement>) {
        self.core.state.lock().element = Some(TrackedElement {
            clip_id: clip_id.into(),
            element,
        });
    }

    /// Stop sampling until the next `set_element`
    pub fn clear_element(&self) {
        self.core.state.lock().element = None;
    }

    pub fn set_manifest(&self, manifest: Arc<SyncManifest>) {
        let mut state = self.core.state.lock();
        state.manifest = manifest;
        state.history.clear();
    }

    /// Called with every sample, in or out of tolerance
    pub fn on_drift(&self, callback: impl Fn(&DriftSample) + Send + Sync + 'static) {
        self.core.state.lock().callback = Some(Arc::new(callback));
    }

    /// Take one sample now
    pub fn tick(&self) -> Option<DriftSample> {
        self.core.tick()
    }

    /// Start polling on the current tokio runtime. Returns false outside a runtime.
    pub fn start(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let weak: Weak<MonitorCore> = Arc::downgrade(&self.core);
        let interval = self.interval;

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(core) = weak.upgrade() else {
                    break;
                };
                if core.clock.is_running() {
                    core.tick();
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
        debug!(interval_ms = interval.as_millis() as u64, "drift monitor started");
        true
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("drift monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn history(&self) -> Vec<DriftSample> {
        self.core.state.lock().history.iter().cloned().collect()
    }

    pub fn stats(&self) -> DriftStats {
        DriftStats::from_samples(self.core.state.lock().history.iter())
    }
}

impl Drop for AudioSyncMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clip::ClipInput;
    use crate::core::track::{AudioTrack, TrackType};
    use crate::media::memory::MemoryElement;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClock {
        time: Mutex<Seconds>,
        rate: f64,
    }

    impl FixedClock {
        fn at(time: Seconds, rate: f64) -> Arc<Self> {
            Arc::new(Self {
                time: Mutex::new(time),
                rate,
            })
        }

        fn set(&self, time: Seconds) {
            *self.time.lock() = time;
        }
    }

    impl TimelineClock for FixedClock {
        fn timeline_time(&self) -> Seconds {
            *self.time.lock()
        }

        fn is_running(&self) -> bool {
            true
        }

        fn playback_rate(&self) -> f64 {
            self.rate
        }
    }

    fn manifest() -> Arc<SyncManifest> {
        Arc::new(SyncManifest::build(
            &[ClipInput::new("a", "a.mp4", 5.0), ClipInput::new("b", "b.mp4", 5.0)],
            vec![AudioTrack::new("vo", "vo.wav", TrackType::Voice, 0.0, 8.0)],
        ))
    }

    fn setup(clock_time: Seconds) -> (Arc<FixedClock>, AudioSyncMonitor, Arc<MemoryElement>) {
        let clock = FixedClock::at(clock_time, 1.0);
        let monitor = AudioSyncMonitor::new(clock.clone(), manifest(), &SyncConfig::default());
        let video = Arc::new(MemoryElement::loaded("b.mp4", 5.0));
        monitor.set_element("b", video.clone());
        (clock, monitor, video)
    }

    #[test]
    fn test_in_tolerance_sample_leaves_video_alone() {
        let (_clock, monitor, video) = setup(6.0);
        video.set_current_time(1.02);

        let sample = monitor.tick().unwrap();
        assert_eq!(sample.track_id, "vo");
        assert!((sample.drift - 0.02).abs() < 1e-9);
        assert!(sample.within_tolerance);
        assert_eq!(video.playback_rate(), 1.0);
        assert_eq!(video.current_time(), 1.02);
    }

    #[test]
    fn test_out_of_tolerance_is_corrected() {
        let (_clock, monitor, video) = setup(6.0);

        video.set_current_time(1.2);
        let sample = monitor.tick().unwrap();
        assert!(!sample.within_tolerance);
        assert!(video.playback_rate() < 1.0);

        video.set_current_time(2.0);
        monitor.tick().unwrap();
        assert!((video.current_time() - 1.0).abs() < 1e-9);
        assert_eq!(video.playback_rate(), 1.0);
    }

    #[test]
    fn test_no_active_track_skips() {
        let (clock, monitor, _video) = setup(9.0);
        assert!(monitor.tick().is_none());
        clock.set(2.0);
        monitor.clear_element();
        assert!(monitor.tick().is_none());
        assert_eq!(monitor.stats().samples, 0);
    }

    #[test]
    fn test_history_is_bounded_and_callback_sees_every_sample() {
        let (_clock, monitor, video) = setup(6.0);
        video.set_current_time(1.0);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        monitor.on_drift(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..75 {
            monitor.tick();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 75);
        assert_eq!(monitor.history().len(), 60);
        let stats = monitor.stats();
        assert_eq!(stats.samples, 60);
        assert_eq!(stats.out_of_tolerance, 0);
    }

    #[test]
    fn test_stats() {
        let sample = |drift: f64, within_tolerance| DriftSample {
            clock_time: 0.0,
            track_id: "vo".into(),
            expected: 0.0,
            actual: drift,
            drift,
            within_tolerance,
        };
        let samples = [sample(0.02, true), sample(-0.2, false), sample(0.06, false)];
        let stats = DriftStats::from_samples(samples.iter());
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.out_of_tolerance, 2);
        assert!((stats.max_abs - 0.2).abs() < 1e-9);
        assert!((stats.average + 0.04).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_stopped() {
        let (_clock, monitor, video) = setup(6.0);
        video.set_current_time(1.0);

        assert!(monitor.start());
        tokio::time::sleep(std::time::Duration::from_millis(450)).await;
        let polled = monitor.history().len();
        assert!((4..=6).contains(&polled));

        monitor.stop();
        assert!(!monitor.is_running());
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(monitor.history().len(), polled);
    }

    #[test]
    fn test_video_tracks_a_fast_clock() {
        let clock = FixedClock::at(5.5, 2.0);
        let monitor = AudioSyncMonitor::new(clock.clone(), manifest(), &SyncConfig::default());
        let video = Arc::new(MemoryElement::loaded("b.mp4", 5.0));
        video.set_current_time(0.5);
        video.play().unwrap();
        monitor.set_element("b", video.clone());

        for step in 0..10 {
            let sample = monitor.tick().unwrap();
            assert!(sample.within_tolerance, "step {step}: drift {}", sample.drift);
            assert!((video.playback_rate() - 2.0).abs() < 1e-9, "step {step}");

            // 100ms of wall time at 2x
            clock.set(5.5 + 0.2 * (step + 1) as f64);
            video.advance(0.1);
        }
        assert_eq!(monitor.stats().out_of_tolerance, 0);
    }

    #[test]
    fn test_outgoing_clip_is_left_alone_past_its_end() {
        let clock = FixedClock::at(5.02, 1.0);
        let monitor = AudioSyncMonitor::new(clock.clone(), manifest(), &SyncConfig::default());
        let outgoing = Arc::new(MemoryElement::loaded("a.mp4", 5.0));
        outgoing.set_current_time(5.0);
        monitor.set_element("a", outgoing.clone());

        assert!(monitor.tick().is_none());
        assert_eq!(outgoing.current_time(), 5.0);
        assert_eq!(outgoing.playback_rate(), 1.0);
        assert!(monitor.history().is_empty());
    }

    #[test]
    fn test_boundary_window_records_without_correcting() {
        let clock = FixedClock::at(4.98, 1.0);
        let monitor = AudioSyncMonitor::new(clock.clone(), manifest(), &SyncConfig::default());
        let video = Arc::new(MemoryElement::loaded("a.mp4", 5.0));
        video.set_current_time(4.0);
        monitor.set_element("a", video.clone());

        let sample = monitor.tick().unwrap();
        assert!(!sample.within_tolerance);
        assert_eq!(video.current_time(), 4.0);
        assert_eq!(video.playback_rate(), 1.0);

        // Once the clock is clear of the edge the same gap is corrected.
        clock.set(4.5);
        video.set_current_time(3.5);
        monitor.tick().unwrap();
        assert!((video.current_time() - 4.5).abs() < 1e-9);
    }
}
