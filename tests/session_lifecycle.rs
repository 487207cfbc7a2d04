use std::sync::Arc;

use reelsync::audio::{AudioContext, ContextState, ManualContext};
use reelsync::core::{AudioTrack, ClipInput, SyncManifest, TrackType};
use reelsync::media::{MediaElement, MemoryElement};
use reelsync::playback::{PlaybackSession, TransitionKind};
use reelsync::{MemoryFetcher, SyncConfig};

const SAMPLE_RATE: u32 = 8_000;

/// Mono 16-bit PCM WAV of `seconds` of a quiet square wave
fn wav(seconds: u32) -> Vec<u8> {
    let samples: Vec<i16> = (0..SAMPLE_RATE * seconds)
        .map(|i| if (i / 40) % 2 == 0 { 2_000 } else { -2_000 })
        .collect();
    let data_len = (samples.len() * 2) as u32;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

fn manifest() -> SyncManifest {
    SyncManifest::build(
        &[
            ClipInput::new("clip-1", "clip-1.mp4", 5.0),
            ClipInput::new("clip-2", "clip-2.mp4", 5.0),
            ClipInput::new("clip-3", "clip-3.mp4", 5.0),
        ],
        vec![
            AudioTrack::new("narration", "narration.wav", TrackType::Voice, 0.0, 15.0),
            AudioTrack::new("score", "missing.wav", TrackType::Music, 0.0, 15.0),
        ],
    )
}

fn session(context: &ManualContext) -> PlaybackSession {
    let fetcher = MemoryFetcher::new();
    fetcher.insert("narration.wav", wav(15));
    PlaybackSession::new(SyncConfig::default(), context.factory(), Arc::new(fetcher))
}

#[tokio::test]
async fn test_session_lifecycle() {
    let context = ManualContext::new(SAMPLE_RATE);
    let mut session = session(&context);

    // The missing score is skipped; playback continues with narration only.
    assert_eq!(session.load(manifest()).await, 1);
    assert_eq!(session.clock().track_count(), 1);

    let first = Arc::new(MemoryElement::loaded("clip-1.mp4", 5.0));
    let outcome = session.switch_to(first.clone() as Arc<dyn MediaElement>).await;
    assert_eq!(outcome.kind, TransitionKind::Atomic);

    session.play(Some(0.0)).unwrap();
    assert!(session.clock().is_playing());
    assert_eq!(context.active_voices(), 1);
    assert!(!first.is_paused());

    context.advance(2.0);
    first.advance(2.0);
    assert_eq!(session.clock().current_time(), 2.0);

    let sample = session.check_drift().unwrap();
    assert_eq!(sample.track_id, "narration");
    assert!(sample.within_tolerance);

    // Video falls behind by 100ms: nudged faster, no seek.
    first.set_current_time(1.9);
    let sample = session.check_drift().unwrap();
    assert!(!sample.within_tolerance);
    assert!(first.playback_rate() > 1.0 && first.playback_rate() < 1.05);
    assert_eq!(first.current_time(), 1.9);

    // 800ms behind: hard seek back onto the clock.
    first.set_current_time(1.2);
    session.check_drift().unwrap();
    assert!((first.current_time() - 2.0).abs() < 1e-9);
    assert_eq!(first.playback_rate(), 1.0);

    session.stop_monitoring();
    let stats = session.drift_stats();
    assert_eq!(stats.samples, 3);
    assert_eq!(stats.out_of_tolerance, 2);

    session.pause();
    assert!(first.is_paused());
    let paused_at = session.clock().current_time();
    context.advance(1.0);
    assert_eq!(session.clock().current_time(), paused_at);

    session.destroy();
    assert_eq!(context.state(), ContextState::Closed);
    assert!(session.active_element().is_none());

    // The element outlives the session until its owner releases it.
    assert!(!first.is_released());
    first.release();
    assert!(first.is_released());
    assert_eq!(first.src(), None);
}

#[tokio::test(start_paused = true)]
async fn test_handoff_to_next_clip() {
    let context = ManualContext::new(SAMPLE_RATE);
    let mut session = session(&context);
    session.load(manifest()).await;

    let first = Arc::new(MemoryElement::loaded("clip-1.mp4", 5.0));
    session.switch_to(first.clone() as Arc<dyn MediaElement>).await;
    session.play(Some(4.0)).unwrap();
    context.advance(1.25);

    // The next clip starts wherever the clock is inside it.
    let second = Arc::new(MemoryElement::loaded("clip-2.mp4", 5.0));
    session.switch_to(second.clone() as Arc<dyn MediaElement>).await;

    assert_eq!(second.current_time(), 0.25);
    assert!(!second.is_paused());
    assert!(first.is_paused());
    assert!(!first.is_visible());

    session.seek(11.0);
    assert_eq!(session.clock().current_time(), 11.0);
}

#[tokio::test]
async fn test_suspended_context_resumes_on_play() {
    let context = ManualContext::suspended(SAMPLE_RATE);
    let session = session(&context);

    session.play(Some(0.0)).unwrap();
    assert_eq!(context.state(), ContextState::Running);
    assert_eq!(session.clock().state().audio_context_state, Some(ContextState::Running));
}

#[tokio::test]
async fn test_video_follows_a_double_speed_clock() {
    let context = ManualContext::new(SAMPLE_RATE);
    let mut session = session(&context);
    session.load(manifest()).await;

    let first = Arc::new(MemoryElement::loaded("clip-1.mp4", 5.0));
    session.switch_to(first.clone() as Arc<dyn MediaElement>).await;
    session.play(Some(0.5)).unwrap();
    session.set_playback_rate(2.0);
    assert_eq!(first.playback_rate(), 2.0);

    for step in 0..10 {
        context.advance(0.1);
        first.advance(0.1);

        let sample = session.check_drift().unwrap();
        assert!(sample.within_tolerance, "step {step}: drift {}", sample.drift);
        assert!((first.playback_rate() - 2.0).abs() < 1e-9, "step {step}");
    }
    assert!((session.clock().current_time() - 2.5).abs() < 1e-9);
    assert_eq!(session.drift_stats().out_of_tolerance, 0);
}

#[tokio::test]
async fn test_clock_crossing_a_boundary_before_the_switch() {
    let context = ManualContext::new(SAMPLE_RATE);
    let mut session = session(&context);
    session.load(manifest()).await;

    let first = Arc::new(MemoryElement::loaded("clip-1.mp4", 5.0));
    session.switch_to(first.clone() as Arc<dyn MediaElement>).await;
    session.play(Some(4.9)).unwrap();
    assert_eq!(session.active_clip(), Some("clip-1"));

    // The clock is already in clip-2; the outgoing element sits at its end.
    context.advance(0.12);
    first.set_current_time(5.0);
    assert!(session.check_drift().is_none());
    assert_eq!(first.current_time(), 5.0);
    assert_eq!(first.playback_rate(), 1.0);

    let second = Arc::new(MemoryElement::loaded("clip-2.mp4", 5.0));
    session.switch_to(second.clone() as Arc<dyn MediaElement>).await;
    assert_eq!(session.active_clip(), Some("clip-2"));
    assert!((second.current_time() - 0.02).abs() < 1e-9);

    let sample = session.check_drift().unwrap();
    assert!(sample.within_tolerance);
    assert_eq!(first.current_time(), 5.0);
}
