//! Buffer readiness verification.
//!
//! Availability wins over strictness here: a wait that times out resolves
//! with a degraded status instead of failing, so playback can start on a
//! flaky network with partial data.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::error::MediaError;
use crate::media::element::{is_valid_duration, MediaElement, MediaEvent, ReadyState, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferState {
    Idle,
    Loading,
    Buffering,
    Ready,
    Error,
}

/// Snapshot of an element's buffer, recomputed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStatus {
    pub clip_id: String,
    pub state: BufferState,
    pub buffered_percent: f64,
    pub buffered_ranges: Vec<TimeRange>,
    pub can_play_through: bool,
    pub duration: f64,
    pub last_error: Option<String>,
}

/// Outcome of the layered transition readiness check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub ready: bool,
    /// First failing check, for UI diagnostics
    pub reason: Option<String>,
    pub ready_state: ReadyState,
    pub buffered_percent: f64,
}

/// Buffered seconds as a percentage of the element's duration, 0 when the duration is unknown.
pub fn buffered_percent<E: MediaElement + ?Sized>(element: &E) -> f64 {
    let duration = element.duration();
    if !is_valid_duration(duration) {
        return 0.0;
    }
    let buffered: f64 = element.buffered().iter().map(TimeRange::len).sum();
    (buffered / duration * 100.0).clamp(0.0, 100.0)
}

/// Compute a [`BufferStatus`] from the element's buffered ranges and ready state.
pub fn get_buffer_status<E: MediaElement + ?Sized>(clip_id: &str, element: &E) -> BufferStatus {
    let ready_state = element.ready_state();
    let last_error = element.error();

    let state = if last_error.is_some() {
        BufferState::Error
    } else if element.src().is_none() {
        BufferState::Idle
    } else if ready_state >= ReadyState::HaveEnoughData {
        BufferState::Ready
    } else if ready_state >= ReadyState::HaveCurrentData {
        BufferState::Buffering
    } else {
        BufferState::Loading
    };

    BufferStatus {
        clip_id: clip_id.to_string(),
        state,
        buffered_percent: buffered_percent(element),
        buffered_ranges: element.buffered(),
        can_play_through: ready_state >= ReadyState::HaveEnoughData,
        duration: element.duration(),
        last_error,
    }
}

/// Wait until the element can play through, or until `timeout` elapses.
///
/// Resolves immediately at `HaveEnoughData`. On timeout the result is
/// degraded rather than an error: `Ready` with at least current frame data,
/// `Error` otherwise. Only an element error event fails the wait.
pub async fn wait_for_can_play_through<E: MediaElement + ?Sized>(
    clip_id: &str,
    element: &E,
    timeout: Duration,
) -> Result<BufferStatus, MediaError> {
    // Subscribe before inspecting state so an event fired in between is not lost.
    let mut events = element.subscribe();

    if element.ready_state() >= ReadyState::HaveEnoughData {
        return Ok(get_buffer_status(clip_id, element));
    }

    let settled = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(MediaEvent::CanPlayThrough) => return Ok(()),
                Ok(MediaEvent::Error(message)) => return Err(MediaError::Element(message)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(clip_id, skipped, "buffer wait lagged behind element events");
                    if element.ready_state() >= ReadyState::HaveEnoughData {
                        return Ok(());
                    }
                }
                // Sender gone: no event will ever arrive, let the timeout decide.
                Err(RecvError::Closed) => std::future::pending::<()>().await,
            }
        }
    })
    .await;

    match settled {
        Ok(Ok(())) => {
            let mut status = get_buffer_status(clip_id, element);
            status.state = BufferState::Ready;
            status.can_play_through = true;
            Ok(status)
        }
        Ok(Err(err)) => {
            warn!(clip_id, error = %err, "media element failed while buffering");
            Err(err)
        }
        Err(_) => {
            let mut status = get_buffer_status(clip_id, element);
            let ready_state = element.ready_state();
            status.state = if ready_state >= ReadyState::HaveCurrentData {
                BufferState::Ready
            } else {
                BufferState::Error
            };
            if status.state == BufferState::Error && status.last_error.is_none() {
                status.last_error = Some(format!(
                    "timed out after {}ms waiting for buffer",
                    timeout.as_millis()
                ));
            }
            warn!(
                clip_id,
                ready_state = ready_state.as_u8(),
                buffered_percent = status.buffered_percent,
                "buffer wait timed out, continuing with degraded status"
            );
            Ok(status)
        }
    }
}

/// Layered readiness check: source, metadata, duration, frame data, buffer level.
pub fn validate_transition_readiness<E: MediaElement + ?Sized>(
    element: &E,
    min_buffer_percent: f64,
) -> ReadinessReport {
    let ready_state = element.ready_state();
    let percent = buffered_percent(element);

    let reason = if element.src().is_none() {
        Some("No source set".to_string())
    } else if ready_state < ReadyState::HaveMetadata {
        Some("Metadata not loaded".to_string())
    } else if !is_valid_duration(element.duration()) {
        Some(format!("Invalid duration: {}", element.duration()))
    } else if ready_state < ReadyState::HaveCurrentData {
        Some("No current frame data".to_string())
    } else if percent < min_buffer_percent {
        Some(format!(
            "Insufficient buffer: {:.1}% (need {:.1}%)",
            percent, min_buffer_percent
        ))
    } else {
        None
    };

    ReadinessReport {
        ready: reason.is_none(),
        reason,
        ready_state,
        buffered_percent: percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::memory::MemoryElement;
    use std::sync::Arc;

    fn partially_buffered() -> MemoryElement {
        let element = MemoryElement::new();
        element.set_src("clip.mp4");
        element.set_metadata(10.0);
        element.set_buffered(vec![TimeRange::new(0.0, 2.0), TimeRange::new(5.0, 6.0)]);
        element
    }

    #[test]
    fn test_status_percent() {
        let element = partially_buffered();
        element.set_ready_state(ReadyState::HaveFutureData);

        let status = get_buffer_status("c1", &element);
        assert_eq!(status.state, BufferState::Buffering);
        assert!((status.buffered_percent - 30.0).abs() < 1e-9);
        assert!(!status.can_play_through);
        assert_eq!(status.buffered_ranges.len(), 2);
    }

    #[test]
    fn test_status_states() {
        assert_eq!(get_buffer_status("c", &MemoryElement::new()).state, BufferState::Idle);

        let element = MemoryElement::new();
        element.set_src("clip.mp4");
        assert_eq!(get_buffer_status("c", &element).state, BufferState::Loading);

        element.fail("decode error");
        let status = get_buffer_status("c", &element);
        assert_eq!(status.state, BufferState::Error);
        assert_eq!(status.last_error.as_deref(), Some("decode error"));
    }

    #[tokio::test]
    async fn test_wait_resolves_immediately_when_ready() {
        let element = MemoryElement::loaded("clip.mp4", 5.0);
        let status = wait_for_can_play_through("c", &element, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(status.state, BufferState::Ready);
        assert!(status.can_play_through);
    }

    #[tokio::test]
    async fn test_wait_resolves_on_event() {
        let element = Arc::new(partially_buffered());
        let loader = Arc::clone(&element);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            loader.finish_loading(10.0);
        });

        let status = wait_for_can_play_through("c", element.as_ref(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.state, BufferState::Ready);
        assert_eq!(status.buffered_percent, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_never_hangs() {
        let element = partially_buffered();
        element.set_ready_state(ReadyState::HaveCurrentData);

        let started = tokio::time::Instant::now();
        let status = wait_for_can_play_through("c", &element, Duration::from_millis(500))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(600));
        assert_eq!(status.state, BufferState::Ready);
        assert!(!status.can_play_through);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_without_data_is_error_state() {
        let element = MemoryElement::new();
        element.set_src("clip.mp4");

        let status = wait_for_can_play_through("c", &element, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(status.state, BufferState::Error);
        assert!(status.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_wait_rejects_on_element_error() {
        let element = Arc::new(partially_buffered());
        let failing = Arc::clone(&element);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            failing.fail("network error");
        });

        let result = wait_for_can_play_through("c", element.as_ref(), Duration::from_secs(5)).await;
        assert_eq!(result, Err(MediaError::Element("network error".into())));
    }

    #[test]
    fn test_readiness_layers() {
        let element = MemoryElement::new();
        let report = validate_transition_readiness(&element, 10.0);
        assert_eq!(report.reason.as_deref(), Some("No source set"));

        element.set_src("clip.mp4");
        let report = validate_transition_readiness(&element, 10.0);
        assert_eq!(report.reason.as_deref(), Some("Metadata not loaded"));

        element.set_ready_state(ReadyState::HaveMetadata);
        let report = validate_transition_readiness(&element, 10.0);
        assert!(report.reason.unwrap().starts_with("Invalid duration"));

        element.set_metadata(10.0);
        let report = validate_transition_readiness(&element, 10.0);
        assert_eq!(report.reason.as_deref(), Some("No current frame data"));

        element.set_ready_state(ReadyState::HaveCurrentData);
        element.set_buffered(vec![TimeRange::new(0.0, 0.5)]);
        let report = validate_transition_readiness(&element, 10.0);
        assert!(report.reason.unwrap().starts_with("Insufficient buffer"));
        assert_eq!(report.ready_state, ReadyState::HaveCurrentData);

        element.set_buffered(vec![TimeRange::new(0.0, 2.0)]);
        let report = validate_transition_readiness(&element, 10.0);
        assert!(report.ready);
        assert_eq!(report.reason, None);
    }
}
