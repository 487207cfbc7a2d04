//! Boot sequence: preload an element until its buffer supports gapless playback.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::MediaError;
use crate::media::buffer::{wait_for_can_play_through, BufferState, BufferStatus};
use crate::media::element::MediaElement;

#[derive(Debug, Clone, PartialEq)]
pub struct HydrationReport {
    pub status: BufferStatus,
    /// Buffer reached `min_buffer_percent` and the wait did not degrade to an error
    pub sufficient: bool,
}

/// Point `element` at `url`, start loading, and wait for a verified buffer.
///
/// The element may be detached (never shown); it stays owned by the caller,
/// who must `release()` it on teardown.
pub async fn hydrate<E: MediaElement + ?Sized>(
    clip_id: &str,
    element: &E,
    url: &str,
    config: &SyncConfig,
) -> Result<HydrationReport, MediaError> {
    hydrate_until_cancelled(clip_id, element, url, config, &CancellationToken::new()).await
}

/// As [`hydrate`], abandoned with [`MediaError::Cancelled`] once `cancel` fires.
///
/// A cancelled element keeps its source; the caller decides whether to release it.
pub async fn hydrate_until_cancelled<E: MediaElement + ?Sized>(
    clip_id: &str,
    element: &E,
    url: &str,
    config: &SyncConfig,
    cancel: &CancellationToken,
) -> Result<HydrationReport, MediaError> {
    if cancel.is_cancelled() {
        return Err(MediaError::Cancelled(clip_id.to_string()));
    }
    if element.src().as_deref() != Some(url) {
        element.set_src(url);
    }
    element.load();
    debug!(clip_id, url, "hydrating media element");

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(clip_id, "hydration cancelled");
            return Err(MediaError::Cancelled(clip_id.to_string()));
        }
        status = wait_for_can_play_through(clip_id, element, config.buffer_timeout()) => status?,
    };
    let sufficient = status.state != BufferState::Error
        && (status.can_play_through || status.buffered_percent >= config.min_buffer_percent);

    info!(
        clip_id,
        sufficient,
        buffered_percent = status.buffered_percent,
        "hydration finished"
    );
    Ok(HydrationReport { status, sufficient })
}
