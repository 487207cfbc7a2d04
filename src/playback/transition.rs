//! Clip-to-clip handoff between two media elements.
//!
//! `AtomicTransition` swaps in one step and needs an incoming element that
//! already holds a decoded frame. `GracefulTransition` is the fallback: a
//! short opacity crossfade that tolerates an incoming element still warming up.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SyncConfig;
use crate::media::buffer::validate_transition_readiness;
use crate::media::element::MediaElement;

/// Crossfade step, one frame at 60fps
const FADE_STEP: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Atomic,
    Graceful,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub kind: TransitionKind,
    /// False when the incoming `play()` was rejected (autoplay policy); not an error
    pub incoming_playing: bool,
}

#[async_trait]
pub trait TransitionStrategy: Send + Sync {
    fn kind(&self) -> TransitionKind;

    /// Hand playback from `outgoing` (absent for the first clip) to `incoming`.
    /// Resolves once the outgoing element is paused and hidden.
    async fn execute(
        &self,
        outgoing: Option<&dyn MediaElement>,
        incoming: &dyn MediaElement,
    ) -> TransitionOutcome;
}

/// Best-effort play; autoplay rejection is expected
fn start_incoming(incoming: &dyn MediaElement) -> bool {
    match incoming.play() {
        Ok(()) => true,
        Err(err) => {
            debug!(error = %err, "incoming play() rejected; continuing transition");
            false
        }
    }
}

fn retire_outgoing(outgoing: Option<&dyn MediaElement>) {
    if let Some(outgoing) = outgoing {
        outgoing.pause();
        outgoing.set_opacity(0.0);
        outgoing.set_visible(false);
    }
}

/// Single-step swap
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicTransition;

#[async_trait]
impl TransitionStrategy for AtomicTransition {
    fn kind(&self) -> TransitionKind {
        TransitionKind::Atomic
    }

    async fn execute(
        &self,
        outgoing: Option<&dyn MediaElement>,
        incoming: &dyn MediaElement,
    ) -> TransitionOutcome {
        incoming.set_opacity(1.0);
        incoming.set_visible(true);
        let incoming_playing = start_incoming(incoming);
        retire_outgoing(outgoing);

        TransitionOutcome {
            kind: TransitionKind::Atomic,
            incoming_playing,
        }
    }
}

/// Opacity crossfade over `duration`
#[derive(Debug, Clone, Copy)]
pub struct GracefulTransition {
    pub duration: Duration,
}

impl GracefulTransition {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for GracefulTransition {
    fn default() -> Self {
        Self::new(FADE_STEP)
    }
}

#[async_trait]
impl TransitionStrategy for GracefulTransition {
    fn kind(&self) -> TransitionKind {
        TransitionKind::Graceful
    }

    async fn execute(
        &self,
        outgoing: Option<&dyn MediaElement>,
        incoming: &dyn MediaElement,
    ) -> TransitionOutcome {
        let steps = (self.duration.as_millis() / FADE_STEP.as_millis()).max(1) as u32;
        let step = self.duration / steps;

        incoming.set_opacity(0.0);
        incoming.set_visible(true);
        let incoming_playing = start_incoming(incoming);

        for i in 1..=steps {
            tokio::time::sleep(step).await;
            let progress = i as f32 / steps as f32;
            incoming.set_opacity(progress);
            if let Some(outgoing) = outgoing {
                outgoing.set_opacity(1.0 - progress);
            }
        }

        incoming.set_opacity(1.0);
        retire_outgoing(outgoing);

        TransitionOutcome {
            kind: TransitionKind::Graceful,
            incoming_playing,
        }
    }
}

/// Atomic when the incoming element passes the readiness check, graceful otherwise
pub fn select_transition(
    incoming: &dyn MediaElement,
    config: &SyncConfig,
) -> Box<dyn TransitionStrategy> {
    let report = validate_transition_readiness(incoming, config.min_buffer_percent);
    if report.ready {
        Box::new(AtomicTransition)
    } else {
        debug!(
            reason = report.reason.as_deref().unwrap_or_default(),
            "incoming clip not ready for an atomic switch; crossfading"
        );
        Box::new(GracefulTransition::new(config.transition_duration()))
    }
}
