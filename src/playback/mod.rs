pub mod monitor;
pub mod session;
pub mod state;
pub mod sync;
pub mod transition;

pub use monitor::{AudioSyncMonitor, DriftSample, DriftSampleCallback, DriftStats, TimelineClock};
pub use session::PlaybackSession;
pub use state::{clamp_playback_rate, ClockState, PlaybackState, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
pub use sync::{
    get_expected_audio_position, DriftCorrection, DriftCorrector, DriftMeasurement,
    ExpectedAudioPosition,
};
pub use transition::{
    select_transition, AtomicTransition, GracefulTransition, TransitionKind, TransitionOutcome,
    TransitionStrategy,
};
