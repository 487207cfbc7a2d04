pub mod buffer;
pub mod clock;
pub mod context;
#[cfg(feature = "cpal")]
pub mod cpal_backend;
pub mod decode;
pub mod envelope;
pub mod mixer;

pub use buffer::AudioBuffer;
pub use clock::{plan_voice, DriftCallback, MasterClock, TimeUpdateCallback};
pub use context::{AudioContext, ContextFactory, ContextState, ManualContext, SystemContext};
#[cfg(feature = "cpal")]
pub use cpal_backend::CpalContext;
pub use decode::{decode_audio, extension_hint};
pub use envelope::GainEnvelope;
pub use mixer::{VoiceId, VoiceMixer, VoiceSpec};
