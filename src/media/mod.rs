pub mod buffer;
pub mod element;
pub mod hydrate;
pub mod memory;

pub use buffer::{
    buffered_percent, get_buffer_status, validate_transition_readiness,
    wait_for_can_play_through, BufferState, BufferStatus, ReadinessReport,
};
pub use element::{MediaElement, MediaEvent, ReadyState, TimeRange};
pub use hydrate::{hydrate, hydrate_until_cancelled, HydrationReport};
pub use memory::MemoryElement;
