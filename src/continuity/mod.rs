pub mod blending;
pub mod chain;
pub mod resolver;

pub use blending::{
    calculate_blending_compatibility, BlendingCompatibility, ColorTemperature, DepthOfField,
    ExposureLevel, FrameAnalysis, LightingDirection, MotionVector, ShadowIntensity,
};
pub use chain::{validate_image_chain, ChainClip, ChainGap, ChainReport};
pub use resolver::{
    calculate_injection_confidence, resolve_dual_image, DualImageConfig, DualImageResult,
    InjectionStrategy, MAX_SECONDARY_IMAGES,
};
