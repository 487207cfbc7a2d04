//! Visual compatibility between the last frame of one clip and the next.
//!
//! Each mismatch costs a fixed penalty and produces a description, a prompt
//! line asking the next generation to keep the earlier frame's look, and
//! negative-prompt terms for the values it should avoid.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COLOR_TEMPERATURE_PENALTY: u32 = 15;
pub const LIGHTING_PENALTY: u32 = 20;
pub const MOTION_PENALTY: u32 = 10;
pub const DEPTH_OF_FIELD_PENALTY: u32 = 5;
pub const EXPOSURE_PENALTY: u32 = 10;

/// Scores at or above this blend without a visible seam
pub const COMPATIBILITY_THRESHOLD: u32 = 70;

/// Enum of a frame characteristic with a prompt label for each value
macro_rules! characteristic {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }
    };
}

characteristic!(
    ColorTemperature { Warm => "warm", Neutral => "neutral", Cool => "cool" } default Neutral
);
characteristic!(
    LightingDirection {
        Front => "front",
        Back => "back",
        Left => "left",
        Right => "right",
        Top => "top",
        Ambient => "ambient",
    } default Ambient
);
characteristic!(
    ShadowIntensity { Soft => "soft", Medium => "medium", Hard => "hard" } default Medium
);
characteristic!(
    MotionVector {
        Static => "static",
        Left => "leftward",
        Right => "rightward",
        Up => "upward",
        Down => "downward",
        Forward => "forward",
        Backward => "backward",
    } default Static
);
characteristic!(
    DepthOfField { Shallow => "shallow", Medium => "medium", Deep => "deep" } default Medium
);
characteristic!(
    ExposureLevel { Under => "underexposed", Normal => "balanced", Over => "overexposed" } default Normal
);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameAnalysis {
    pub color_temperature: ColorTemperature,
    pub dominant_colors: Vec<String>,
    pub lighting_direction: LightingDirection,
    pub shadow_intensity: ShadowIntensity,
    pub motion_vector: MotionVector,
    pub depth_of_field: DepthOfField,
    pub exposure_level: ExposureLevel,
}

/// Read `pointer` from `anchor` as `T`, defaulting when missing or malformed
fn anchor_field<T: DeserializeOwned + Default>(anchor: &Value, pointer: &str) -> T {
    anchor
        .pointer(pointer)
        .and_then(|value| {
            let value = match value {
                Value::String(s) => Value::String(s.trim().to_lowercase()),
                other => other.clone(),
            };
            serde_json::from_value(value).ok()
        })
        .unwrap_or_default()
}

impl FrameAnalysis {
    /// Derive an analysis from an upstream scene anchor. Any missing or
    /// unrecognized field takes its default.
    ///
    /// ```json
    /// {
    ///   "colorPalette": { "temperature": "warm", "dominant": ["#aa3300"] },
    ///   "lighting": { "direction": "left", "shadowIntensity": "hard", "exposure": "normal" },
    ///   "motionSignature": { "direction": "forward" },
    ///   "depthCues": { "depthOfField": "shallow" }
    /// }
    /// ```
    pub fn from_scene_anchor(anchor: &Value) -> Self {
        Self {
            color_temperature: anchor_field(anchor, "/colorPalette/temperature"),
            dominant_colors: anchor_field(anchor, "/colorPalette/dominant"),
            lighting_direction: anchor_field(anchor, "/lighting/direction"),
            shadow_intensity: anchor_field(anchor, "/lighting/shadowIntensity"),
            motion_vector: anchor_field(anchor, "/motionSignature/direction"),
            depth_of_field: anchor_field(anchor, "/depthCues/depthOfField"),
            exposure_level: anchor_field(anchor, "/lighting/exposure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendingCompatibility {
    pub score: u32,
    pub compatible: bool,
    pub mismatches: Vec<String>,
    pub prompt_injections: Vec<String>,
    pub negative_prompts: Vec<String>,
}

struct Scorer {
    score: u32,
    mismatches: Vec<String>,
    prompt_injections: Vec<String>,
    negative_prompts: Vec<String>,
}

impl Scorer {
    fn compare<T: Copy + PartialEq>(
        &mut self,
        aspect: &str,
        penalty: u32,
        previous: T,
        next: T,
        all: &[T],
        label: fn(T) -> &'static str,
    ) {
        if previous == next {
            return;
        }
        self.score = self.score.saturating_sub(penalty);
        self.mismatches.push(format!(
            "{aspect} changes from {} to {}",
            label(previous),
            label(next)
        ));
        self.prompt_injections.push(format!(
            "Maintain {} {aspect} from the previous frame",
            label(previous)
        ));
        self.negative_prompts.extend(
            all.iter()
                .copied()
                .filter(|value| *value != previous)
                .map(|value| format!("{} {aspect}", label(value))),
        );
    }
}

/// Score how smoothly `next` follows `previous`, 100 meaning identical
pub fn calculate_blending_compatibility(
    previous: &FrameAnalysis,
    next: &FrameAnalysis,
) -> BlendingCompatibility {
    let mut scorer = Scorer {
        score: 100,
        mismatches: Vec::new(),
        prompt_injections: Vec::new(),
        negative_prompts: Vec::new(),
    };

    scorer.compare(
        "color temperature",
        COLOR_TEMPERATURE_PENALTY,
        previous.color_temperature,
        next.color_temperature,
        ColorTemperature::ALL,
        ColorTemperature::label,
    );
    scorer.compare(
        "lighting direction",
        LIGHTING_PENALTY,
        previous.lighting_direction,
        next.lighting_direction,
        LightingDirection::ALL,
        LightingDirection::label,
    );
    scorer.compare(
        "motion",
        MOTION_PENALTY,
        previous.motion_vector,
        next.motion_vector,
        MotionVector::ALL,
        MotionVector::label,
    );
    scorer.compare(
        "depth of field",
        DEPTH_OF_FIELD_PENALTY,
        previous.depth_of_field,
        next.depth_of_field,
        DepthOfField::ALL,
        DepthOfField::label,
    );
    scorer.compare(
        "exposure",
        EXPOSURE_PENALTY,
        previous.exposure_level,
        next.exposure_level,
        ExposureLevel::ALL,
        ExposureLevel::label,
    );

    BlendingCompatibility {
        compatible: scorer.score >= COMPATIBILITY_THRESHOLD,
        score: scorer.score,
        mismatches: scorer.mismatches,
        prompt_injections: scorer.prompt_injections,
        negative_prompts: scorer.negative_prompts,
    }
}
