//! Reference/frame selection for the next generated clip.
//!
//! Clip 0 has no predecessor, so it is anchored on identity alone. Later
//! clips want both a recency anchor (the previous clip's last frame) and an
//! identity anchor; the chain degrades one anchor at a time and reports what
//! was lost.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Prompt length control: at most this many secondary images
pub const MAX_SECONDARY_IMAGES: usize = 3;

/// Candidate images for one clip. Empty strings count as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DualImageConfig {
    pub clip_index: usize,
    pub reference_image_url: Option<String>,
    /// Last frame extracted from clip `clip_index - 1`
    pub last_frame_url: Option<String>,
    /// First frame of the first clip, an identity anchor of last resort
    pub clip1_first_frame_url: Option<String>,
    /// Identity-bible views of the subject
    pub identity_views: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionStrategy {
    ReferenceOnly,
    LastFrameOnly,
    DualInjection,
    Fallback,
}

impl InjectionStrategy {
    /// Base confidence before bonuses and penalties
    pub fn base_confidence(self) -> i32 {
        match self {
            InjectionStrategy::DualInjection => 95,
            InjectionStrategy::ReferenceOnly => 90,
            InjectionStrategy::LastFrameOnly => 70,
            InjectionStrategy::Fallback => 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualImageResult {
    /// `None` is a hard stop: nothing can anchor the clip
    pub primary_image: Option<String>,
    pub secondary_images: Vec<String>,
    pub strategy: InjectionStrategy,
    pub injection_prompt: String,
    pub warnings: Vec<String>,
}

fn present(url: &Option<String>) -> Option<&str> {
    url.as_deref().map(str::trim).filter(|url| !url.is_empty())
}

/// Identity candidates in priority order, deduplicated
fn identity_candidates(config: &DualImageConfig, include_clip1: bool) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        if !url.is_empty() && !candidates.iter().any(|c| c == url) {
            candidates.push(url.to_string());
        }
    };

    if let Some(reference) = present(&config.reference_image_url) {
        push(reference);
    }
    for view in &config.identity_views {
        push(view.trim());
    }
    if include_clip1 {
        if let Some(first_frame) = present(&config.clip1_first_frame_url) {
            push(first_frame);
        }
    }
    candidates
}

fn injection_prompt(strategy: InjectionStrategy, clip_index: usize, identity_count: usize) -> String {
    match strategy {
        InjectionStrategy::DualInjection => format!(
            "Continue directly from the final frame of clip {prev}: match its composition, \
             subject position, lighting and color grade exactly. Keep the subject's identity \
             consistent with the {identity_count} reference image(s): same face, hair, \
             wardrobe and proportions.",
            prev = clip_index.saturating_sub(1) + 1,
        ),
        InjectionStrategy::LastFrameOnly => format!(
            "Continue directly from the final frame of clip {prev}: match its composition, \
             subject position, lighting and color grade exactly. Preserve the subject's \
             appearance as shown in that frame.",
            prev = clip_index.saturating_sub(1) + 1,
        ),
        InjectionStrategy::ReferenceOnly if clip_index == 0 => String::from(
            "Establish the subject exactly as shown in the reference image: same face, hair, \
             wardrobe and proportions.",
        ),
        InjectionStrategy::ReferenceOnly => format!(
            "Keep the subject's identity consistent with the reference image(s). Scene \
             continuity from clip {prev} is unavailable; match the established setting and \
             lighting as closely as possible.",
            prev = clip_index.saturating_sub(1) + 1,
        ),
        InjectionStrategy::Fallback => String::from(
            "No visual anchor available. Generate from the text prompt alone.",
        ),
    }
}

fn result(
    config: &DualImageConfig,
    primary_image: Option<String>,
    secondary_images: Vec<String>,
    strategy: InjectionStrategy,
    warnings: Vec<String>,
) -> DualImageResult {
    let identity_count = secondary_images.len().max(1);
    DualImageResult {
        primary_image,
        injection_prompt: injection_prompt(strategy, config.clip_index, identity_count),
        secondary_images,
        strategy,
        warnings,
    }
}

/// Pick the anchor image(s) for `config.clip_index`.
pub fn resolve_dual_image(config: &DualImageConfig) -> DualImageResult {
    let clip_number = config.clip_index + 1;

    if config.clip_index == 0 {
        let mut warnings = Vec::new();
        let mut candidates = identity_candidates(config, false).into_iter();
        let Some(primary) = candidates.next() else {
            let message = format!(
                "CRITICAL: clip {clip_number} has no reference image and no identity views; \
                 nothing can anchor the subject"
            );
            error!(clip_index = config.clip_index, "{message}");
            return result(config, None, Vec::new(), InjectionStrategy::Fallback, vec![message]);
        };

        if present(&config.reference_image_url).is_none() {
            let message = format!(
                "Clip {clip_number} has no reference image; using the first identity view"
            );
            warn!(clip_index = config.clip_index, "{message}");
            warnings.push(message);
        }
        let secondary: Vec<String> = candidates.take(MAX_SECONDARY_IMAGES).collect();
        return result(config, Some(primary), secondary, InjectionStrategy::ReferenceOnly, warnings);
    }

    let last_frame = present(&config.last_frame_url).map(str::to_string);
    let identity = identity_candidates(config, true);

    match (last_frame, identity.is_empty()) {
        (Some(last_frame), false) => {
            let secondary: Vec<String> = identity.into_iter().take(MAX_SECONDARY_IMAGES).collect();
            result(
                config,
                Some(last_frame),
                secondary,
                InjectionStrategy::DualInjection,
                Vec::new(),
            )
        }
        (Some(last_frame), true) => {
            let message = format!(
                "Clip {clip_number} has no reference or identity image; identity may drift \
                 across clips"
            );
            warn!(clip_index = config.clip_index, "{message}");
            result(
                config,
                Some(last_frame),
                Vec::new(),
                InjectionStrategy::LastFrameOnly,
                vec![message],
            )
        }
        (None, false) => {
            let message = format!(
                "Continuity broken: no last frame from clip {}; clip {clip_number} is anchored \
                 on identity only",
                clip_number - 1
            );
            warn!(clip_index = config.clip_index, "{message}");
            let mut identity = identity.into_iter();
            let primary = identity.next();
            let secondary: Vec<String> = identity.take(MAX_SECONDARY_IMAGES).collect();
            result(config, primary, secondary, InjectionStrategy::ReferenceOnly, vec![message])
        }
        (None, true) => {
            let message = format!(
                "CRITICAL: clip {clip_number} has no last frame and no reference image; \
                 nothing can anchor the clip"
            );
            error!(clip_index = config.clip_index, "{message}");
            result(config, None, Vec::new(), InjectionStrategy::Fallback, vec![message])
        }
    }
}

/// Confidence score for UI/ops display, 0..=100. Not a gate.
pub fn calculate_injection_confidence(result: &DualImageResult) -> u8 {
    let score = result.strategy.base_confidence() + 2 * result.secondary_images.len() as i32
        - 5 * result.warnings.len() as i32;
    score.clamp(0, 100) as u8
}
