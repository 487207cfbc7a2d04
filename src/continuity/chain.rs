//! Continuity audit over a generated clip sequence.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainClip {
    pub index: usize,
    pub start_image_url: Option<String>,
    pub last_frame_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainGap {
    /// Index of the clip that starts without an anchor
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub valid: bool,
    pub gaps: Vec<ChainGap>,
}

fn has(url: &Option<String>) -> bool {
    url.as_deref().is_some_and(|url| !url.trim().is_empty())
}

/// Flag every consecutive pair where the later clip has neither its own start
/// image nor its predecessor's last frame, plus holes in the index sequence.
pub fn validate_image_chain(clips: &[ChainClip]) -> ChainReport {
    let mut gaps = Vec::new();

    for pair in clips.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);

        if next.index != prev.index + 1 {
            gaps.push(ChainGap {
                index: next.index,
                reason: format!("Missing clip(s) between {} and {}", prev.index, next.index),
            });
        }

        if !has(&next.start_image_url) && !has(&prev.last_frame_url) {
            gaps.push(ChainGap {
                index: next.index,
                reason: format!(
                    "Clip {} has no start image and clip {} has no last frame",
                    next.index, prev.index
                ),
            });
        }
    }

    for gap in &gaps {
        warn!(index = gap.index, reason = %gap.reason, "image chain gap");
    }

    ChainReport {
        valid: gaps.is_empty(),
        gaps,
    }
}
