//! Worker messages. On the wire every message is `{type, id, payload}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::time::Seconds;

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadClip {
    pub clip_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractFrames {
    pub clip_id: String,
    /// Fetched when the clip was not preloaded
    #[serde(default)]
    pub url: Option<String>,
    pub timestamps: Vec<Seconds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateTransitions {
    pub durations: Vec<Seconds>,
    pub fps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestBody {
    PreloadClip(PreloadClip),
    ExtractFrames(ExtractFrames),
    CalculateTransitions(CalculateTransitions),
    Dispose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: RequestId,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// Decoded frame handed back to the caller. Pixel data is shared, never copied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedFrame {
    pub timestamp: Seconds,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerOutput {
    #[serde(rename_all = "camelCase")]
    Preloaded { clip_id: String, bytes: usize, cached: bool },
    #[serde(rename_all = "camelCase")]
    Frames {
        clip_id: String,
        frames: Vec<DecodedFrame>,
        /// Extraction unavailable here; the caller extracts frames itself
        fallback: bool,
    },
    #[serde(rename_all = "camelCase")]
    Transitions {
        timestamps: Vec<Seconds>,
        /// Clip starts snapped to the frame grid
        snapped: Vec<Seconds>,
        total_duration: Seconds,
    },
    #[serde(rename_all = "camelCase")]
    Disposed { blobs: usize, frames: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// 0..=1, advisory only
    pub progress: f32,
    pub stage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseBody {
    Success(WorkerOutput),
    Error { message: String },
    Progress(Progress),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: RequestId,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl WorkerResponse {
    /// SUCCESS and ERROR end a request; PROGRESS does not
    pub fn is_final(&self) -> bool {
        !matches!(self.body, ResponseBody::Progress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = WorkerRequest {
            id: 7,
            body: RequestBody::PreloadClip(PreloadClip {
                clip_id: "c1".into(),
                url: "clip.mp4".into(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "type": "PRELOAD_CLIP", "id": 7, "payload": { "clipId": "c1", "url": "clip.mp4" } })
        );

        let parsed: WorkerRequest = serde_json::from_value(json!({
            "type": "CALCULATE_TRANSITIONS",
            "id": 3,
            "payload": { "durations": [5.0, 5.0], "fps": 30.0 }
        }))
        .unwrap();
        assert_eq!(parsed.id, 3);
        assert!(matches!(parsed.body, RequestBody::CalculateTransitions(_)));
    }

    #[test]
    fn test_response_wire_shape() {
        let response = WorkerResponse {
            id: 9,
            body: ResponseBody::Success(WorkerOutput::Frames {
                clip_id: "c1".into(),
                frames: Vec::new(),
                fallback: true,
            }),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "SUCCESS");
        assert_eq!(value["id"], 9);
        assert_eq!(value["payload"]["fallback"], true);
        assert_eq!(value["payload"]["clipId"], "c1");

        let progress = WorkerResponse {
            id: 9,
            body: ResponseBody::Progress(Progress {
                progress: 0.5,
                stage: "fetching".into(),
            }),
        };
        assert!(!progress.is_final());
        assert!(response.is_final());
    }
}
