use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Body of `POST /predict`.
///
/// Exactly one image source is honored: `image_path`, then `image_data`
/// (base64), then `image_url`. Omitted parameters fall back to the service
/// defaults reported by `/model_info`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct InferenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iou_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_detections: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BoundingBoxDto {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CenterBoxDto {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionDto {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBoxDto,
    pub center: CenterBoxDto,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InferenceResponse {
    pub success: bool,
    pub detections: Vec<DetectionDto>,
    /// Artifact filename, empty when nothing was persisted.
    pub result_artifact: String,
    pub result_image_path: String,
    pub processing_time: f64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_info: Option<ImageInfo>,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_path: String,
    pub class_count: usize,
    pub state: ModelState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelInfoResponse {
    pub model_path: String,
    pub model_type: String,
    pub classes: Vec<String>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub image_size: u32,
    pub max_detections: usize,
    pub device: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoadModelRequest {
    pub model_path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoadModelResponse {
    pub success: bool,
    pub message: String,
}
