use shared::InferenceRequest;

use crate::config::InferenceDefaults;

/// Largest square input a detector is asked to letterbox into.
pub const MAX_IMAGE_SIZE: u32 = 4096;

/// Effective parameters for one detector call. Built per request from the
/// request overrides and the service defaults; never written back.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    pub confidence: f32,
    pub iou_threshold: f32,
    pub image_size: u32,
    pub max_detections: usize,
    pub device: String,
}

impl InferenceParams {
    pub fn resolve(request: &InferenceRequest, defaults: &InferenceDefaults) -> Self {
        Self {
            confidence: request.confidence.unwrap_or(defaults.confidence),
            iou_threshold: request.iou_threshold.unwrap_or(defaults.iou_threshold),
            image_size: request.image_size.unwrap_or(defaults.image_size),
            max_detections: request.max_detections.unwrap_or(defaults.max_detections),
            device: request
                .device
                .as_deref()
                .filter(|device| !device.trim().is_empty())
                .unwrap_or(&defaults.device)
                .to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence must be within [0, 1], got {}", self.confidence));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if self.image_size == 0 || self.image_size > MAX_IMAGE_SIZE {
            return Err(format!(
                "image_size must be within [1, {}], got {}",
                MAX_IMAGE_SIZE, self.image_size
            ));
        }
        if self.max_detections == 0 {
            return Err("max_detections must be positive".to_string());
        }
        Ok(())
    }
}
