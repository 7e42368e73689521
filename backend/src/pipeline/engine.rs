use image::RgbImage;
use std::sync::Arc;

use crate::detection::RawDetection;
use crate::error::InferenceError;
use crate::pipeline::params::InferenceParams;
use crate::registry::{LoadedModel, ModelRegistry};

/// Runs the registry's detector with per-request parameters.
#[derive(Clone)]
pub struct InferenceEngine {
    registry: Arc<ModelRegistry>,
}

impl InferenceEngine {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Snapshot of the Ready model. The same snapshot is used for detection
    /// and class-name resolution even if a reload happens mid-request.
    pub fn ready_model(&self) -> Result<Arc<LoadedModel>, InferenceError> {
        self.registry.current().map_err(|e| {
            log::debug!("Rejecting inference: {}", e);
            InferenceError::ModelNotLoaded
        })
    }

    pub fn detect(
        &self,
        model: &LoadedModel,
        image: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        log::debug!(
            "Running {} with conf={} iou={} imgsz={} max_det={} device={}",
            model.detector().name(),
            params.confidence,
            params.iou_threshold,
            params.image_size,
            params.max_detections,
            params.device
        );
        model
            .detector()
            .detect(image, params)
            .map_err(|e| InferenceError::InferenceFailure(e.to_string()))
    }
}
