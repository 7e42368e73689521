use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::nms::non_max_suppression;
use super::{Detector, DetectorError};
use crate::detection::{BoundingBox, RawDetection};
use crate::pipeline::params::InferenceParams;

/// Replay detector described by a YAML manifest.
///
/// Boxes are stored in normalized corner form and scaled to the image being
/// processed, so the same manifest works for any input. Useful for smoke
/// testing a deployment without a neural-network runtime.
///
/// ```yaml
/// name: placeholder
/// classes: [person, car]
/// detections:
///   - { class_id: 0, confidence: 0.95, bbox: [0.10, 0.15, 0.35, 0.90] }
///   - { class_id: 2, confidence: 0.87, bbox: [0.50, 0.40, 0.80, 0.65] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDetector {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub detections: Vec<ManifestDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDetection {
    pub class_id: u32,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`, each in `[0, 1]`.
    pub bbox: [f32; 4],
}

fn default_name() -> String {
    "manifest".to_string()
}

impl ManifestDetector {
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        let manifest_str = std::fs::read_to_string(path)?;
        Self::parse(&manifest_str)
    }

    pub fn parse(manifest_str: &str) -> Result<Self, DetectorError> {
        let detector: ManifestDetector = serde_yaml::from_str(manifest_str)?;
        for detection in &detector.detections {
            if !(0.0..=1.0).contains(&detection.confidence) {
                return Err(DetectorError::Backend(format!(
                    "confidence {} out of range",
                    detection.confidence
                )));
            }
        }
        Ok(detector)
    }
}

impl Detector for ManifestDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_names(&self) -> Option<Vec<String>> {
        if self.classes.is_empty() {
            None
        } else {
            Some(self.classes.clone())
        }
    }

    fn detect(
        &self,
        image: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        let (width, height) = image.dimensions();
        let w = width as f32;
        let h = height as f32;

        let candidates = self
            .detections
            .iter()
            .filter(|detection| detection.confidence >= params.confidence)
            .map(|detection| {
                let [x1, y1, x2, y2] = detection.bbox;
                RawDetection {
                    class_id: detection.class_id,
                    confidence: detection.confidence,
                    bbox: BoundingBox::from_corners(x1 * w, y1 * h, x2 * w, y2 * h)
                        .clamp_to(width, height),
                }
            })
            .collect();

        let mut kept = non_max_suppression(candidates, params.iou_threshold);
        kept.truncate(params.max_detections);
        Ok(kept)
    }
}
