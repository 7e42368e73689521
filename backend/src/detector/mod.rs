pub mod manifest;
pub mod nms;
pub mod preprocess;
#[cfg(feature = "torch")]
pub mod torchscript;

use image::RgbImage;
use std::path::Path;

use crate::detection::RawDetection;
use crate::pipeline::params::InferenceParams;

pub use manifest::ManifestDetector;

/// Class table used when a model does not ship its own names.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub fn default_classes() -> Vec<String> {
    COCO_CLASSES.iter().map(|name| name.to_string()).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid model manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),
    #[error("Unsupported model format: {0}")]
    UnsupportedModel(String),
    #[error("Detector backend error: {0}")]
    Backend(String),
}

/// The object-detection capability held by the registry.
///
/// `detect` takes `&self` so one loaded model can serve concurrent requests;
/// implementations that wrap a non-`Sync` runtime guard it internally.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    /// Class table exposed by the model, if any.
    fn class_names(&self) -> Option<Vec<String>>;

    fn detect(
        &self,
        image: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<RawDetection>, DetectorError>;
}

pub trait DetectorLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<Box<dyn Detector>, DetectorError>;
}

/// Picks a detector implementation from the model path extension.
#[derive(Debug, Clone)]
pub struct DefaultLoader {
    pub device: String,
}

impl DefaultLoader {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl DetectorLoader for DefaultLoader {
    fn load(&self, path: &str) -> Result<Box<dyn Detector>, DetectorError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "yaml" | "yml" => Ok(Box::new(ManifestDetector::load(Path::new(path))?)),
            "pt" | "torchscript" => load_torchscript(path, &self.device),
            other => Err(DetectorError::UnsupportedModel(format!(
                "{} (extension '{}')",
                path, other
            ))),
        }
    }
}

#[cfg(feature = "torch")]
fn load_torchscript(path: &str, device: &str) -> Result<Box<dyn Detector>, DetectorError> {
    Ok(Box::new(torchscript::TorchScriptDetector::load(path, device)?))
}

#[cfg(not(feature = "torch"))]
fn load_torchscript(path: &str, _device: &str) -> Result<Box<dyn Detector>, DetectorError> {
    Err(DetectorError::UnsupportedModel(format!(
        "{} requires the `torch` feature",
        path
    )))
}
