/// Failure kinds surfaced by a prediction request.
///
/// `ArtifactWriteFailure` is recovered inside `predict`; every other kind
/// aborts only the request that produced it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("Model not loaded")]
    ModelNotLoaded,
    #[error("Model load failed: {0}")]
    ModelLoadFailure(String),
    #[error("Model load already in progress")]
    LoadInProgress,
    #[error("No image source provided")]
    ImageSourceMissing,
    #[error("Failed to decode image: {0}")]
    ImageDecodeFailure(String),
    #[error("Failed to fetch image: {0}")]
    ImageFetchFailure(String),
    #[error("Invalid inference parameters: {0}")]
    InvalidParameters(String),
    #[error("Inference failed: {0}")]
    InferenceFailure(String),
    #[error("Failed to write result artifact: {0}")]
    ArtifactWriteFailure(String),
}

impl InferenceError {
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::ModelNotLoaded => "model_not_loaded",
            InferenceError::ModelLoadFailure(_) => "model_load_failure",
            InferenceError::LoadInProgress => "load_in_progress",
            InferenceError::ImageSourceMissing => "image_source_missing",
            InferenceError::ImageDecodeFailure(_) => "image_decode_failure",
            InferenceError::ImageFetchFailure(_) => "image_fetch_failure",
            InferenceError::InvalidParameters(_) => "invalid_parameters",
            InferenceError::InferenceFailure(_) => "inference_failure",
            InferenceError::ArtifactWriteFailure(_) => "artifact_write_failure",
        }
    }
}
