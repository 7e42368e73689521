use actix_web::web;
use chrono::Utc;
use shared::{
    DetectionDto, HealthResponse, ImageInfo, InferenceRequest, InferenceResponse,
    LoadModelResponse, ModelInfoResponse, ModelState,
};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::detection::Detection;
use crate::detector::DetectorLoader;
use crate::error::InferenceError;
use crate::pipeline::acquire::ImageAcquirer;
use crate::pipeline::annotate::Annotator;
use crate::pipeline::engine::InferenceEngine;
use crate::pipeline::params::InferenceParams;
use crate::pipeline::processor;
use crate::registry::{ModelRegistry, RegistryError};
use crate::storage::{ResultArtifact, ResultStore};

struct Prediction {
    detections: Vec<Detection>,
    artifact: Result<ResultArtifact, InferenceError>,
    image_info: ImageInfo,
}

/// Composes acquisition, detection, post-processing, annotation and storage
/// behind the operations exposed to transports.
#[derive(Clone)]
pub struct InferenceService {
    engine: InferenceEngine,
    acquirer: ImageAcquirer,
    annotator: Annotator,
    store: ResultStore,
    config: Arc<ServiceConfig>,
}

impl InferenceService {
    pub fn new(config: ServiceConfig, loader: Arc<dyn DetectorLoader>) -> Result<Self, reqwest::Error> {
        let registry = ModelRegistry::new(loader, config.defaults.params());
        Ok(Self {
            engine: InferenceEngine::new(Arc::new(registry)),
            acquirer: ImageAcquirer::new(config.fetch_timeout)?,
            annotator: Annotator::default(),
            store: ResultStore::new(config.results_dir.clone()),
            config: Arc::new(config),
        })
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.engine.registry()
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn health(&self) -> HealthResponse {
        let status = self.registry().status();
        let label = match status.state {
            ModelState::Ready => "healthy",
            ModelState::Loading => "loading",
            ModelState::Unloaded => "unloaded",
            ModelState::Failed => "unhealthy",
        };
        let model_path = if status.model_path.is_empty() {
            self.config.model_path.clone()
        } else {
            status.model_path
        };

        HealthResponse {
            status: label.to_string(),
            model_loaded: status.state == ModelState::Ready,
            model_path,
            class_count: status.class_count,
            state: status.state,
            last_error: status.last_error,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn model_info(&self) -> ModelInfoResponse {
        let defaults = &self.config.defaults;
        let (model_path, model_type, classes) = match self.registry().current() {
            Ok(model) => (
                model.path.clone(),
                model.detector().name().to_string(),
                model.classes.clone(),
            ),
            Err(_) => (self.config.model_path.clone(), String::new(), Vec::new()),
        };

        ModelInfoResponse {
            model_path,
            model_type,
            classes,
            confidence_threshold: defaults.confidence,
            iou_threshold: defaults.iou_threshold,
            image_size: defaults.image_size,
            max_detections: defaults.max_detections,
            device: defaults.device.clone(),
        }
    }

    /// Runs one prediction end to end. Failures are reported in the response
    /// body, never returned.
    pub async fn predict(&self, request: InferenceRequest) -> InferenceResponse {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let outcome = self.run_prediction(request_id, &request).await;
        let processing_time = started.elapsed().as_secs_f64();

        match outcome {
            Ok(prediction) => {
                let count = prediction.detections.len();
                let (result_artifact, result_image_path, message) = match prediction.artifact {
                    Ok(artifact) => (
                        artifact.filename,
                        artifact.path.display().to_string(),
                        format!("Detected {} objects", count),
                    ),
                    Err(e) => {
                        log::warn!("[{}] {}", request_id, e);
                        (
                            String::new(),
                            String::new(),
                            format!("Detected {} objects; {}", count, e),
                        )
                    }
                };
                log::info!(
                    "[{}] Prediction completed: {} detections in {:.3}s",
                    request_id,
                    count,
                    processing_time
                );

                InferenceResponse {
                    success: true,
                    detections: prediction.detections.iter().map(DetectionDto::from).collect(),
                    result_artifact,
                    result_image_path,
                    processing_time,
                    message,
                    error_kind: None,
                    image_info: Some(prediction.image_info),
                    timestamp: Utc::now().to_rfc3339(),
                }
            }
            Err(e) => {
                if let InferenceError::InferenceFailure(_) = e {
                    log::error!("[{}] {}", request_id, e);
                } else {
                    log::warn!("[{}] Prediction rejected: {}", request_id, e);
                }
                InferenceResponse {
                    success: false,
                    detections: Vec::new(),
                    result_artifact: String::new(),
                    result_image_path: String::new(),
                    processing_time,
                    message: e.to_string(),
                    error_kind: Some(e.kind().to_string()),
                    image_info: None,
                    timestamp: Utc::now().to_rfc3339(),
                }
            }
        }
    }

    async fn run_prediction(
        &self,
        request_id: Uuid,
        request: &InferenceRequest,
    ) -> Result<Prediction, InferenceError> {
        let params = InferenceParams::resolve(request, &self.config.defaults);
        params.validate().map_err(InferenceError::InvalidParameters)?;
        log::debug!("[{}] Effective parameters: {:?}", request_id, params);

        let model = self.engine.ready_model()?;
        let acquired = self.acquirer.resolve(request).await?;
        let image_info = acquired.info;

        let engine = self.engine.clone();
        let annotator = self.annotator.clone();
        let store = self.store.clone();
        let (detections, artifact) = web::block(move || {
            let raw = engine.detect(&model, &acquired.image, &params)?;
            let detections = processor::process(raw, &params, &model.classes);

            let annotated = annotator.annotate(&acquired.image, &detections, Utc::now());
            let artifact = store
                .save(&annotated)
                .map_err(|e| InferenceError::ArtifactWriteFailure(e.to_string()));
            Ok::<_, InferenceError>((detections, artifact))
        })
        .await
        .map_err(|e| InferenceError::InferenceFailure(format!("blocking task failed: {}", e)))??;

        Ok(Prediction {
            detections,
            artifact,
            image_info,
        })
    }

    /// Loads `path` into the registry, replacing the active model on success.
    pub async fn load_model(&self, path: String) -> Result<LoadModelResponse, InferenceError> {
        let registry = self.registry().clone();
        let outcome = web::block(move || registry.load(&path))
            .await
            .map_err(|e| InferenceError::ModelLoadFailure(format!("blocking task failed: {}", e)))?;

        match outcome {
            Ok(model) => Ok(LoadModelResponse {
                success: true,
                message: format!("Model loaded successfully with {} classes", model.classes.len()),
            }),
            Err(RegistryError::LoadInProgress) => Err(InferenceError::LoadInProgress),
            Err(e) => Err(InferenceError::ModelLoadFailure(e.to_string())),
        }
    }

    /// Loads the configured model on a dedicated thread so the server can
    /// accept requests while the registry reports Loading.
    pub fn spawn_initial_load(&self) -> std::io::Result<std::thread::JoinHandle<()>> {
        let registry = self.registry().clone();
        let path = self.config.model_path.clone();
        std::thread::Builder::new()
            .name("model-loader".to_string())
            .spawn(move || {
                if let Err(e) = registry.load(&path) {
                    log::error!("Initial model load failed: {}", e);
                }
            })
    }
}
