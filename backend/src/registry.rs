use chrono::{DateTime, Utc};
use image::RgbImage;
use shared::ModelState;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

use crate::detector::{default_classes, Detector, DetectorLoader};
use crate::pipeline::params::InferenceParams;

/// An immutable, fully initialized model. Replaced as a whole on reload.
pub struct LoadedModel {
    pub path: String,
    pub classes: Vec<String>,
    pub loaded_at: DateTime<Utc>,
    detector: Box<dyn Detector>,
}

impl LoadedModel {
    pub fn detector(&self) -> &dyn Detector {
        self.detector.as_ref()
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("path", &self.path)
            .field("detector", &self.detector.name())
            .field("classes", &self.classes.len())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Model load already in progress")]
    LoadInProgress,
    #[error("Model load failed: {0}")]
    LoadFailed(String),
    #[error("Model not ready (state: {0})")]
    NotReady(ModelState),
}

#[derive(Debug, Clone)]
pub struct RegistryStatus {
    pub state: ModelState,
    pub model_path: String,
    pub class_count: usize,
    pub last_error: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
}

struct RegistryInner {
    state: ModelState,
    path: String,
    model: Option<Arc<LoadedModel>>,
    last_error: Option<String>,
}

/// Owner of the active model and its readiness.
///
/// Readers clone an `Arc` snapshot under a short read lock; `load` builds and
/// warms the new model outside the lock and swaps it in under the write lock.
pub struct ModelRegistry {
    loader: Arc<dyn DetectorLoader>,
    warmup_params: InferenceParams,
    inner: RwLock<RegistryInner>,
    state_tx: watch::Sender<ModelState>,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn DetectorLoader>, warmup_params: InferenceParams) -> Self {
        let (state_tx, _) = watch::channel(ModelState::Unloaded);
        Self {
            loader,
            warmup_params,
            inner: RwLock::new(RegistryInner {
                state: ModelState::Unloaded,
                path: String::new(),
                model: None,
                last_error: None,
            }),
            state_tx,
        }
    }

    /// Loads `path` and makes it the active model. Blocking: run it off the
    /// async workers.
    pub fn load(&self, path: &str) -> Result<Arc<LoadedModel>, RegistryError> {
        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if inner.state == ModelState::Loading {
                log::warn!("Rejected load of {}: load of {} in progress", path, inner.path);
                return Err(RegistryError::LoadInProgress);
            }
            inner.state = ModelState::Loading;
            inner.path = path.to_string();
            inner.model = None;
            inner.last_error = None;
        }
        self.state_tx.send_replace(ModelState::Loading);
        log::info!("Loading model from: {}", path);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.build(path)))
            .unwrap_or_else(|_| Err("detector panicked during load".to_string()));

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(model) => {
                let model = Arc::new(model);
                log::info!(
                    "Model {} loaded successfully with {} classes",
                    path,
                    model.classes.len()
                );
                inner.state = ModelState::Ready;
                inner.model = Some(model.clone());
                drop(inner);
                self.state_tx.send_replace(ModelState::Ready);
                Ok(model)
            }
            Err(reason) => {
                log::error!("Failed to load model {}: {}", path, reason);
                inner.state = ModelState::Failed;
                inner.last_error = Some(reason.clone());
                drop(inner);
                self.state_tx.send_replace(ModelState::Failed);
                Err(RegistryError::LoadFailed(reason))
            }
        }
    }

    fn build(&self, path: &str) -> Result<LoadedModel, String> {
        let detector = self.loader.load(path).map_err(|e| e.to_string())?;

        let classes = match detector.class_names() {
            Some(classes) if !classes.is_empty() => classes,
            _ => {
                log::info!("Model {} exposes no class names, using default table", path);
                default_classes()
            }
        };

        let size = self.warmup_params.image_size;
        let blank = RgbImage::new(size, size);
        detector
            .detect(&blank, &self.warmup_params)
            .map_err(|e| format!("warm-up inference failed: {}", e))?;
        log::info!("Model test inference successful");

        Ok(LoadedModel {
            path: path.to_string(),
            classes,
            loaded_at: Utc::now(),
            detector,
        })
    }

    /// The active model, or `NotReady` without waiting if none is Ready.
    pub fn current(&self) -> Result<Arc<LoadedModel>, RegistryError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match (&inner.state, &inner.model) {
            (ModelState::Ready, Some(model)) => Ok(model.clone()),
            (state, _) => Err(RegistryError::NotReady(*state)),
        }
    }

    pub fn status(&self) -> RegistryStatus {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        RegistryStatus {
            state: inner.state,
            model_path: inner.path.clone(),
            class_count: inner.model.as_ref().map_or(0, |m| m.classes.len()),
            last_error: inner.last_error.clone(),
            loaded_at: inner.model.as_ref().map(|m| m.loaded_at),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ModelState> {
        self.state_tx.subscribe()
    }
}
