use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::params::InferenceParams;

pub const DEFAULT_MODEL_PATH: &str = "yolo11n.pt";
pub const DEFAULT_RESULTS_DIR: &str = "/tmp/cnet/yolo_results";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Inference parameters used when a request omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceDefaults {
    pub confidence: f32,
    pub iou_threshold: f32,
    pub image_size: u32,
    pub max_detections: usize,
    pub device: String,
}

impl Default for InferenceDefaults {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            iou_threshold: 0.45,
            image_size: 640,
            max_detections: 100,
            device: "cpu".to_string(),
        }
    }
}

impl InferenceDefaults {
    pub fn params(&self) -> InferenceParams {
        InferenceParams {
            confidence: self.confidence,
            iou_threshold: self.iou_threshold,
            image_size: self.image_size,
            max_detections: self.max_detections,
            device: self.device.clone(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.params()
            .validate()
            .map_err(|reason| ConfigError::InvalidValue {
                key: "inference defaults".to_string(),
                value: reason,
            })
    }
}

/// Optional YAML overlay pointed to by `INFERENCE_CONFIG`.
///
/// ```yaml
/// inference:
///   confidence: 0.25
///   max_detections: 300
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InferenceFileConfig {
    #[serde(default)]
    pub inference: InferenceOverrides,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InferenceOverrides {
    pub confidence: Option<f32>,
    pub iou_threshold: Option<f32>,
    pub image_size: Option<u32>,
    pub max_detections: Option<usize>,
    pub device: Option<String>,
}

impl InferenceFileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Self, ConfigError> {
        let config: InferenceFileConfig = serde_yaml::from_str(config_str)?;
        Ok(config)
    }

    pub fn apply(self, defaults: &mut InferenceDefaults) {
        let overrides = self.inference;
        if let Some(confidence) = overrides.confidence {
            defaults.confidence = confidence;
        }
        if let Some(iou) = overrides.iou_threshold {
            defaults.iou_threshold = iou;
        }
        if let Some(size) = overrides.image_size {
            defaults.image_size = size;
        }
        if let Some(max) = overrides.max_detections {
            defaults.max_detections = max;
        }
        if let Some(device) = overrides.device {
            defaults.device = device;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub model_path: String,
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub results_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub defaults: InferenceDefaults,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL_PATH.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            fetch_timeout: Duration::from_secs(10),
            defaults: InferenceDefaults::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServiceConfig::default();

        if let Some(path) = lookup("YOLO_MODEL_PATH") {
            config.model_path = path;
        }
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "PORT")? {
            config.port = port;
        }
        config.workers = parse_var(&lookup, "WORKERS")?;
        if let Some(dir) = lookup("RESULTS_DIR") {
            config.results_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout = Duration::from_secs(secs);
        }

        if let Some(path) = lookup("INFERENCE_CONFIG") {
            InferenceFileConfig::load(Path::new(&path))?.apply(&mut config.defaults);
        }
        if let Some(confidence) = parse_var(&lookup, "DEFAULT_CONFIDENCE")? {
            config.defaults.confidence = confidence;
        }
        if let Some(iou) = parse_var(&lookup, "DEFAULT_IOU_THRESHOLD")? {
            config.defaults.iou_threshold = iou;
        }
        if let Some(size) = parse_var(&lookup, "DEFAULT_IMAGE_SIZE")? {
            config.defaults.image_size = size;
        }
        if let Some(max) = parse_var(&lookup, "DEFAULT_MAX_DETECTIONS")? {
            config.defaults.max_detections = max;
        }
        if let Some(device) = lookup("DEFAULT_DEVICE") {
            config.defaults.device = device;
        }

        config.defaults.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.model_path, "yolo11n.pt");
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.results_dir, PathBuf::from("/tmp/cnet/yolo_results"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.defaults, InferenceDefaults::default());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("RESULTS_DIR", "/var/results"),
            ("DEFAULT_CONFIDENCE", "0.25"),
            ("DEFAULT_MAX_DETECTIONS", "300"),
            ("WORKERS", "4"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.results_dir, PathBuf::from("/var/results"));
        assert_eq!(config.defaults.confidence, 0.25);
        assert_eq!(config.defaults.max_detections, 300);
    }

    #[test]
    fn malformed_and_out_of_range_values_are_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));

        let err =
            ServiceConfig::from_lookup(lookup_from(&[("DEFAULT_CONFIDENCE", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn yaml_overlay_only_touches_listed_fields() {
        let mut defaults = InferenceDefaults::default();
        InferenceFileConfig::parse("inference:\n  confidence: 0.3\n  device: cuda\n")
            .unwrap()
            .apply(&mut defaults);
        assert_eq!(defaults.confidence, 0.3);
        assert_eq!(defaults.device, "cuda");
        assert_eq!(defaults.iou_threshold, 0.45);
        assert_eq!(defaults.image_size, 640);
    }
}
