#![allow(dead_code)]

use base64::{Engine as _, engine::general_purpose::STANDARD};
use detection_service::config::ServiceConfig;
use detection_service::detector::DefaultLoader;
use detection_service::service::InferenceService;
use image::{ImageFormat, Rgb, RgbImage};
use shared::InferenceRequest;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const MANIFEST: &str = r#"
name: placeholder
classes: [person, bicycle, car]
detections:
  - { class_id: 0, confidence: 0.95, bbox: [0.10, 0.15, 0.35, 0.90] }
  - { class_id: 2, confidence: 0.87, bbox: [0.50, 0.40, 0.80, 0.65] }
"#;

pub fn write_manifest(dir: &Path) -> PathBuf {
    let path = dir.join("placeholder.yaml");
    std::fs::write(&path, MANIFEST).unwrap();
    path
}

pub fn config(results_dir: PathBuf) -> ServiceConfig {
    ServiceConfig {
        results_dir,
        fetch_timeout: Duration::from_millis(300),
        ..ServiceConfig::default()
    }
}

pub fn service_with(config: ServiceConfig) -> InferenceService {
    let loader = Arc::new(DefaultLoader::new(config.defaults.device.clone()));
    InferenceService::new(config, loader).unwrap()
}

/// A service with the placeholder manifest loaded and results under `dir`.
pub fn ready_service(dir: &Path) -> InferenceService {
    let service = service_with(config(dir.join("results")));
    let manifest = write_manifest(dir);
    service.registry().load(manifest.to_str().unwrap()).unwrap();
    service
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 180, 160]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

pub fn inline_request(width: u32, height: u32) -> InferenceRequest {
    InferenceRequest {
        image_data: Some(STANDARD.encode(png_bytes(width, height))),
        ..InferenceRequest::default()
    }
}
