mod common;

use common::*;
use futures::future::join_all;
use shared::{InferenceRequest, ModelState};
use std::collections::HashSet;
use std::net::TcpListener;
use std::time::{Duration, Instant};

#[actix_web::test]
async fn predict_while_unloaded_reports_model_not_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(config(dir.path().join("results")));

    let health = service.health();
    assert!(!health.model_loaded);
    assert_eq!(health.state, ModelState::Unloaded);

    let response = service.predict(inline_request(64, 64)).await;
    assert!(!response.success);
    assert_eq!(response.error_kind.as_deref(), Some("model_not_loaded"));
    assert_eq!(response.message, "Model not loaded");
    assert!(response.detections.is_empty());
}

#[actix_web::test]
async fn request_without_a_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());

    let response = service.predict(InferenceRequest::default()).await;
    assert!(!response.success);
    assert_eq!(response.error_kind.as_deref(), Some("image_source_missing"));
    assert!(response.result_artifact.is_empty());
}

#[actix_web::test]
async fn threshold_keeps_only_the_confident_detection() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());

    let request = InferenceRequest {
        confidence: Some(0.9),
        ..inline_request(200, 100)
    };
    let response = service.predict(request).await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.detections.len(), 1);
    let detection = &response.detections[0];
    assert_eq!(detection.class_name, "person");
    assert_eq!(detection.confidence, 0.95);
    assert!((detection.bbox.x1 - 20.0).abs() < 1e-3);
    assert!((detection.center.width - 50.0).abs() < 1e-3);

    let info = response.image_info.unwrap();
    assert_eq!((info.width, info.height, info.channels), (200, 100, 3));
    assert!(response.result_artifact.starts_with("yolo_result_"));
    assert!(std::path::Path::new(&response.result_image_path).exists());
}

#[actix_web::test]
async fn detections_are_ranked_and_capped() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());

    let all = service
        .predict(InferenceRequest {
            confidence: Some(0.0),
            ..inline_request(100, 100)
        })
        .await;
    let confidences: Vec<f32> = all.detections.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.95, 0.87]);

    let capped = service
        .predict(InferenceRequest {
            confidence: Some(0.0),
            max_detections: Some(1),
            ..inline_request(100, 100)
        })
        .await;
    assert_eq!(capped.detections.len(), 1);
    assert_eq!(capped.detections[0].confidence, 0.95);
}

#[actix_web::test]
async fn out_of_range_parameters_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());

    let response = service
        .predict(InferenceRequest {
            iou_threshold: Some(1.5),
            ..inline_request(32, 32)
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.error_kind.as_deref(), Some("invalid_parameters"));
}

#[actix_web::test]
async fn path_source_wins_over_inline_data_and_url() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());
    let image_path = dir.path().join("input.png");
    std::fs::write(&image_path, png_bytes(40, 30)).unwrap();

    let response = service
        .predict(InferenceRequest {
            image_path: Some(image_path.display().to_string()),
            image_data: Some("not base64 at all".into()),
            image_url: Some("http://127.0.0.1:1/unreachable.png".into()),
            ..InferenceRequest::default()
        })
        .await;
    assert!(response.success, "{}", response.message);
    assert_eq!(response.image_info.unwrap().width, 40);
}

#[actix_web::test]
async fn undecodable_inline_data_is_a_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());

    let response = service
        .predict(InferenceRequest {
            image_data: Some("aGVsbG8gd29ybGQ=".into()),
            ..InferenceRequest::default()
        })
        .await;
    assert_eq!(response.error_kind.as_deref(), Some("image_decode_failure"));
}

#[actix_web::test]
async fn concurrent_predictions_get_distinct_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());

    let responses = join_all((0..8).map(|_| service.predict(inline_request(64, 48)))).await;

    let names: HashSet<String> = responses
        .iter()
        .map(|r| {
            assert!(r.success, "{}", r.message);
            r.result_artifact.clone()
        })
        .collect();
    assert_eq!(names.len(), 8);
    for name in &names {
        assert!(service.store().retrieve(name).is_ok());
    }
}

#[actix_web::test]
async fn unwritable_results_dir_degrades_to_an_empty_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("plain-file");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let service = service_with(config(blocker.join("results")));
    let manifest = write_manifest(dir.path());
    service.registry().load(manifest.to_str().unwrap()).unwrap();

    let response = service.predict(inline_request(100, 100)).await;
    assert!(response.success);
    assert_eq!(response.detections.len(), 2);
    assert!(response.result_artifact.is_empty());
    assert!(response.result_image_path.is_empty());
    assert!(response.error_kind.is_none());
    assert!(response.message.contains("Failed to write result artifact"));
}

#[actix_web::test]
async fn slow_remote_source_times_out_as_fetch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());

    // Connections queue in the backlog and never get a reply.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/image.png", listener.local_addr().unwrap());

    let started = Instant::now();
    let response = service
        .predict(InferenceRequest {
            image_url: Some(url),
            ..InferenceRequest::default()
        })
        .await;
    assert_eq!(response.error_kind.as_deref(), Some("image_fetch_failure"));
    assert!(started.elapsed() < Duration::from_secs(3));
    drop(listener);
}

#[actix_web::test]
async fn broken_model_leaves_the_registry_failed() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(config(dir.path().join("results")));

    let err = service
        .load_model(dir.path().join("model.onnx").display().to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "model_load_failure");

    let health = service.health();
    assert_eq!(health.state, ModelState::Failed);
    assert_eq!(health.status, "unhealthy");
    assert!(health.last_error.is_some());
    assert!(!health.model_loaded);
}

#[actix_web::test]
async fn reload_replaces_the_active_model() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path());

    let other = dir.path().join("other.yml");
    std::fs::write(
        &other,
        "name: other\nclasses: [cat]\ndetections:\n  - { class_id: 0, confidence: 0.7, bbox: [0.0, 0.0, 0.5, 0.5] }\n",
    )
    .unwrap();

    let loaded = service.load_model(other.display().to_string()).await.unwrap();
    assert!(loaded.success);
    assert_eq!(loaded.message, "Model loaded successfully with 1 classes");

    let info = service.model_info();
    assert_eq!(info.model_type, "other");
    assert_eq!(info.classes, vec!["cat".to_string()]);

    let response = service.predict(inline_request(20, 20)).await;
    assert_eq!(response.detections.len(), 1);
    assert_eq!(response.detections[0].class_name, "cat");
}
