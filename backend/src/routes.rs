use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, Error, HttpResponse};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::Serialize;
use shared::{InferenceRequest, InferenceResponse, LoadModelRequest, LoadModelResponse};
use std::str::FromStr;

use crate::error::InferenceError;
use crate::service::InferenceService;
use crate::storage::StoreError;

/// Largest multipart part accepted by `/predict/upload`.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/model_info").route(web::get().to(model_info)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/predict/upload").route(web::post().to(predict_upload)))
        .service(web::resource("/result/{filename}").route(web::get().to(get_result)))
        .service(web::resource("/load_model").route(web::post().to(load_model)));
}

/// HTTP status for a predict response; the body is returned unchanged.
pub fn predict_status(response: &InferenceResponse) -> StatusCode {
    match response.error_kind.as_deref() {
        None => StatusCode::OK,
        Some("model_not_loaded") | Some("load_in_progress") => StatusCode::SERVICE_UNAVAILABLE,
        Some("image_source_missing") | Some("image_decode_failure") | Some("invalid_parameters") => {
            StatusCode::BAD_REQUEST
        }
        Some("image_fetch_failure") => StatusCode::BAD_GATEWAY,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn health(service: web::Data<InferenceService>) -> HttpResponse {
    HttpResponse::Ok().json(service.health())
}

async fn model_info(service: web::Data<InferenceService>) -> HttpResponse {
    HttpResponse::Ok().json(service.model_info())
}

async fn predict(
    service: web::Data<InferenceService>,
    request: web::Json<InferenceRequest>,
) -> HttpResponse {
    let response = service.predict(request.into_inner()).await;
    HttpResponse::build(predict_status(&response)).json(response)
}

async fn predict_upload(
    service: web::Data<InferenceService>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut request = InferenceRequest::default();

    // Malformed or truncated bodies surface as 400 through `MultipartError`.
    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let is_file = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .is_some();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                warn!("Rejecting upload field {}: larger than {} bytes", name, MAX_UPLOAD_BYTES);
                return Err(actix_web::error::ErrorPayloadTooLarge(format!(
                    "Upload field {} exceeds {} bytes",
                    name, MAX_UPLOAD_BYTES
                )));
            }
            data.extend_from_slice(&chunk);
        }

        if is_file {
            if request.image_data.is_none() && !data.is_empty() {
                request.image_data = Some(STANDARD.encode(&data));
            }
            continue;
        }

        let value = String::from_utf8_lossy(&data).trim().to_string();
        match name.as_str() {
            "confidence" => request.confidence = Some(parse_field(&name, &value)?),
            "iou_threshold" => request.iou_threshold = Some(parse_field(&name, &value)?),
            "image_size" => request.image_size = Some(parse_field(&name, &value)?),
            "max_detections" => request.max_detections = Some(parse_field(&name, &value)?),
            "device" => request.device = Some(value),
            other => warn!("Ignoring unknown upload field: {}", other),
        }
    }

    let response = service.predict(request).await;
    Ok(HttpResponse::build(predict_status(&response)).json(response))
}

fn parse_field<T: FromStr>(name: &str, value: &str) -> Result<T, Error> {
    value.parse().map_err(|_| {
        actix_web::error::ErrorBadRequest(format!("Invalid value for {}: {}", name, value))
    })
}

async fn get_result(service: web::Data<InferenceService>, path: web::Path<String>) -> HttpResponse {
    let filename = path.into_inner();
    let store = service.store().clone();
    let lookup = filename.clone();
    let outcome = web::block(move || store.retrieve(&lookup)).await;

    match outcome {
        Ok(Ok(bytes)) => HttpResponse::Ok().content_type("image/jpeg").body(bytes),
        Ok(Err(StoreError::NotFound(_))) => {
            info!("Result image not found: {}", filename);
            HttpResponse::NotFound().json(ErrorResponse {
                error: "Result image not found".into(),
            })
        }
        Ok(Err(e)) => {
            error!("Failed to read result image {}: {}", filename, e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to read result image".into(),
            })
        }
        Err(e) => {
            error!("Result lookup task failed: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to read result image".into(),
            })
        }
    }
}

async fn load_model(
    service: web::Data<InferenceService>,
    request: web::Json<LoadModelRequest>,
) -> HttpResponse {
    let path = request.into_inner().model_path;
    if path.trim().is_empty() {
        return HttpResponse::BadRequest().json(LoadModelResponse {
            success: false,
            message: "model_path must not be empty".into(),
        });
    }

    match service.load_model(path).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            let status = match e {
                InferenceError::LoadInProgress => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            HttpResponse::build(status).json(LoadModelResponse {
                success: false,
                message: e.to_string(),
            })
        }
    }
}
