use actix_web::web;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::RgbImage;
use shared::{ImageInfo, InferenceRequest};
use std::time::Duration;
use url::Url;

use crate::error::InferenceError;

/// The single image source honored for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource<'a> {
    Path(&'a str),
    Inline(&'a str),
    Url(&'a str),
}

impl<'a> ImageSource<'a> {
    /// Fixed priority: path, then inline data, then URL. Later sources are
    /// ignored when an earlier one is populated.
    pub fn select(request: &'a InferenceRequest) -> Option<Self> {
        fn populated(field: &Option<String>) -> Option<&str> {
            field.as_deref().filter(|value| !value.trim().is_empty())
        }

        populated(&request.image_path)
            .map(ImageSource::Path)
            .or_else(|| populated(&request.image_data).map(ImageSource::Inline))
            .or_else(|| populated(&request.image_url).map(ImageSource::Url))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::Path(_) => "path",
            ImageSource::Inline(_) => "inline",
            ImageSource::Url(_) => "url",
        }
    }
}

#[derive(Debug)]
pub struct AcquiredImage {
    pub image: RgbImage,
    pub info: ImageInfo,
}

#[derive(Clone)]
pub struct ImageAcquirer {
    client: reqwest::Client,
    fetch_timeout: Duration,
}

impl ImageAcquirer {
    pub fn new(fetch_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            client,
            fetch_timeout,
        })
    }

    pub async fn resolve(&self, request: &InferenceRequest) -> Result<AcquiredImage, InferenceError> {
        let source = ImageSource::select(request).ok_or(InferenceError::ImageSourceMissing)?;
        log::debug!("Resolving image from {} source", source.kind());
        self.resolve_source(source).await
    }

    /// File reads and image decoding run on the blocking pool; only the
    /// remote fetch is awaited on the calling worker.
    pub async fn resolve_source(&self, source: ImageSource<'_>) -> Result<AcquiredImage, InferenceError> {
        match source {
            ImageSource::Path(path) => {
                let path = path.to_string();
                off_worker(move || {
                    let bytes = std::fs::read(&path).map_err(|e| {
                        InferenceError::ImageDecodeFailure(format!(
                            "failed to load image from path {}: {}",
                            path, e
                        ))
                    })?;
                    decode_image(&bytes)
                })
                .await
            }
            ImageSource::Inline(data) => {
                let bytes = decode_inline(data)?;
                off_worker(move || decode_image(&bytes)).await
            }
            ImageSource::Url(raw) => {
                let bytes = self.fetch(raw).await?;
                off_worker(move || decode_image(&bytes)).await
            }
        }
    }

    async fn fetch(&self, raw: &str) -> Result<Vec<u8>, InferenceError> {
        let url = Url::parse(raw.trim()).map_err(|e| {
            InferenceError::ImageFetchFailure(format!("invalid URL {}: {}", raw, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(InferenceError::ImageFetchFailure(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let fetch_failure = |e: reqwest::Error| {
            if e.is_timeout() {
                InferenceError::ImageFetchFailure(format!(
                    "timed out after {:?} fetching {}",
                    self.fetch_timeout, raw
                ))
            } else {
                InferenceError::ImageFetchFailure(format!("{}: {}", raw, e))
            }
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(fetch_failure)?
            .error_for_status()
            .map_err(fetch_failure)?;
        let body = response.bytes().await.map_err(fetch_failure)?;
        Ok(body.to_vec())
    }
}

async fn off_worker<F>(work: F) -> Result<AcquiredImage, InferenceError>
where
    F: FnOnce() -> Result<AcquiredImage, InferenceError> + Send + 'static,
{
    web::block(work).await.map_err(|e| {
        InferenceError::ImageDecodeFailure(format!("blocking task failed: {}", e))
    })?
}

fn decode_inline(data: &str) -> Result<Vec<u8>, InferenceError> {
    let data = data.trim();
    let payload = match data.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .ok_or_else(|| {
                InferenceError::ImageDecodeFailure("data URL is not base64 encoded".to_string())
            })?,
        None => data,
    };
    STANDARD
        .decode(payload)
        .map_err(|e| InferenceError::ImageDecodeFailure(format!("invalid base64 data: {}", e)))
}

fn decode_image(bytes: &[u8]) -> Result<AcquiredImage, InferenceError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| InferenceError::ImageDecodeFailure(e.to_string()))?;
    let info = ImageInfo {
        width: decoded.width(),
        height: decoded.height(),
        channels: decoded.color().channel_count(),
    };
    Ok(AcquiredImage {
        image: decoded.to_rgb8(),
        info,
    })
}
