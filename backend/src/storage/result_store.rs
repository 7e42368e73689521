use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_PREFIX: &str = "yolo_result";
const RANDOM_ID_LEN: usize = 8;
const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, PartialEq)]
pub struct ResultArtifact {
    pub filename: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Artifact not found: {0}")]
    NotFound(String),
}

/// Local directory of annotated result images.
///
/// Names are `<prefix>_<unix seconds>_<random id>.jpg`; the random part keeps
/// names unique across requests finishing in the same second.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
    prefix: String,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generate_filename(&self, created_at: DateTime<Utc>) -> String {
        let random_id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_ID_LEN)
            .map(char::from)
            .collect();
        format!(
            "{}_{}_{}.jpg",
            self.prefix,
            created_at.timestamp(),
            random_id.to_ascii_lowercase()
        )
    }

    /// Encodes first so a failed encode never leaves a file behind.
    pub fn save(&self, image: &RgbImage) -> Result<ResultArtifact, StoreError> {
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY).encode_image(image)?;

        std::fs::create_dir_all(&self.root)?;

        let created_at = Utc::now();
        let (filename, mut file) = loop {
            let filename = self.generate_filename(created_at);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.root.join(&filename))
            {
                Ok(file) => break (filename, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        };

        let path = self.root.join(&filename);
        if let Err(e) = file.write_all(&encoded).and_then(|()| file.sync_all()) {
            drop(file);
            if let Err(cleanup) = std::fs::remove_file(&path) {
                log::warn!("Failed to remove partial result {}: {}", path.display(), cleanup);
            }
            return Err(e.into());
        }

        log::info!("Result image saved to: {}", path.display());
        Ok(ResultArtifact {
            filename,
            path,
            created_at,
        })
    }

    pub fn retrieve(&self, filename: &str) -> Result<Vec<u8>, StoreError> {
        if !is_plain_filename(filename) {
            return Err(StoreError::NotFound(filename.to_string()));
        }
        match std::fs::read(self.root.join(filename)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}
