//! Image fetch & OCR extraction: authenticated download, decode, OCR, plate match.
//!
//! One call handles one image end to end. Nothing is retried; the first failure is
//! returned to the caller, which turns it into a user-facing message.

use crate::ocr::{OcrEngine, OcrError};
use crate::plate::{find_plate, ExtractionResult};
use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("download failed: {0}")]
    Network(String),
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Network(e.to_string())
    }
}

/// Decoded image held for one OCR call.
#[derive(Debug)]
pub struct RawMedia {
    pub image: DynamicImage,
}

/// Decode raw bytes, guessing the format from the content.
pub fn decode(bytes: &[u8]) -> Result<RawMedia, PipelineError> {
    let image = image::load_from_memory(bytes)?;
    Ok(RawMedia { image })
}

/// Downloads private Slack files (or any bearer-protected URL).
#[derive(Clone, Default)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// GET `url` with `Authorization: Bearer <token>`. Non-2xx is a network error.
    pub async fn fetch(&self, url: &str, token: &str) -> Result<Bytes, PipelineError> {
        let res = self.client.get(url).bearer_auth(token).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            return Err(PipelineError::Network(format!("GET {} returned {}", url, status)));
        }
        Ok(res.bytes().await?)
    }
}

/// Seam between chat handlers and the image pipeline.
#[async_trait]
pub trait PlateExtractor: Send + Sync {
    /// Fetch the image at `url` with `token` and return the first plate-like token, if any.
    async fn extract(&self, url: &str, token: &str) -> Result<ExtractionResult, PipelineError>;
}

/// Production pipeline: fetch → decode → OCR → plate match.
#[derive(Clone)]
pub struct PlatePipeline {
    fetcher: ImageFetcher,
    ocr: Arc<dyn OcrEngine>,
}

impl PlatePipeline {
    pub fn new(fetcher: ImageFetcher, ocr: Arc<dyn OcrEngine>) -> Self {
        Self { fetcher, ocr }
    }

    /// Decode, OCR, and match already-downloaded bytes. Blocks while the engine runs.
    pub fn extract_from_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult, PipelineError> {
        recognize_plate(self.ocr.as_ref(), decode(bytes)?)
    }
}

fn recognize_plate(ocr: &dyn OcrEngine, media: RawMedia) -> Result<ExtractionResult, PipelineError> {
    let text = ocr.recognize(&media.image)?;
    drop(media);
    log::debug!("{} returned {} chars", ocr.name(), text.len());
    Ok(find_plate(&text))
}

#[async_trait]
impl PlateExtractor for PlatePipeline {
    async fn extract(&self, url: &str, token: &str) -> Result<ExtractionResult, PipelineError> {
        let bytes = self.fetcher.fetch(url, token).await?;
        log::debug!("downloaded {} bytes from {}", bytes.len(), url);
        let ocr = Arc::clone(&self.ocr);
        tokio::task::spawn_blocking(move || recognize_plate(ocr.as_ref(), decode(&bytes)?))
            .await
            .map_err(|e| PipelineError::Ocr(OcrError::Engine(format!("ocr task failed: {}", e))))?
    }
}
