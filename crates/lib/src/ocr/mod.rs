//! OCR engines: turn a decoded image into raw text.
//!
//! The engine is an external collaborator; this module only defines the seam and the
//! Tesseract CLI adapter used in production.

mod tesseract;

pub use tesseract::TesseractEngine;

use image::DynamicImage;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("ocr engine unavailable: {0}")]
    Unavailable(String),
    #[error("ocr engine failed: {0}")]
    Engine(String),
    #[error("ocr io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ocr input encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Blocking OCR call. Implementations may spawn processes; callers run them off the async executor.
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs (e.g. "tesseract").
    fn name(&self) -> &str;

    /// One-time readiness check run at startup.
    fn warm_up(&self) -> Result<(), OcrError> {
        Ok(())
    }

    /// Recognize text in the image.
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}
