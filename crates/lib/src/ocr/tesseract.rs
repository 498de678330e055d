//! Tesseract CLI engine. No shell is used; arguments are passed as a list.

use super::{OcrEngine, OcrError};
use crate::config::OcrConfig;
use image::{DynamicImage, ImageFormat};
use std::io::Write;
use std::path::Path;
use std::process::Command;

/// Runs `tesseract <png> stdout -l <lang> [--psm N]` per image.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    language: String,
    psm: Option<u8>,
    grayscale: bool,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            language: config.language.clone(),
            psm: config.psm,
            grayscale: config.grayscale,
        }
    }

    fn args(&self, input: &Path) -> Vec<String> {
        let mut args = vec![
            input.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        if let Some(psm) = self.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }
        args
    }

    fn prepare(&self, image: &DynamicImage) -> DynamicImage {
        if self.grayscale {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            image.clone()
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn warm_up(&self) -> Result<(), OcrError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| OcrError::Unavailable(format!("{}: {}", self.binary, e)))?;
        if !output.status.success() {
            return Err(OcrError::Unavailable(format!(
                "{} --version exited with {}",
                self.binary, output.status
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        log::info!(
            "ocr engine ready: {}",
            version.lines().next().unwrap_or("tesseract")
        );
        Ok(())
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        // Removed when `scratch` drops, after tesseract has read it.
        let mut scratch = tempfile::Builder::new()
            .prefix("kestrel-ocr-")
            .suffix(".png")
            .tempfile()?;
        self.prepare(image)
            .write_to(scratch.as_file_mut(), ImageFormat::Png)?;
        scratch.as_file_mut().flush()?;
        let output = Command::new(&self.binary)
            .args(self.args(scratch.path()))
            .output()
            .map_err(|e| OcrError::Unavailable(format!("{}: {}", self.binary, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
