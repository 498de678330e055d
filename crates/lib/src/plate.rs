//! License plate matching over OCR text.
//!
//! A plate is any run of 2 to 8 uppercase ASCII letters or digits. No regional plate grammar.

use std::sync::OnceLock;

use regex::Regex;

pub const LICENSE_PLATE_PATTERN: &str = "[A-Z0-9]{2,8}";

fn plate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LICENSE_PLATE_PATTERN).expect("plate pattern is valid"))
}

/// Outcome of plate matching on one OCR result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    pub plate: Option<String>,
}

impl ExtractionResult {
    pub fn found(&self) -> bool {
        self.plate.is_some()
    }
}

/// First qualifying run in left-to-right order, or an empty result.
pub fn find_plate(text: &str) -> ExtractionResult {
    ExtractionResult {
        plate: plate_regex().find(text).map(|m| m.as_str().to_string()),
    }
}
