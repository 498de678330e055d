//! Reply texts, Block Kit payloads, and the car problem modal.

use crate::channels::SlackFile;
use crate::plate::ExtractionResult;
use serde_json::{json, Value};

pub const CAR_PROBLEM_COMMAND: &str = "/carproblem";
pub const CAR_PROBLEM_CALLBACK_ID: &str = "car_problem_modal";

pub const IMAGE_BLOCK_ID: &str = "plate_image_block";
pub const IMAGE_ACTION_ID: &str = "plate_image";
pub const NOTE_BLOCK_ID: &str = "note_block";
pub const NOTE_ACTION_ID: &str = "note";

pub const GREETING: &str =
    "Upload an image with a license plate, and I'll extract the plate number for you!";
pub const PROCESSING: &str = "Processing your image...";
pub const PLACEHOLDER: &str = ":hourglass_flowing_sand: Processing your image...";
pub const NOT_FOUND: &str = "Sorry, I couldn't detect any license plate in this image.";
pub const ERROR_REPLY: &str = "Sorry, I encountered an error while processing your image.";
pub const NO_FILE_WARNING: &str =
    ":warning: No image was attached. Run /carproblem again and upload a photo of the plate.";

/// Longest error text shown to users in a failure message.
pub const MAX_ERROR_CHARS: usize = 100;

pub fn found_reply(plate: &str) -> String {
    format!("Found license plate: `{}`", plate)
}

/// Plain-text summary of a pipeline result (used as the message `text` fallback).
pub fn result_text(result: &ExtractionResult) -> String {
    match result.plate.as_deref() {
        Some(plate) => found_reply(plate),
        None => NOT_FOUND.to_string(),
    }
}

/// Cut `message` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_error(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let mut out: String = message.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// views.open payload for /carproblem. `channel` is echoed back in `private_metadata`.
pub fn car_problem_modal(channel: &str) -> Value {
    json!({
        "type": "modal",
        "callback_id": CAR_PROBLEM_CALLBACK_ID,
        "private_metadata": channel,
        "title": { "type": "plain_text", "text": "Report a car problem" },
        "submit": { "type": "plain_text", "text": "Submit" },
        "close": { "type": "plain_text", "text": "Cancel" },
        "blocks": [
            {
                "type": "input",
                "block_id": IMAGE_BLOCK_ID,
                "optional": true,
                "label": { "type": "plain_text", "text": "Photo of the license plate" },
                "element": {
                    "type": "file_input",
                    "action_id": IMAGE_ACTION_ID,
                    "filetypes": ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff"],
                    "max_files": 1
                }
            },
            {
                "type": "input",
                "block_id": NOTE_BLOCK_ID,
                "optional": true,
                "label": { "type": "plain_text", "text": "What's the problem?" },
                "element": {
                    "type": "plain_text_input",
                    "action_id": NOTE_ACTION_ID,
                    "multiline": true
                }
            }
        ]
    })
}

/// Values a user submitted through the car problem modal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarProblemSubmission {
    pub file: Option<SlackFile>,
    pub note: Option<String>,
}

impl CarProblemSubmission {
    /// Read the file input and note from `view.state.values`.
    pub fn from_values(values: &Value) -> Self {
        let file = values
            .get(IMAGE_BLOCK_ID)
            .and_then(|b| b.get(IMAGE_ACTION_ID))
            .and_then(|a| a.get("files"))
            .and_then(|f| f.as_array())
            .and_then(|files| files.first())
            .and_then(|f| serde_json::from_value::<SlackFile>(f.clone()).ok());
        let note = values
            .get(NOTE_BLOCK_ID)
            .and_then(|b| b.get(NOTE_ACTION_ID))
            .and_then(|a| a.get("value"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self { file, note }
    }
}

fn section(text: &str) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

fn context(text: &str) -> Value {
    json!({ "type": "context", "elements": [{ "type": "mrkdwn", "text": text }] })
}

/// Final message for a processed submission: plate (or not-found), thumbnail, note, timestamp.
pub fn success_blocks(
    result: &ExtractionResult,
    thumbnail: Option<&str>,
    note: Option<&str>,
    user_id: &str,
    timestamp: &str,
) -> Value {
    let headline = match result.plate.as_deref() {
        Some(plate) => format!(":white_check_mark: *License plate detected:* `{}`", plate),
        None => format!(":mag: {}", NOT_FOUND),
    };
    let mut plate_section = section(&headline);
    if let Some(url) = thumbnail {
        plate_section["accessory"] = json!({
            "type": "image",
            "slack_file": { "url": url },
            "alt_text": "Submitted photo"
        });
    }
    let mut blocks = vec![
        json!({ "type": "header", "text": { "type": "plain_text", "text": "Car problem report" } }),
        plate_section,
    ];
    if let Some(note) = note {
        blocks.push(section(&format!("*Note:* {}", note)));
    }
    blocks.push(context(&format!("Reported by <@{}> · {}", user_id, timestamp)));
    Value::Array(blocks)
}

/// Final message when the pipeline failed. The error text is cut to [`MAX_ERROR_CHARS`].
pub fn failure_blocks(error: &str, user_id: &str, timestamp: &str) -> Value {
    json!([
        section(&format!(":x: {}", ERROR_REPLY)),
        context(&format!("Error: {}", truncate_error(error, MAX_ERROR_CHARS))),
        context(&format!("Reported by <@{}> · {}", user_id, timestamp)),
    ])
}
