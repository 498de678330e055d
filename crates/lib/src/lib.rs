//! Kestrel core library: Slack plate bot, OCR pipeline, and text model dispatch
//! shared by the CLI and desktop applications.

pub mod bot;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod plate;
