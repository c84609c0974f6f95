//! bilingual-ocr - Zone-aware Hindi/English OCR
//!
//! Normalizes a photographed or scanned page, finds text zones, decides
//! each zone's script by probing Devanagari and Latin recognizers, and
//! aggregates the readings into one bilingual result.

pub mod backends;
pub mod config;
pub mod error;
pub mod output;
pub mod storage;
pub mod vision;

#[cfg(test)]
mod testing;

pub use backends::Collaborators;
pub use config::AppConfig;
pub use error::{OcrError, Result};
pub use output::OutputRecord;
pub use vision::{generate_report, Language, OcrPipeline, OcrResult};
