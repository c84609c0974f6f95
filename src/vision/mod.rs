//! Vision/OCR Layer
//!
//! Turns a photographed or scanned page into bilingual text:
//! - image normalization and zone detection
//! - per-zone Hindi/English arbitration and mixed-script splitting
//! - whole-image candidate selection across variants and backends
//! - aggregation into one [`OcrResult`] and a plain-text report

pub mod aggregate;
pub mod filters;
pub mod language;
pub mod pipeline;
pub mod preprocess;
pub mod scoring;
pub mod script;
pub mod selector;
pub mod tensor;
pub mod types;
pub mod zones;

pub use aggregate::{generate_report, ResultAggregator};
pub use language::{Classification, LanguageClassifier};
pub use pipeline::{load_image, OcrPipeline, WholeImageOutput};
pub use preprocess::{ImagePreprocessor, PreparedImage};
pub use scoring::zone_confidence;
pub use script::{split_by_script, ScriptParts};
pub use selector::{Backend, BackendChain, CandidateSelector, RecognitionCandidate, Variant};
pub use types::{Detection, Language, OcrResult, TextZone, Zone};
pub use zones::{DetectionStrategy, ZoneDetector};
