//! External collaborators
//!
//! Recognition engines, super-resolution, text-box detection and language
//! model correction sit behind one trait per role. Concrete implementations
//! are chosen once by [`Collaborators::probe`]; when probing fails the no-op
//! implementation of the role is registered instead, so call sites never
//! check availability themselves.
//!
//! Every call into a collaborator goes through [`contain`]: errors and
//! panics are logged and turned into `None`, never propagated.

pub mod east;
pub mod mlm;
pub mod models;
pub mod remote;
pub mod super_resolution;
pub mod tesseract;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::vision::{Detection, Language, Zone};

pub use east::EastDetector;
pub use mlm::MlmCorrector;
pub use models::{ModelKind, ModelManager, OnnxSession};
pub use remote::RemoteRecognizer;
pub use super_resolution::OnnxSuperResolution;
pub use tesseract::TesseractRecognizer;

/// A text recognition capability
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Line-level fragments found in `region`
    fn recognize(&self, region: &GrayImage) -> Result<Vec<Detection>>;

    /// Paragraph-level fragments: vertically adjacent lines are merged
    fn recognize_paragraphs(&self, region: &GrayImage) -> Result<Vec<Detection>> {
        Ok(group_paragraphs(self.recognize(region)?))
    }
}

/// Upscales an image before preprocessing
pub trait Enhancer: Send + Sync {
    fn name(&self) -> &str;
    fn enhance(&self, image: &RgbImage) -> Result<RgbImage>;
}

/// Proposes text boxes independently of the contour detector
pub trait BoxDetector: Send + Sync {
    fn name(&self) -> &str;
    fn detect_boxes(&self, image: &RgbImage) -> Result<Vec<Zone>>;
}

/// Rewrites recognized text into a more plausible form
pub trait Corrector: Send + Sync {
    fn name(&self) -> &str;
    fn correct(&self, text: &str, language: Language) -> Result<String>;
}

/// Registered when no recognizer is available for a role
pub struct NullRecognizer {
    name: String,
}

impl NullRecognizer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Recognizer for NullRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, _region: &GrayImage) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// Identity enhancer
pub struct Passthrough;

impl Enhancer for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn enhance(&self, image: &RgbImage) -> Result<RgbImage> {
        Ok(image.clone())
    }
}

impl Corrector for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn correct(&self, text: &str, _language: Language) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Detector that never proposes boxes
pub struct NoBoxes;

impl BoxDetector for NoBoxes {
    fn name(&self) -> &str {
        "none"
    }

    fn detect_boxes(&self, _image: &RgbImage) -> Result<Vec<Zone>> {
        Ok(Vec::new())
    }
}

/// Run a collaborator call, containing errors and panics
///
/// Returns `None` (after logging) when the call fails in any way.
pub fn contain<T, F>(what: &str, call: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("{} failed: {}", what, e);
            None
        }
        Err(_) => {
            warn!("{} panicked", what);
            None
        }
    }
}

/// Merge line detections whose boxes touch vertically into paragraphs
///
/// Lines are taken in the order given; a line joins the current paragraph
/// when its top is within half a line height of the paragraph's bottom and
/// the two boxes overlap horizontally.
pub fn group_paragraphs(lines: Vec<Detection>) -> Vec<Detection> {
    struct Paragraph {
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
        texts: Vec<String>,
        confidences: Vec<f32>,
    }

    let mut paragraphs: Vec<Paragraph> = Vec::new();
    for line in lines {
        let (x, y, w, h) = line.bounds;
        let (right, bottom) = (x + w, y + h);

        if let Some(current) = paragraphs.last_mut() {
            let gap_ok = y <= current.bottom + h.max(1) / 2 + 1 && y + h >= current.top;
            let overlaps = x < current.right && right > current.left;
            if gap_ok && overlaps {
                current.left = current.left.min(x);
                current.top = current.top.min(y);
                current.right = current.right.max(right);
                current.bottom = current.bottom.max(bottom);
                current.texts.push(line.text);
                current.confidences.push(line.confidence);
                continue;
            }
        }
        paragraphs.push(Paragraph {
            left: x,
            top: y,
            right,
            bottom,
            texts: vec![line.text],
            confidences: vec![line.confidence],
        });
    }

    paragraphs
        .into_iter()
        .map(|p| {
            let confidence = p.confidences.iter().sum::<f32>() / p.confidences.len().max(1) as f32;
            Detection::new(
                (p.left, p.top, p.right - p.left, p.bottom - p.top),
                p.texts.join(" "),
                confidence,
            )
        })
        .collect()
}

/// Collaborators selected once at startup
///
/// Cloning shares the underlying handles.
#[derive(Clone)]
pub struct Collaborators {
    /// Devanagari-specialized recognizer
    pub hindi: Arc<dyn Recognizer>,
    /// Latin-specialized recognizer
    pub english: Arc<dyn Recognizer>,
    /// Combined Hindi+English recognizer for unhinted reading
    pub general: Arc<dyn Recognizer>,
    /// Remote OCR service
    pub remote: Arc<dyn Recognizer>,
    pub enhancer: Arc<dyn Enhancer>,
    pub detector: Arc<dyn BoxDetector>,
    pub corrector: Arc<dyn Corrector>,
}

impl Collaborators {
    /// Probe every capability once and register what is available
    pub fn probe(config: &AppConfig) -> Self {
        let backends = &config.backends;

        let hindi = probe_tesseract(config, &backends.tesseract_hindi, "tesseract-hin");
        let english = probe_tesseract(config, &backends.tesseract_english, "tesseract-eng");
        let combined = format!("{}+{}", backends.tesseract_hindi, backends.tesseract_english);
        let general = probe_tesseract(config, &combined, "tesseract-general");

        let remote: Arc<dyn Recognizer> = match &backends.remote_url {
            Some(url) => match RemoteRecognizer::new(url, backends.remote_timeout_secs) {
                Ok(r) => {
                    info!("Remote OCR service registered at {}", url);
                    Arc::new(r)
                }
                Err(e) => {
                    warn!("Remote OCR service unavailable: {}", e);
                    Arc::new(NullRecognizer::new("remote"))
                }
            },
            None => Arc::new(NullRecognizer::new("remote")),
        };

        let ai = &config.ai;
        let enhancer: Arc<dyn Enhancer> = if ai.enhance {
            match OnnxSuperResolution::locate(ai) {
                Ok(sr) => Arc::new(sr),
                Err(e) => {
                    warn!("Super-resolution disabled: {}", e);
                    Arc::new(Passthrough)
                }
            }
        } else {
            Arc::new(Passthrough)
        };

        let detector: Arc<dyn BoxDetector> = if ai.text_detect {
            match EastDetector::locate(ai) {
                Ok(east) => Arc::new(east),
                Err(e) => {
                    warn!("EAST text detection disabled: {}", e);
                    Arc::new(NoBoxes)
                }
            }
        } else {
            Arc::new(NoBoxes)
        };

        let corrector: Arc<dyn Corrector> = if ai.postcorrect {
            match MlmCorrector::locate(ai) {
                Ok(mlm) => Arc::new(mlm),
                Err(e) => {
                    warn!("Post-correction disabled: {}", e);
                    Arc::new(Passthrough)
                }
            }
        } else {
            Arc::new(Passthrough)
        };

        info!(
            "Collaborators: hindi={}, english={}, general={}, remote={}, enhancer={}, detector={}, corrector={}",
            hindi.name(),
            english.name(),
            general.name(),
            remote.name(),
            enhancer.name(),
            detector.name(),
            corrector.name()
        );

        Self {
            hindi,
            english,
            general,
            remote,
            enhancer,
            detector,
            corrector,
        }
    }

    /// Collaborators that do nothing; the base for tests and offline runs
    pub fn null() -> Self {
        Self {
            hindi: Arc::new(NullRecognizer::new("null-hin")),
            english: Arc::new(NullRecognizer::new("null-eng")),
            general: Arc::new(NullRecognizer::new("null-general")),
            remote: Arc::new(NullRecognizer::new("remote")),
            enhancer: Arc::new(Passthrough),
            detector: Arc::new(NoBoxes),
            corrector: Arc::new(Passthrough),
        }
    }

    /// Script-specialized recognizer for a language; English for anything
    /// that is not Hindi
    pub fn recognizer_for(&self, language: Language) -> &Arc<dyn Recognizer> {
        match language {
            Language::Hindi => &self.hindi,
            _ => &self.english,
        }
    }
}

fn probe_tesseract(config: &AppConfig, lang: &str, name: &str) -> Arc<dyn Recognizer> {
    match TesseractRecognizer::probe(&config.backends.tesseract_path, lang) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            warn!("{}", e);
            Arc::new(NullRecognizer::new(name))
        }
    }
}
