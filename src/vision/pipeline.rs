//! End-to-end OCR pipeline
//!
//! Two flows share one preprocessor:
//! - zone flow: preprocess, detect zones, classify and read each zone, score,
//!   aggregate
//! - whole-image flow: enhance, preprocess, resize, then the
//!   remote/local/general backend chain on the full image

use std::path::Path;
use std::time::Instant;

use image::{imageops, DynamicImage, GrayImage, RgbImage};
use rayon::prelude::*;
use tracing::{debug, info};

use super::aggregate::ResultAggregator;
use super::language::LanguageClassifier;
use super::preprocess::ImagePreprocessor;
use super::script::collapse_whitespace;
use super::scoring::zone_confidence;
use super::selector::{Backend, BackendChain, CandidateSelector};
use super::types::{Language, OcrResult, TextZone, Zone};
use super::zones::ZoneDetector;
use crate::backends::{contain, Collaborators};
use crate::config::{AppConfig, ScoringConfig};
use crate::error::{OcrError, Result};

/// Step label recorded when the enhancer changed the image size
const SUPER_RESOLUTION_STEP: &str = "super-resolution";

/// Outcome of the whole-image flow
#[derive(Debug, Clone)]
pub struct WholeImageOutput {
    pub result: OcrResult,
    /// Backend whose text was kept; `None` when all came back empty
    pub backend: Option<Backend>,
}

impl WholeImageOutput {
    pub fn backend_id(&self) -> &'static str {
        self.backend.map_or("none", |b| b.id())
    }
}

/// Stages and collaborators, built once per process
pub struct OcrPipeline {
    preprocessor: ImagePreprocessor,
    detector: ZoneDetector,
    classifier: LanguageClassifier,
    selector: CandidateSelector,
    scoring: ScoringConfig,
    parallel_zones: bool,
    collaborators: Collaborators,
}

impl OcrPipeline {
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(config.preprocess.clone()),
            detector: ZoneDetector::new(config.zones.clone()),
            classifier: LanguageClassifier::new(config.language.clone()),
            selector: CandidateSelector::new(config.selector.clone()),
            scoring: config.scoring.clone(),
            parallel_zones: config.language.parallel_zones,
            collaborators,
        }
    }

    /// Zone flow on an image file
    pub fn process_image(&self, path: &Path) -> Result<OcrResult> {
        let started = Instant::now();
        let image = load_image(path)?;
        Ok(self.process_zones(&image, started))
    }

    /// Zone flow on a decoded image
    pub fn process_zones(&self, image: &DynamicImage, started: Instant) -> OcrResult {
        let mut steps = Vec::new();

        let rgb = image.to_rgb8();
        let enhanced = self.enhance(&rgb);
        if enhanced.dimensions() != rgb.dimensions() {
            steps.push(SUPER_RESOLUTION_STEP.to_string());
        }

        let gray = imageops::grayscale(&enhanced);
        let prepared = self.preprocessor.process(&gray);
        steps.extend(prepared.steps.iter().cloned());

        let (zones, strategy) = self.detector.detect(&prepared.working);
        debug!("Zone strategy: {:?}", strategy);

        let detector = self.collaborators.detector.as_ref();
        let external = contain(detector.name(), || detector.detect_boxes(&enhanced)).unwrap_or_default();
        let zones = if external.is_empty() {
            zones
        } else {
            self.detector.merge_external(zones, &external, prepared.working.dimensions())
        };

        let text_zones = self.read_zones(&prepared.working, &zones);

        let aggregator = ResultAggregator::new(self.collaborators.corrector.as_ref());
        let result = aggregator.aggregate(text_zones, steps, started.elapsed().as_secs_f64());
        info!(
            "OCR finished: {} zones, confidence {:.2}, {:.2}s",
            result.zones.len(),
            result.confidence,
            result.processing_time
        );
        result
    }

    /// Read every zone; result order equals zone order
    fn read_zones(&self, working: &GrayImage, zones: &[Zone]) -> Vec<TextZone> {
        if self.parallel_zones && zones.len() > 1 {
            zones.par_iter().map(|zone| self.read_zone(working, zone)).collect()
        } else {
            zones.iter().map(|zone| self.read_zone(working, zone)).collect()
        }
    }

    fn read_zone(&self, working: &GrayImage, zone: &Zone) -> TextZone {
        let region = imageops::crop_imm(working, zone.x, zone.y, zone.w, zone.h).to_image();
        let classification = self.classifier.classify(&region, &self.collaborators);
        let text = self.classifier.read(&region, &classification, &self.collaborators);
        let confidence = zone_confidence(&text, &self.scoring);

        debug!(
            "Zone ({}, {}, {}x{}): {} conf={:.2} chars={}",
            zone.x,
            zone.y,
            zone.w,
            zone.h,
            classification.language,
            confidence,
            text.chars().count()
        );

        TextZone {
            zone: *zone,
            language: classification.language,
            confidence,
            text,
        }
    }

    fn enhance(&self, rgb: &RgbImage) -> RgbImage {
        let enhancer = self.collaborators.enhancer.as_ref();
        match contain(enhancer.name(), || enhancer.enhance(rgb)) {
            Some(enhanced) if enhanced.width() > 0 && enhanced.height() > 0 => enhanced,
            _ => rgb.clone(),
        }
    }

    /// Whole-image flow on an image file
    pub fn process_whole_image(&self, path: &Path, hint: Language) -> Result<WholeImageOutput> {
        let started = Instant::now();
        let image = load_image(path)?;
        Ok(self.process_whole(&image, hint, started))
    }

    /// Whole-image flow on a decoded image
    ///
    /// The result carries one zone covering the (resized) image, labelled
    /// with the language hint.
    pub fn process_whole(&self, image: &DynamicImage, hint: Language, started: Instant) -> WholeImageOutput {
        let mut steps = Vec::new();

        let rgb = image.to_rgb8();
        let enhanced = self.enhance(&rgb);
        if enhanced.dimensions() != rgb.dimensions() {
            steps.push(SUPER_RESOLUTION_STEP.to_string());
        }

        let gray = imageops::grayscale(&enhanced);
        let prepared = self.preprocessor.resize(self.preprocessor.process(&gray));
        steps.extend(prepared.steps.iter().cloned());

        let chain = BackendChain::new(&self.collaborators, &self.selector);
        let output = chain.run(&prepared, hint);
        let text = self.postprocess(&output.text, hint);
        info!("Whole-image OCR via '{}': {} chars", output.backend_id(), text.chars().count());

        let (w, h) = prepared.dimensions();
        let confidence = zone_confidence(&text, &self.scoring);
        let zones: Vec<TextZone> = Zone::full(w, h)
            .map(|zone| TextZone {
                zone,
                language: hint,
                confidence,
                text: text.clone(),
            })
            .into_iter()
            .collect();

        let (hindi_text, english_text) = match hint {
            Language::Hindi => (text.clone(), String::new()),
            _ => (String::new(), text.clone()),
        };

        WholeImageOutput {
            result: OcrResult {
                text,
                hindi_text,
                english_text,
                confidence: if zones.is_empty() { 0.0 } else { confidence },
                processing_time: started.elapsed().as_secs_f64(),
                zones,
                preprocessing_steps: steps,
            },
            backend: output.backend,
        }
    }

    fn postprocess(&self, text: &str, hint: Language) -> String {
        let cleaned = clean_page_text(text);
        if cleaned.is_empty() {
            return cleaned;
        }
        let corrector = self.collaborators.corrector.as_ref();
        contain(corrector.name(), || corrector.correct(&cleaned, hint)).unwrap_or(cleaned)
    }
}

/// Tabs, carriage returns and form feeds become spaces; runs of whitespace
/// collapse to one space
pub fn clean_page_text(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| if matches!(c, '\t' | '\r' | '\x0c') { ' ' } else { c })
        .collect();
    collapse_whitespace(&spaced)
}

/// Decode an image file; unreadable, undecodable and empty images are input
/// errors
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let image = image::open(path).map_err(|e| OcrError::Input {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if image.width() == 0 || image.height() == 0 {
        return Err(OcrError::Input {
            path: path.to_path_buf(),
            reason: "image has no pixels".to_string(),
        });
    }
    info!("Loaded {:?} ({}x{})", path, image.width(), image.height());
    Ok(image)
}
