//! Whole-image candidate selection and backend precedence
//!
//! [`CandidateSelector`] reads a bounded set of preprocessing and rotation
//! variants with one recognizer and keeps the best-scoring text.
//! [`BackendChain`] tries the remote, local and general backends in a fixed
//! order; the first one that produces text wins.

use image::{imageops, GrayImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use tracing::{debug, info, warn};

use super::filters;
use super::language::join_fragments;
use super::preprocess::PreparedImage;
use super::scoring::candidate_score;
use super::types::{Detection, Language};
use crate::backends::{contain, Collaborators, Recognizer};
use crate::config::SelectorConfig;

/// Preprocessing variant read by the selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Grayscale,
    Binary,
    DilatedBinary,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Grayscale, Variant::Binary, Variant::DilatedBinary];

    pub fn id(&self) -> &'static str {
        match self {
            Variant::Grayscale => "grayscale",
            Variant::Binary => "binary",
            Variant::DilatedBinary => "binary_dilated",
        }
    }
}

/// One scored reading of one variant
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionCandidate {
    pub text: String,
    pub variant: Variant,
    /// Clockwise rotation in degrees
    pub rotation: u32,
    pub backend: String,
    pub score: f32,
}

pub struct CandidateSelector {
    config: SelectorConfig,
}

impl CandidateSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// Every variant image in generation order: variant-major, then rotation
    pub fn variants(&self, gray: &GrayImage) -> Vec<(Variant, u32, GrayImage)> {
        let binary = filters::otsu_binarize(gray);
        let dilated = dilate(&binary, Norm::LInf, self.config.dilate_radius);

        let mut rotations: Vec<u32> = Vec::new();
        for &r in &self.config.rotations {
            let r = r % 360;
            if r % 90 != 0 {
                warn!("Ignoring rotation {} (not a multiple of 90)", r);
            } else if !rotations.contains(&r) {
                rotations.push(r);
            }
        }

        let mut out = Vec::with_capacity(Variant::ALL.len() * rotations.len());
        for variant in Variant::ALL {
            let base = match variant {
                Variant::Grayscale => gray,
                Variant::Binary => &binary,
                Variant::DilatedBinary => &dilated,
            };
            for &rotation in &rotations {
                out.push((variant, rotation, rotate(base, rotation)));
            }
        }
        out
    }

    /// Read every variant; variants that yield no confident text are skipped
    pub fn candidates(&self, gray: &GrayImage, recognizer: &dyn Recognizer) -> Vec<RecognitionCandidate> {
        self.variants(gray)
            .into_iter()
            .filter_map(|(variant, rotation, image)| {
                let what = format!("{} ({} {}deg)", recognizer.name(), variant.id(), rotation);
                let fragments: Vec<Detection> = contain(&what, || recognizer.recognize_paragraphs(&image))?;
                let text = join_fragments(&fragments, self.config.fragment_threshold);
                if text.is_empty() {
                    return None;
                }
                let score = candidate_score(&text, &self.config);
                debug!("Candidate {} {}deg scored {:.2}", variant.id(), rotation, score);
                Some(RecognitionCandidate {
                    text,
                    variant,
                    rotation,
                    backend: recognizer.name().to_string(),
                    score,
                })
            })
            .collect()
    }

    /// Best candidate across all variants
    pub fn select(&self, gray: &GrayImage, recognizer: &dyn Recognizer) -> Option<RecognitionCandidate> {
        pick_best(self.candidates(gray, recognizer))
    }
}

/// Highest score wins; among equal scores the first generated candidate wins
pub fn pick_best(candidates: Vec<RecognitionCandidate>) -> Option<RecognitionCandidate> {
    let mut best: Option<RecognitionCandidate> = None;
    for candidate in candidates {
        match &best {
            Some(current) if candidate.score <= current.score => {}
            _ => best = Some(candidate),
        }
    }
    best
}

fn rotate(image: &GrayImage, degrees: u32) -> GrayImage {
    match degrees {
        90 => imageops::rotate90(image),
        180 => imageops::rotate180(image),
        270 => imageops::rotate270(image),
        _ => image.clone(),
    }
}

/// Whole-image backends in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Remote OCR service on the binary image
    Remote,
    /// Local page recognition on the binary image
    Local,
    /// Candidate selection with the combined recognizer over variants of
    /// the grayscale image
    General,
}

impl Backend {
    pub const PRECEDENCE: [Backend; 3] = [Backend::Remote, Backend::Local, Backend::General];

    pub fn id(&self) -> &'static str {
        match self {
            Backend::Remote => "remote",
            Backend::Local => "local",
            Backend::General => "general",
        }
    }
}

/// Text produced by the chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    pub text: String,
    /// `None` when every backend came back empty
    pub backend: Option<Backend>,
}

impl ChainOutput {
    pub fn backend_id(&self) -> &'static str {
        self.backend.map_or("none", |b| b.id())
    }
}

/// Strict precedence chain: the first non-empty result wins
pub struct BackendChain<'a> {
    collaborators: &'a Collaborators,
    selector: &'a CandidateSelector,
}

impl<'a> BackendChain<'a> {
    pub fn new(collaborators: &'a Collaborators, selector: &'a CandidateSelector) -> Self {
        Self {
            collaborators,
            selector,
        }
    }

    pub fn run(&self, prepared: &PreparedImage, hint: Language) -> ChainOutput {
        for backend in Backend::PRECEDENCE {
            match self.attempt(backend, prepared, hint) {
                Some(text) if !text.trim().is_empty() => {
                    info!("Backend '{}' produced {} chars", backend.id(), text.len());
                    return ChainOutput {
                        text,
                        backend: Some(backend),
                    };
                }
                _ => debug!("Backend '{}' produced no text", backend.id()),
            }
        }
        warn!("No backend produced text");
        ChainOutput {
            text: String::new(),
            backend: None,
        }
    }

    fn attempt(&self, backend: Backend, prepared: &PreparedImage, hint: Language) -> Option<String> {
        match backend {
            Backend::Remote => {
                let remote = self.collaborators.remote.as_ref();
                let fragments = contain(remote.name(), || remote.recognize(&prepared.binary))?;
                Some(join_texts(&fragments, " "))
            }
            Backend::Local => {
                let local = self.collaborators.recognizer_for(hint).as_ref();
                let lines = contain(local.name(), || local.recognize(&prepared.binary))?;
                Some(join_texts(&lines, "\n"))
            }
            Backend::General => {
                let general = self.collaborators.general.as_ref();
                self.selector.select(&prepared.gray, general).map(|c| c.text)
            }
        }
    }
}

fn join_texts(fragments: &[Detection], separator: &str) -> String {
    fragments
        .iter()
        .map(|d| d.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
