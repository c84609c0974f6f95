//! Per-zone language arbitration and zone reading
//!
//! A zone is probed with both script-specialized recognizers and assigned
//! the script whose mean fragment confidence wins. The probe outputs are
//! kept so that reading the zone afterwards does not recognize it twice.

use image::GrayImage;
use tracing::debug;

use super::types::{Detection, Language};
use crate::backends::{contain, Collaborators, Recognizer};
use crate::config::LanguageConfig;

/// Outcome of classifying one zone
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub language: Language,
    /// Hindi probe output; `None` when the probe failed or was skipped
    pub hindi: Option<Vec<Detection>>,
    /// English probe output; `None` when the probe failed or was skipped
    pub english: Option<Vec<Detection>>,
}

/// Mean fragment confidence, 0 when there are no fragments
pub fn mean_confidence(detections: &[Detection]) -> f32 {
    if detections.is_empty() {
        return 0.0;
    }
    detections.iter().map(|d| d.confidence).sum::<f32>() / detections.len() as f32
}

/// Decide a zone's language from the two probe means
pub fn decide(hindi_mean: f32, english_mean: f32, threshold: f32) -> Language {
    if hindi_mean > english_mean && hindi_mean > threshold {
        Language::Hindi
    } else if english_mean > threshold {
        Language::English
    } else {
        Language::Mixed
    }
}

pub struct LanguageClassifier {
    config: LanguageConfig,
}

impl LanguageClassifier {
    pub fn new(config: LanguageConfig) -> Self {
        Self { config }
    }

    /// Classify a zone crop
    ///
    /// A configured English or Hindi override is returned without probing.
    pub fn classify(&self, region: &GrayImage, collaborators: &Collaborators) -> Classification {
        if let Some(forced @ (Language::English | Language::Hindi)) = self.config.force_language {
            return Classification {
                language: forced,
                hindi: None,
                english: None,
            };
        }

        let hindi = probe(collaborators.hindi.as_ref(), region);
        let english = probe(collaborators.english.as_ref(), region);

        let language = match (&hindi, &english) {
            (None, None) => Language::Unknown,
            _ => {
                let hindi_mean = hindi.as_deref().map_or(0.0, mean_confidence);
                let english_mean = english.as_deref().map_or(0.0, mean_confidence);
                debug!("Probe means: hindi={:.2}, english={:.2}", hindi_mean, english_mean);
                decide(hindi_mean, english_mean, self.config.probe_threshold)
            }
        };

        Classification {
            language,
            hindi,
            english,
        }
    }

    /// Text of a classified zone
    ///
    /// Hindi and English zones use their own recognizer; mixed and unknown
    /// zones concatenate both. Fragments at or below the fragment threshold
    /// are dropped.
    pub fn read(&self, region: &GrayImage, classification: &Classification, collaborators: &Collaborators) -> String {
        let hindi = || {
            classification
                .hindi
                .clone()
                .or_else(|| probe(collaborators.hindi.as_ref(), region))
                .unwrap_or_default()
        };
        let english = || {
            classification
                .english
                .clone()
                .or_else(|| probe(collaborators.english.as_ref(), region))
                .unwrap_or_default()
        };

        let fragments = match classification.language {
            Language::Hindi => hindi(),
            Language::English => english(),
            Language::Mixed | Language::Unknown => {
                let mut all = hindi();
                all.extend(english());
                all
            }
        };

        join_fragments(&fragments, self.config.fragment_threshold)
    }
}

/// Join confident, non-empty fragment texts with single spaces
pub fn join_fragments(fragments: &[Detection], threshold: f32) -> String {
    fragments
        .iter()
        .filter(|d| d.confidence > threshold)
        .map(|d| d.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn probe(recognizer: &dyn Recognizer, region: &GrayImage) -> Option<Vec<Detection>> {
    contain(recognizer.name(), || recognizer.recognize(region))
}
