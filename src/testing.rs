//! Test doubles for collaborators

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{GrayImage, RgbImage};

use crate::backends::{BoxDetector, Corrector, Enhancer, Recognizer};
use crate::error::{OcrError, Result};
use crate::vision::{Detection, Language, Zone};

type RecognizeFn = dyn Fn(&GrayImage) -> Result<Vec<Detection>> + Send + Sync;

/// Recognizer driven by a closure; counts its calls
pub struct FnRecognizer {
    name: String,
    calls: AtomicUsize,
    respond: Box<RecognizeFn>,
}

impl FnRecognizer {
    pub fn new<F>(name: &str, respond: F) -> Self
    where
        F: Fn(&GrayImage) -> Result<Vec<Detection>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
            respond: Box::new(respond),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for FnRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, region: &GrayImage) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(region)
    }
}

/// Recognizer returning the same fragments for every region
pub fn scripted(name: &str, fragments: &[(&str, f32)]) -> Arc<dyn Recognizer> {
    let fragments: Vec<Detection> = fragments
        .iter()
        .enumerate()
        .map(|(i, (text, conf))| Detection::new((0, i as u32 * 60, 100, 18), *text, *conf))
        .collect();
    Arc::new(FnRecognizer::new(name, move |_| Ok(fragments.clone())))
}

/// Recognizer that always errors
pub fn failing(name: &str) -> Arc<dyn Recognizer> {
    let owned = name.to_string();
    Arc::new(FnRecognizer::new(name, move |_| {
        Err(OcrError::unavailable(owned.clone(), "scripted failure"))
    }))
}

/// Collaborator that fails every call in every role
pub struct Broken;

impl Enhancer for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn enhance(&self, _image: &RgbImage) -> Result<RgbImage> {
        Err(OcrError::Enhancement("scripted failure".into()))
    }
}

impl BoxDetector for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn detect_boxes(&self, _image: &RgbImage) -> Result<Vec<Zone>> {
        Err(OcrError::Detection("scripted failure".into()))
    }
}

impl Corrector for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn correct(&self, _text: &str, _language: Language) -> Result<String> {
        Err(OcrError::Correction("scripted failure".into()))
    }
}

/// Corrector that upper-cases text and tags the language
pub struct Shouting;

impl Corrector for Shouting {
    fn name(&self) -> &str {
        "shouting"
    }

    fn correct(&self, text: &str, language: Language) -> Result<String> {
        Ok(format!("{}:{}", language.as_str(), text.to_uppercase()))
    }
}
