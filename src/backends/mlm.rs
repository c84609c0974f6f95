//! Masked language model post-correction
//!
//! Generates a handful of variants of the recognized text that undo common
//! OCR character confusions, scores each with the model's pseudo-perplexity
//! and keeps a variant only when it reads strictly better than the input.

use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1, Axis, Ix3};
use ort::value::Value;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use super::models::{LazySession, ModelKind, ModelManager};
use super::Corrector;
use crate::config::AiConfig;
use crate::error::{OcrError, Result};
use crate::vision::Language;

/// Character swaps tried on the whole text, in order
const CONFUSIONS: [(char, char); 14] = [
    ('0', 'O'),
    ('O', '0'),
    ('1', 'I'),
    ('I', '1'),
    ('l', '1'),
    ('1', 'l'),
    ('5', 'S'),
    ('S', '5'),
    ('8', 'B'),
    ('B', '8'),
    ('6', 'G'),
    ('G', '6'),
    ('2', 'Z'),
    ('Z', '2'),
];
const MAX_REPLACEMENTS: usize = 8;
const MAX_VARIANTS: usize = 10;
/// Longer texts are never rewritten
const MAX_TEXT_CHARS: usize = 2000;
/// Token budget per scored sequence, special tokens included
const MAX_SEQUENCE: usize = 256;

/// Candidate spellings of `text`, the input first
pub fn generate_variants(text: &str) -> Vec<String> {
    if text.is_empty() || text.chars().count() > MAX_TEXT_CHARS {
        return vec![text.to_string()];
    }

    let mut variants = vec![text.to_string()];

    let mut applied = 0;
    for (from, to) in CONFUSIONS {
        if applied >= MAX_REPLACEMENTS {
            break;
        }
        if text.contains(from) {
            push_unique(&mut variants, text.replace(from, &to.to_string()));
            applied += 1;
        }
    }

    // Token-local fixes: O for 0 in all-caps words, 1 for I next to digits
    let selective = text
        .split_whitespace()
        .map(|token| {
            if is_all_caps(token) && token.contains('0') {
                token.replace('0', "O")
            } else if token.chars().any(|c| c.is_ascii_digit()) && token.contains('I') {
                token.replace('I', "1")
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    push_unique(&mut variants, selective);

    variants.truncate(MAX_VARIANTS);
    variants
}

fn push_unique(variants: &mut Vec<String>, candidate: String) {
    if !variants.contains(&candidate) {
        variants.push(candidate);
    }
}

fn is_all_caps(token: &str) -> bool {
    token.chars().any(char::is_uppercase) && !token.chars().any(char::is_lowercase)
}

/// Keep the variant with the lowest score, if strictly lower than the
/// original's. Variants that fail to score are skipped.
pub fn pick_lowest<F>(original: &str, variants: &[String], mut score: F) -> Result<String>
where
    F: FnMut(&str) -> Result<f32>,
{
    let mut best_text = original.to_string();
    let mut best_score = score(original)?;

    for candidate in variants.iter().filter(|v| v.as_str() != original) {
        match score(candidate) {
            Ok(s) if s < best_score => {
                best_score = s;
                best_text = candidate.clone();
            }
            Ok(_) => {}
            Err(e) => debug!("Skipping variant: {}", e),
        }
    }
    Ok(best_text)
}

/// Negative log-probability of `target` under softmax(`logits`)
pub fn negative_log_likelihood(logits: ArrayView1<f32>, target: usize) -> f32 {
    let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let sum: f32 = logits.iter().map(|&v| (v - max).exp()).sum();
    let log_sum_exp = max + sum.ln();
    log_sum_exp - logits[target]
}

/// One row per maskable position: row `r` is `ids` with position `r + 1`
/// replaced by the mask token. First and last tokens are never masked.
pub fn masked_batch(ids: &[i64], mask_id: i64) -> Array2<i64> {
    let n = ids.len();
    let rows = n.saturating_sub(2);
    let mut batch = Array2::<i64>::zeros((rows, n));
    for r in 0..rows {
        let mut row = batch.row_mut(r);
        for (c, &id) in ids.iter().enumerate() {
            row[c] = id;
        }
        row[r + 1] = mask_id;
    }
    batch
}

/// ONNX masked LM with its tokenizer; the session loads on first use
pub struct MaskedLanguageModel {
    session: LazySession,
    tokenizer: Tokenizer,
    mask_id: Option<u32>,
}

impl MaskedLanguageModel {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| OcrError::Model(format!("Failed to load tokenizer {:?}: {}", tokenizer_path, e)))?;
        let mask_id = ["[MASK]", "<mask>"]
            .iter()
            .find_map(|t| tokenizer.token_to_id(t));

        Ok(Self {
            session: LazySession::new(model_path.to_path_buf()),
            tokenizer,
            mask_id,
        })
    }

    /// exp of the mean masked-token NLL; lower reads better
    ///
    /// Infinite when the text has no maskable token or the vocabulary has
    /// no mask token.
    pub fn pseudo_perplexity(&self, text: &str) -> Result<f32> {
        let Some(mask_id) = self.mask_id else {
            return Ok(f32::INFINITY);
        };
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| OcrError::Correction(format!("Tokenization failed: {}", e)))?;

        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if ids.len() > MAX_SEQUENCE {
            let last = ids[ids.len() - 1];
            ids.truncate(MAX_SEQUENCE - 1);
            ids.push(last);
        }
        if ids.len() <= 2 {
            return Ok(f32::INFINITY);
        }

        let batch = masked_batch(&ids, mask_id as i64);
        let attention = Array2::<i64>::ones(batch.dim());

        let losses = self.session.with(|session| {
            let uses_token_types = session.input_names().iter().any(|n| n == "token_type_ids");
            let session = session.session_mut();
            let outputs = if uses_token_types {
                let token_types = Array2::<i64>::zeros(batch.dim());
                session.run(ort::inputs![
                    "input_ids" => Value::from_array(batch)?,
                    "attention_mask" => Value::from_array(attention)?,
                    "token_type_ids" => Value::from_array(token_types)?
                ])?
            } else {
                session.run(ort::inputs![
                    "input_ids" => Value::from_array(batch)?,
                    "attention_mask" => Value::from_array(attention)?
                ])?
            };

            let logits = outputs[0].try_extract_array::<f32>()?;
            let logits = logits
                .into_dimensionality::<Ix3>()
                .map_err(|e| OcrError::Correction(format!("unexpected logits shape: {}", e)))?;

            let mut losses = Vec::with_capacity(ids.len() - 2);
            for (r, &original) in ids[1..ids.len() - 1].iter().enumerate() {
                let position = logits.index_axis(Axis(0), r);
                let row = position.index_axis(Axis(0), r + 1);
                let target = original as usize;
                if target >= row.len() {
                    return Err(OcrError::Correction(format!("token id {} outside vocabulary", target)));
                }
                losses.push(negative_log_likelihood(row, target));
            }
            Ok(losses)
        })?;

        Ok((losses.iter().sum::<f32>() / losses.len() as f32).exp())
    }
}

/// Corrector backed by one masked LM per language
pub struct MlmCorrector {
    english: Option<MaskedLanguageModel>,
    hindi: Option<MaskedLanguageModel>,
}

impl MlmCorrector {
    /// Load whichever language models can be found; fails when none can
    pub fn locate(ai: &AiConfig) -> Result<Self> {
        let manager = ModelManager::new(ai).map_err(|e| OcrError::Model(format!("{e:#}")))?;

        let english = load_language(
            &manager,
            ai.mlm_english_dir.as_deref(),
            ModelKind::MlmEnglish,
            ModelKind::MlmEnglishTokenizer,
        );
        let hindi = load_language(
            &manager,
            ai.mlm_hindi_dir.as_deref(),
            ModelKind::MlmHindi,
            ModelKind::MlmHindiTokenizer,
        );

        if english.is_none() && hindi.is_none() {
            return Err(OcrError::Model("no masked language model available".into()));
        }
        info!(
            "Masked LM correction: english={}, hindi={}",
            english.is_some(),
            hindi.is_some()
        );
        Ok(Self { english, hindi })
    }

    fn model_for(&self, language: Language) -> Option<&MaskedLanguageModel> {
        match language {
            Language::English => self.english.as_ref(),
            Language::Hindi => self.hindi.as_ref(),
            Language::Mixed | Language::Unknown => None,
        }
    }
}

fn load_language(
    manager: &ModelManager,
    dir: Option<&Path>,
    model: ModelKind,
    tokenizer: ModelKind,
) -> Option<MaskedLanguageModel> {
    let paths: anyhow::Result<(PathBuf, PathBuf)> = (|| {
        Ok((
            manager.resolve_in(dir, "model.onnx", model)?,
            manager.resolve_in(dir, "tokenizer.json", tokenizer)?,
        ))
    })();

    match paths {
        Ok((model_path, tokenizer_path)) => match MaskedLanguageModel::load(&model_path, &tokenizer_path) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("{}: {}", model.display_name(), e);
                None
            }
        },
        Err(e) => {
            debug!("{} unavailable: {:#}", model.display_name(), e);
            None
        }
    }
}

impl Corrector for MlmCorrector {
    fn name(&self) -> &str {
        "masked-lm"
    }

    fn correct(&self, text: &str, language: Language) -> Result<String> {
        let Some(model) = self.model_for(language) else {
            return Ok(text.to_string());
        };
        let variants = generate_variants(text);
        if variants.len() <= 1 {
            return Ok(text.to_string());
        }
        let corrected = pick_lowest(text, &variants, |candidate| model.pseudo_perplexity(candidate))?;
        if corrected != text {
            debug!("Masked LM rewrote {} chars of {} text", text.len(), language);
        }
        Ok(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_variants_for_room_sign() {
        let variants = generate_variants("R00M 1I");
        assert_eq!(
            variants,
            vec!["R00M 1I", "ROOM 1I", "R00M II", "R00M 11", "R00M lI", "ROOM 11"]
        );
    }

    #[test]
    fn test_variants_are_capped() {
        let text = "0O1Il5S8B6G2Z R00M";
        let variants = generate_variants(text);
        assert_eq!(variants.len(), MAX_VARIANTS);
        assert_eq!(variants[0], text);
        // Only the first eight applicable swaps are tried
        assert!(variants.contains(&text.replace('S', "5")));
        assert!(!variants.contains(&text.replace('8', "B")));
        // Token-local fixes come last
        assert_eq!(variants[9], "0O11l5S8B6G2Z ROOM");
    }

    #[test]
    fn test_variants_skip_empty_and_long_text() {
        assert_eq!(generate_variants(""), vec![""]);
        let long = "0".repeat(MAX_TEXT_CHARS + 1);
        assert_eq!(generate_variants(&long), vec![long.clone()]);
    }

    #[test]
    fn test_plain_text_has_no_rewrites() {
        assert_eq!(generate_variants("museum entry"), vec!["museum entry"]);
    }

    #[test]
    fn test_pick_lowest_requires_strict_improvement() {
        let variants = vec!["R00M".to_string(), "ROOM".to_string(), "RO0M".to_string()];
        let picked = pick_lowest("R00M", &variants, |s| Ok(if s == "ROOM" { 1.0 } else { 5.0 })).unwrap();
        assert_eq!(picked, "ROOM");

        let tie = pick_lowest("R00M", &variants, |_| Ok(5.0)).unwrap();
        assert_eq!(tie, "R00M");
    }

    #[test]
    fn test_pick_lowest_skips_failing_variants() {
        let variants = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let picked = pick_lowest("a", &variants, |s| match s {
            "b" => Err(OcrError::Correction("boom".into())),
            "c" => Ok(0.5),
            _ => Ok(1.0),
        })
        .unwrap();
        assert_eq!(picked, "c");

        // Failing to score the original is an error
        assert!(pick_lowest("a", &variants, |_| Err(OcrError::Correction("boom".into()))).is_err());
    }

    #[test]
    fn test_negative_log_likelihood() {
        let uniform = arr1(&[0.0f32, 0.0, 0.0, 0.0]);
        assert!((negative_log_likelihood(uniform.view(), 2) - 4.0f32.ln()).abs() < 1e-5);

        let peaked = arr1(&[10.0f32, -10.0, -10.0]);
        assert!(negative_log_likelihood(peaked.view(), 0) < 1e-3);
        assert!(negative_log_likelihood(peaked.view(), 1) > 19.0);
    }

    #[test]
    fn test_masked_batch_skips_special_tokens() {
        let batch = masked_batch(&[101, 7, 8, 9, 102], 103);
        assert_eq!(batch.dim(), (3, 5));
        assert_eq!(batch.row(0).to_vec(), vec![101, 103, 8, 9, 102]);
        assert_eq!(batch.row(2).to_vec(), vec![101, 7, 8, 103, 102]);
        assert_eq!(masked_batch(&[101, 102], 103).dim(), (0, 2));
    }

    #[test]
    fn test_locate_without_models_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let ai = AiConfig {
            postcorrect: true,
            offline: true,
            models_dir: Some(dir.path().to_path_buf()),
            ..AiConfig::default()
        };
        assert!(MlmCorrector::locate(&ai).is_err());
    }
}
