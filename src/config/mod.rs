//! Pipeline Configuration
//!
//! Every heuristic threshold, kernel size and score weight used by the
//! pipeline, stored in TOML format and constructed once at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::Language;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Image normalization settings
    pub preprocess: PreprocessConfig,
    /// Zone detection settings
    pub zones: ZoneConfig,
    /// Per-zone language arbitration settings
    pub language: LanguageConfig,
    /// Zone confidence heuristic weights
    pub scoring: ScoringConfig,
    /// Whole-image candidate selection settings
    pub selector: SelectorConfig,
    /// Recognition backends
    pub backends: BackendsConfig,
    /// Optional model-backed collaborators
    pub ai: AiConfig,
}

/// Preprocessing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Radius of the elliptical opening used as background estimate (15 => 31x31)
    pub illumination_radius: u8,
    /// CLAHE clip limit
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid (tiles per side)
    pub clahe_tiles: u32,
    /// Non-local means filter strength
    pub denoise_strength: f32,
    /// Non-local means patch radius
    pub denoise_patch_radius: u32,
    /// Non-local means search radius
    pub denoise_search_radius: u32,
    /// Center weight of the Laplacian-boost kernel (neighbors are -1)
    pub sharpen_center: f32,
    /// Length of the directional kernels used to find grid lines
    pub line_kernel_length: u32,
    /// Canonical working height for the whole-image path (None = keep size)
    pub target_height: Option<u32>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            illumination_radius: 15,
            clahe_clip_limit: 3.0,
            clahe_tiles: 8,
            denoise_strength: 10.0,
            denoise_patch_radius: 1,
            denoise_search_radius: 5,
            sharpen_center: 9.0,
            line_kernel_length: 40,
            target_height: Some(1600),
        }
    }
}

/// Zone detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Adaptive threshold neighbourhood size (odd)
    pub adaptive_block_size: u32,
    /// Constant subtracted from the weighted neighbourhood mean
    pub adaptive_c: f32,
    /// Radius of the square close/open kernel (2 => 5x5)
    pub morph_radius: u8,
    /// Minimum bounding-box area
    pub min_area: u32,
    /// Maximum bounding-box area
    pub max_area: u32,
    /// Minimum bounding-box width
    pub min_width: u32,
    /// Minimum bounding-box height
    pub min_height: u32,
    /// Canny low threshold
    pub canny_low: f32,
    /// Canny high threshold
    pub canny_high: f32,
    /// External boxes are admitted only below this IoU with every zone
    pub merge_iou: f32,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            adaptive_block_size: 11,
            adaptive_c: 2.0,
            morph_radius: 2,
            min_area: 200,
            max_area: 50_000,
            min_width: 30,
            min_height: 15,
            canny_low: 50.0,
            canny_high: 150.0,
            merge_iou: 0.5,
        }
    }
}

/// Language arbitration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Skip probing and assign this language to every zone
    pub force_language: Option<Language>,
    /// Mean probe confidence a script must exceed to win a zone
    pub probe_threshold: f32,
    /// Recognized fragments at or below this confidence are dropped
    pub fragment_threshold: f32,
    /// Recognize zones concurrently
    pub parallel_zones: bool,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            force_language: None,
            probe_threshold: 0.3,
            fragment_threshold: 0.3,
            parallel_zones: true,
        }
    }
}

/// Zone confidence heuristic weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Trimmed length that earns the full length component
    pub expected_length: f32,
    /// Bonus when any alphabetic character is present
    pub alphabetic_bonus: f32,
    /// Bonus when any digit is present
    pub digit_bonus: f32,
    /// Bonus when there is more than one word
    pub multi_word_bonus: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            expected_length: 50.0,
            alphabetic_bonus: 0.3,
            digit_bonus: 0.2,
            multi_word_bonus: 0.2,
        }
    }
}

/// Candidate selection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Fragments at or below this confidence are dropped
    pub fragment_threshold: f32,
    /// Rotations tried for every preprocessing variant (degrees, multiples of 90)
    pub rotations: Vec<u32>,
    /// Characters per length point
    pub length_divisor: f32,
    /// Cap on the length component
    pub length_cap: f32,
    /// Points per word
    pub word_weight: f32,
    /// Cap on the word component
    pub word_cap: f32,
    /// Penalty per special character
    pub special_weight: f32,
    /// Cap on the special character penalty
    pub special_cap: f32,
    /// Radius of the dilation used by the dilated-binary variant
    pub dilate_radius: u8,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            fragment_threshold: 0.3,
            rotations: vec![0, 90, 270],
            length_divisor: 10.0,
            length_cap: 50.0,
            word_weight: 0.5,
            word_cap: 30.0,
            special_weight: 0.5,
            special_cap: 20.0,
            dilate_radius: 1,
        }
    }
}

/// Recognition backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Remote OCR service endpoint; remote backend disabled when unset
    pub remote_url: Option<String>,
    /// Remote request timeout in seconds
    pub remote_timeout_secs: u64,
    /// Path or name of the tesseract executable
    pub tesseract_path: String,
    /// Tesseract language code for Hindi
    pub tesseract_hindi: String,
    /// Tesseract language code for English
    pub tesseract_english: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_timeout_secs: 20,
            tesseract_path: "tesseract".to_string(),
            tesseract_hindi: "hin".to_string(),
            tesseract_english: "eng".to_string(),
        }
    }
}

/// Optional model-backed collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Enable super-resolution before preprocessing
    pub enhance: bool,
    /// ONNX super-resolution model
    pub sr_model_path: Option<PathBuf>,
    /// Images whose larger side exceeds this are not upscaled
    pub sr_max_side: u32,
    /// Enable the EAST text-box detector
    pub text_detect: bool,
    /// ONNX EAST model
    pub east_model_path: Option<PathBuf>,
    /// EAST network input width (rounded down to a multiple of 32, min 320)
    pub east_input_width: u32,
    /// EAST network input height (rounded down to a multiple of 32, min 320)
    pub east_input_height: u32,
    /// EAST score threshold
    pub east_score: f32,
    /// EAST non-maximum suppression IoU
    pub east_nms: f32,
    /// Enable masked-LM post-correction
    pub postcorrect: bool,
    /// Directory with `model.onnx` + `tokenizer.json` for English
    pub mlm_english_dir: Option<PathBuf>,
    /// Directory with `model.onnx` + `tokenizer.json` for Hindi
    pub mlm_hindi_dir: Option<PathBuf>,
    /// Forbid model downloads
    pub offline: bool,
    /// Model cache directory (defaults to the platform data directory)
    pub models_dir: Option<PathBuf>,
    /// Mirror that serves missing model files as `{base}/{relative path}`
    pub model_base_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enhance: false,
            sr_model_path: None,
            sr_max_side: 2400,
            text_detect: false,
            east_model_path: None,
            east_input_width: 640,
            east_input_height: 640,
            east_score: 0.5,
            east_nms: 0.3,
            postcorrect: false,
            mlm_english_dir: None,
            mlm_hindi_dir: None,
            offline: false,
            models_dir: None,
            model_base_url: None,
        }
    }
}

impl AppConfig {
    /// Apply `OCR_*` environment variables on top of file settings
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OCR_REMOTE_URL").filter(|u| !u.trim().is_empty()) {
            self.backends.remote_url = Some(url.trim().to_string());
        }
        if let Some(flag) = lookup("OCR_AI_ENHANCE") {
            self.ai.enhance = flag_enabled(&flag);
        }
        if let Some(flag) = lookup("OCR_AI_TEXT_DETECT") {
            self.ai.text_detect = flag_enabled(&flag);
        }
        if let Some(flag) = lookup("OCR_AI_POSTCORRECT") {
            self.ai.postcorrect = flag_enabled(&flag);
        }
        if let Some(flag) = lookup("OCR_OFFLINE") {
            self.ai.offline = flag_enabled(&flag);
        }
        if let Some(path) = lookup("OCR_SR_MODEL_PATH") {
            self.ai.sr_model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("OCR_EAST_MODEL_PATH") {
            self.ai.east_model_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("OCR_MODELS_DIR") {
            self.ai.models_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("OCR_MODEL_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.ai.model_base_url = Some(url.trim().trim_end_matches('/').to_string());
        }
        if let Some(dir) = lookup("OCR_MLM_MODEL_DIR") {
            let dir = PathBuf::from(dir);
            self.ai.mlm_english_dir = Some(dir.join("english"));
            self.ai.mlm_hindi_dir = Some(dir.join("hindi"));
        }
    }
}

/// "", "0" and "false" (any case) mean disabled
fn flag_enabled(value: &str) -> bool {
    let v = value.trim();
    !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_heuristics() {
        let config = AppConfig::default();

        assert_eq!(config.preprocess.illumination_radius, 15);
        assert!((config.preprocess.clahe_clip_limit - 3.0).abs() < f32::EPSILON);
        assert_eq!(config.preprocess.clahe_tiles, 8);
        assert_eq!(config.preprocess.line_kernel_length, 40);

        assert_eq!(config.zones.morph_radius, 2);
        assert_eq!(config.zones.min_area, 200);
        assert_eq!(config.zones.max_area, 50_000);
        assert!((config.zones.merge_iou - 0.5).abs() < f32::EPSILON);

        assert!((config.language.probe_threshold - 0.3).abs() < f32::EPSILON);
        assert!(config.language.force_language.is_none());

        assert_eq!(config.selector.rotations, vec![0, 90, 270]);
        assert!(config.backends.remote_url.is_none());
        assert!(!config.ai.enhance);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.language.force_language = Some(Language::Hindi);
        config.zones.min_area = 120;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.language.force_language, Some(Language::Hindi));
        assert_eq!(parsed.zones.min_area, 120);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: AppConfig = toml::from_str("[zones]\nmin_width = 10\n").unwrap();
        assert_eq!(parsed.zones.min_width, 10);
        assert_eq!(parsed.zones.min_height, 15);
        assert_eq!(parsed.selector.rotations, vec![0, 90, 270]);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.zones.max_area, loaded.zones.max_area);
        assert_eq!(config.backends.tesseract_path, loaded.backends.tesseract_path);
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();
        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OCR_REMOTE_URL", " http://localhost:8866/ocr "),
            ("OCR_AI_ENHANCE", "1"),
            ("OCR_AI_TEXT_DETECT", "false"),
            ("OCR_MLM_MODEL_DIR", "/models/mlm"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.ai.text_detect = true;
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.backends.remote_url.as_deref(), Some("http://localhost:8866/ocr"));
        assert!(config.ai.enhance);
        assert!(!config.ai.text_detect);
        assert_eq!(config.ai.mlm_hindi_dir, Some(PathBuf::from("/models/mlm/hindi")));
    }

    #[test]
    fn test_flag_enabled() {
        assert!(flag_enabled("1"));
        assert!(flag_enabled("yes"));
        assert!(!flag_enabled(""));
        assert!(!flag_enabled("0"));
        assert!(!flag_enabled("False"));
    }
}
