//! Model management for ONNX Runtime
//!
//! Resolves, downloads and caches the optional models: super-resolution,
//! EAST text detection and the masked language models used for correction.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ort::session::{builder::GraphOptimizationLevel, Session};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::config::AiConfig;
use crate::error::OcrError;

/// Model files known to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Single-image super-resolution network, RGB in [0, 1]
    SuperResolution,
    /// EAST scene text detector
    East,
    /// English masked language model
    MlmEnglish,
    /// Tokenizer for the English masked language model
    MlmEnglishTokenizer,
    /// Hindi masked language model
    MlmHindi,
    /// Tokenizer for the Hindi masked language model
    MlmHindiTokenizer,
}

impl ModelKind {
    /// Path relative to the models directory (and to the download mirror)
    pub fn filename(&self) -> &'static str {
        match self {
            ModelKind::SuperResolution => "super_resolution.onnx",
            ModelKind::East => "east_text_detection.onnx",
            ModelKind::MlmEnglish => "mlm/english/model.onnx",
            ModelKind::MlmEnglishTokenizer => "mlm/english/tokenizer.json",
            ModelKind::MlmHindi => "mlm/hindi/model.onnx",
            ModelKind::MlmHindiTokenizer => "mlm/hindi/tokenizer.json",
        }
    }

    /// Smallest plausible file size; anything shorter is a broken download
    pub fn min_size(&self) -> u64 {
        match self {
            ModelKind::MlmEnglishTokenizer | ModelKind::MlmHindiTokenizer => 64,
            _ => 1024,
        }
    }

    /// Display name for logging
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::SuperResolution => "Super Resolution",
            ModelKind::East => "EAST Text Detection",
            ModelKind::MlmEnglish => "English Masked LM",
            ModelKind::MlmEnglishTokenizer => "English Tokenizer",
            ModelKind::MlmHindi => "Hindi Masked LM",
            ModelKind::MlmHindiTokenizer => "Hindi Tokenizer",
        }
    }
}

/// Model manifest tracking downloaded models
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub source: String,
    pub downloaded_at: u64,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

/// Finds model files on disk and fetches missing ones from a mirror
pub struct ModelManager {
    models_dir: PathBuf,
    base_url: Option<String>,
    offline: bool,
}

impl ModelManager {
    /// Create a model manager from the `[ai]` settings
    pub fn new(ai: &AiConfig) -> Result<Self> {
        let models_dir = match &ai.models_dir {
            Some(dir) => dir.clone(),
            None => crate::storage::default_models_dir()?,
        };
        Self::with_dir(models_dir, ai.model_base_url.clone(), ai.offline)
    }

    /// Create model manager with custom directory
    pub fn with_dir(models_dir: PathBuf, base_url: Option<String>, offline: bool) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            base_url,
            offline,
        })
    }

    /// Get the path to a specific model file
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.models_dir.join(kind.filename())
    }

    /// Check if a model is already downloaded
    pub fn is_model_available(&self, kind: ModelKind) -> bool {
        std::fs::metadata(self.model_path(kind))
            .map(|m| m.is_file() && m.len() >= kind.min_size())
            .unwrap_or(false)
    }

    /// Path for `kind`, preferring an explicitly configured file
    ///
    /// An explicit path must exist; it is never downloaded.
    pub fn resolve(&self, explicit: Option<&Path>, kind: ModelKind) -> Result<PathBuf> {
        match explicit {
            Some(path) if path.is_file() => Ok(path.to_path_buf()),
            Some(path) => anyhow::bail!("{} model not found at {:?}", kind.display_name(), path),
            None => self.ensure_model(kind),
        }
    }

    /// Like [`ModelManager::resolve`], for a file inside an explicitly
    /// configured directory
    pub fn resolve_in(&self, dir: Option<&Path>, name: &str, kind: ModelKind) -> Result<PathBuf> {
        let explicit = dir.map(|d| d.join(name));
        self.resolve(explicit.as_deref(), kind)
    }

    /// Download a model if not already available
    /// Returns the path to the model file
    pub fn ensure_model(&self, kind: ModelKind) -> Result<PathBuf> {
        let path = self.model_path(kind);

        if self.is_model_available(kind) {
            debug!("Model {:?} already available at {:?}", kind, path);
            return Ok(path);
        }

        self.download_model(kind)?;
        Ok(path)
    }

    fn download_model(&self, kind: ModelKind) -> Result<()> {
        let path = self.model_path(kind);

        if self.offline {
            anyhow::bail!(
                "Offline mode: cannot download {}. Place it at {:?}",
                kind.display_name(),
                path
            );
        }

        let Some(base) = &self.base_url else {
            anyhow::bail!(
                "{} is missing at {:?} and no model mirror is configured",
                kind.display_name(),
                path
            );
        };
        let url = format!("{}/{}", base.trim_end_matches('/'), kind.filename());

        info!("Downloading {} model from {}", kind.display_name(), url);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Create a tokio runtime for async download
        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let sha256 = rt.block_on(async { self.download_file_async(&url, &path).await })?;

        // Verify the download
        if !self.is_model_available(kind) {
            anyhow::bail!("Download completed but {} failed verification", kind.filename());
        }

        self.update_manifest_for_model(kind, &url, sha256)?;

        info!("Successfully downloaded {} model", kind.display_name());
        Ok(())
    }

    /// Stream `url` into `path` through a temp file; returns the SHA256
    async fn download_file_async(&self, url: &str, path: &Path) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(url)
            .send()
            .await
            .context("Failed to send download request")?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed with status {}: {}", response.status(), url);
        }

        debug!("Download size: {:?} bytes", response.content_length());

        let temp_path = path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).context("Failed to create temp file")?;

        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading download stream")?;
            file.write_all(&chunk).context("Failed to write to temp file")?;
            hasher.update(&chunk);
        }

        file.flush().context("Failed to flush temp file")?;
        drop(file);

        std::fs::rename(&temp_path, path).context("Failed to move downloaded file to final location")?;

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Update manifest after successful download
    fn update_manifest_for_model(&self, kind: ModelKind, source: &str, sha256: String) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();
        let metadata = std::fs::metadata(self.model_path(kind))?;

        let model_info = ModelInfo {
            filename: kind.filename().to_string(),
            size_bytes: metadata.len(),
            sha256,
            source: source.to_string(),
            downloaded_at: unix_now(),
        };

        if let Some(existing) = manifest.models.iter_mut().find(|m| m.filename == model_info.filename) {
            *existing = model_info;
        } else {
            manifest.models.push(model_info);
        }

        self.save_manifest(&manifest)
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join("manifest.json");
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            let manifest: ModelManifest = serde_json::from_str(&content)?;
            Ok(manifest)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.models_dir.join("manifest.json");
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OnnxSession {
    /// Create a new ONNX session from a model file
    pub fn new(model_path: &Path) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;

        let input_names: Vec<String> = session.inputs.iter().map(|input| input.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|output| output.name.clone()).collect();

        info!("Model loaded. Inputs: {:?}, Outputs: {:?}", input_names, output_names);

        Ok(Self {
            session,
            input_names,
            output_names,
        })
    }

    /// Get the underlying session mutably for running inference
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Index of the first output whose name contains `fragment`
    pub fn output_index(&self, fragment: &str) -> Option<usize> {
        self.output_names.iter().position(|n| n.contains(fragment))
    }
}

/// Session loaded on first use and kept for the process lifetime
///
/// A failed load is reported to the caller and attempted again on the
/// next call; a loaded session is never replaced.
pub struct LazySession {
    path: PathBuf,
    slot: Mutex<Option<OnnxSession>>,
}

impl LazySession {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            slot: Mutex::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Run `f` with exclusive access to the session, loading it if needed
    pub fn with<T, F>(&self, f: F) -> std::result::Result<T, OcrError>
    where
        F: FnOnce(&mut OnnxSession) -> std::result::Result<T, OcrError>,
    {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            let session = OnnxSession::new(&self.path).map_err(|e| OcrError::Model(format!("{e:#}")))?;
            *slot = Some(session);
        }
        match slot.as_mut() {
            Some(session) => f(session),
            None => Err(OcrError::Model(format!("session for {:?} not loaded", self.path))),
        }
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
