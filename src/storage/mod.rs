//! Storage Layer
//!
//! Platform locations for the configuration file and the model cache.

use anyhow::Result;
use std::path::PathBuf;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "bilingual-ocr";
const APPLICATION: &str = "bilingual-ocr";

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Default location of `config.toml`
///
/// Does not create anything; the file is optional.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().ok().map(|d| d.config_dir().join("config.toml"))
}

/// Default model cache directory
pub fn default_models_dir() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("models"))
}
