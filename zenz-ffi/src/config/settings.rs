//! Host settings
//!
//! Read-only settings for the C boundary. Default values are defined in
//! `config/default.toml`; a user `config.toml` is merged on top of them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zenz_engine::Conditions;
use zenz_engine::hf_download::resolve_model_path;

/// Default configuration TOML embedded from config/default.toml
const DEFAULT_CONFIG_TOML: &str = include_str!("../../config/default.toml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub model: ModelSettings,
    pub runtime: RuntimeSettings,
    pub generation: GenerationSettings,
}

/// Which model to load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Local GGUF path; takes precedence over `variant`
    pub path: Option<String>,
    /// Registry variant id (defaults to the registry default)
    pub variant: Option<String>,
}

/// Values handed to `setRuntimeConfig` after loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub n_ctx: i32,
    pub n_threads: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub max_tokens: usize,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub preference: String,
}

impl Default for Settings {
    /// Same values as the embedded `config/default.toml`
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            runtime: RuntimeSettings {
                n_ctx: 512,
                n_threads: 4,
            },
            generation: GenerationSettings {
                max_tokens: 32,
                profile: String::new(),
                topic: String::new(),
                style: String::new(),
                preference: String::new(),
            },
        }
    }
}

impl GenerationSettings {
    pub fn conditions(&self) -> Conditions {
        Conditions {
            profile: self.profile.clone(),
            topic: self.topic.clone(),
            style: self.style.clone(),
            preference: self.preference.clone(),
        }
    }
}

/// Recursively merge `overlay` TOML values on top of `base`.
fn merge_toml(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(key) {
                    merge_toml(base_value, value);
                } else {
                    base_table.insert(key.clone(), value.clone());
                }
            }
        }
        (base, _) => {
            *base = overlay.clone();
        }
    }
}

/// Parse user TOML content merged on top of default.toml.
fn parse_with_defaults(user_content: &str) -> Result<Settings> {
    let mut base: toml::Value = toml::from_str(DEFAULT_CONFIG_TOML)?;
    let user: toml::Value = toml::from_str(user_content)?;
    merge_toml(&mut base, &user);
    let settings: Settings = base.try_into()?;
    Ok(settings)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "zenz", "zenz-ffi")
}

impl Settings {
    pub fn config_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load settings from the default configuration file.
    /// Falls back to the defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        let Some(config_file) = Self::config_file() else {
            warn!("Could not determine config directory, using defaults");
            return Ok(Self::default());
        };

        if !config_file.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&config_file)
    }

    /// Load settings from a specific file, merged on top of defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_with_defaults(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Local GGUF path for the configured model, downloading if needed.
    pub fn resolve_model_path(&self) -> Result<PathBuf> {
        let path = resolve_model_path(
            self.model.path.as_deref().map(Path::new),
            self.model.variant.as_deref(),
        )?;
        Ok(path)
    }
}
