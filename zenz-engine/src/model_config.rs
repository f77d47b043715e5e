//! TOML-based model registry
//!
//! Every downloadable GGUF model is listed in `models.toml` at the crate root.
//! The file is embedded at build time and parsed once on first use.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Result, ZenzError};

/// Top-level config parsed from `models.toml`
#[derive(Debug, Deserialize)]
pub struct ModelRegistry {
    /// Default variant id (e.g. "zenz-v3.1-xsmall-q5")
    pub default_model: String,
    /// Model families keyed by short name
    pub models: HashMap<String, ModelFamily>,
}

/// One HuggingFace repo holding one or more quantisation variants
#[derive(Debug, Deserialize)]
pub struct ModelFamily {
    pub repo_id: String,
    pub display_name: String,
    /// Variants keyed by quantisation name (e.g. "q5")
    pub variants: HashMap<String, VariantConfig>,
}

/// A single downloadable GGUF file
#[derive(Debug, Deserialize)]
pub struct VariantConfig {
    /// Unique variant id
    pub id: String,
    /// GGUF filename in the HuggingFace repo
    pub filename: String,
    pub display_name: String,
}

const MODELS_TOML: &str = include_str!("../models.toml");

static REGISTRY: OnceLock<std::result::Result<ModelRegistry, String>> = OnceLock::new();

/// The global model registry, parsed once from the embedded `models.toml`.
pub fn registry() -> Result<&'static ModelRegistry> {
    let result = REGISTRY.get_or_init(|| toml::from_str(MODELS_TOML).map_err(|e| e.to_string()));
    match result {
        Ok(registry) => Ok(registry),
        Err(e) => Err(ZenzError::ModelLoad(
            format!("invalid models.toml: {}", e).into(),
        )),
    }
}

impl ModelRegistry {
    /// Look up a variant by its unique id.
    pub fn find_variant(&self, variant_id: &str) -> Option<(&ModelFamily, &VariantConfig)> {
        self.iter_variants().find(|(_, v)| v.id == variant_id)
    }

    /// The `(family, variant)` named by `default_model`
    pub fn default_variant(&self) -> Option<(&ModelFamily, &VariantConfig)> {
        self.find_variant(&self.default_model)
    }

    /// All variant ids, sorted.
    pub fn all_variant_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.iter_variants().map(|(_, v)| v.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter_variants(&self) -> impl Iterator<Item = (&ModelFamily, &VariantConfig)> {
        self.models
            .values()
            .flat_map(|f| f.variants.values().map(move |v| (f, v)))
    }
}
