//! HuggingFace model download
//!
//! GGUF files are cached in the HuggingFace cache directory
//! (~/.cache/huggingface/hub/), so repeated calls do not download again.

use hf_hub::{Repo, RepoType, api::sync::ApiBuilder};
use std::path::{Path, PathBuf};

use crate::error::{Result, ZenzError};
use crate::model_config::{ModelFamily, VariantConfig, registry};

/// Download `filename` from the model repo `repo_id` and return its local path.
///
/// `HF_TOKEN` is used when set (private repositories).
pub fn download_gguf(repo_id: &str, filename: &str) -> Result<PathBuf> {
    let mut builder = ApiBuilder::new();
    if let Ok(token) = std::env::var("HF_TOKEN") {
        builder = builder.with_token(Some(token));
    }
    let api = builder.build().map_err(|e| ZenzError::Download(e.into()))?;

    let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));

    tracing::info!("Downloading {} from {}...", filename, repo_id);
    let path = repo
        .get(filename)
        .map_err(|e| ZenzError::Download(e.into()))?;
    tracing::info!("Model available at {:?}", path);

    Ok(path)
}

pub fn get_variant_path(family: &ModelFamily, variant: &VariantConfig) -> Result<PathBuf> {
    download_gguf(&family.repo_id, &variant.filename)
}

/// Look up a variant id in the registry and return its local GGUF path.
pub fn get_path_by_id(variant_id: &str) -> Result<PathBuf> {
    let reg = registry()?;
    let Some((family, variant)) = reg.find_variant(variant_id) else {
        tracing::warn!(
            "unknown model variant {:?} (available: {})",
            variant_id,
            reg.all_variant_ids().join(", ")
        );
        return Err(ZenzError::UnknownVariant(variant_id.to_string()));
    };
    get_variant_path(family, variant)
}

/// Local path of the registry's default model, downloading if needed.
pub fn get_default_model_path() -> Result<PathBuf> {
    let reg = registry()?;
    let (family, variant) = reg
        .default_variant()
        .ok_or_else(|| ZenzError::UnknownVariant(reg.default_model.clone()))?;
    get_variant_path(family, variant)
}

/// Pick the model to load: an explicit GGUF path, else a registry variant,
/// else the registry default. Empty values count as unset.
pub fn resolve_model_path(path: Option<&Path>, variant: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path.to_path_buf());
    }
    match variant.filter(|v| !v.is_empty()) {
        Some(variant) => get_path_by_id(variant),
        None => get_default_model_path(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_path_by_id_unknown() {
        let result = get_path_by_id("nonexistent-model-id");
        assert!(matches!(result, Err(ZenzError::UnknownVariant(id)) if id == "nonexistent-model-id"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_model_path(Some(Path::new("/models/a.gguf")), Some("nonexistent")).unwrap();
        assert_eq!(path, PathBuf::from("/models/a.gguf"));
    }

    #[test]
    fn test_empty_path_falls_through_to_variant() {
        let result = resolve_model_path(Some(Path::new("")), Some("nonexistent"));
        assert!(matches!(result, Err(ZenzError::UnknownVariant(_))));
    }
}
