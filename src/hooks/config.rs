//! Charm configuration and metadata files.
//!
//! A charm directory carries `metadata.yaml` (identity and relation
//! endpoints) and `config.yaml` (an `options` map where each option has a
//! `default`). Config values coming from YAML or from the agent are loosely
//! typed; the string forms `"true"`/`"false"` are coerced to booleans so
//! handlers can match on one representation.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Effective configuration of a charm: option name to value.
pub type CharmConfig = BTreeMap<String, serde_yaml::Value>;

/// Parsed `metadata.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharmMetadata {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub provides: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub requires: BTreeMap<String, serde_yaml::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct OptionsFile {
    #[serde(default)]
    options: BTreeMap<String, OptionSpec>,
}

#[derive(Debug, Deserialize)]
struct OptionSpec {
    #[serde(default)]
    default: serde_yaml::Value,
}

/// Normalize one loosely-typed config value.
pub fn coerce_value(value: serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::String(s) if s.eq_ignore_ascii_case("true") => {
            serde_yaml::Value::Bool(true)
        }
        serde_yaml::Value::String(s) if s.eq_ignore_ascii_case("false") => {
            serde_yaml::Value::Bool(false)
        }
        other => other,
    }
}

/// Normalize a whole config map.
pub fn config_from_map(map: BTreeMap<String, serde_yaml::Value>) -> CharmConfig {
    map.into_iter()
        .map(|(key, value)| (key, coerce_value(value)))
        .collect()
}

/// Defaults declared in a charm's `config.yaml`.
pub fn load_charm_config(path: &Path) -> Result<CharmConfig> {
    let text = std::fs::read_to_string(path)?;
    let file: OptionsFile = serde_yaml::from_str(&text)?;
    Ok(file
        .options
        .into_iter()
        .map(|(name, spec)| (name, coerce_value(spec.default)))
        .collect())
}

pub fn load_metadata(path: &Path) -> Result<CharmMetadata> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Persist the service's effective config as `{service: {option: value}}`,
/// the same shape `deploy --config` consumes.
pub fn save_service_config(path: &Path, service: &str, config: &CharmConfig) -> Result<()> {
    let mut document: BTreeMap<&str, &CharmConfig> = BTreeMap::new();
    document.insert(service, config);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_yaml::to_string(&document)?)?;
    Ok(())
}

/// Read back a file written by [`save_service_config`]. Fails if the file
/// does not contain an entry for `service`.
pub fn load_service_config(path: &Path, service: &str) -> Result<CharmConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut document: BTreeMap<String, BTreeMap<String, serde_yaml::Value>> =
        serde_yaml::from_str(&text)?;
    let config = document
        .remove(service)
        .ok_or_else(|| Error::Config(format!("no saved configuration for service {}", service)))?;
    Ok(config_from_map(config))
}
