//! The environments registry: the YAML file naming every environment this
//! tool can drive, plus add/destroy operations that keep the file and the
//! live cluster consistent.
//!
//! Bootstrap and teardown are injected as closures so registry bookkeeping
//! (including rollback of a fresh entry when its first bootstrap reports a
//! configuration error) is testable without a cluster.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One environment's entry in the registry file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConfig {
    /// Provider type (e.g. `local`, `ec2`).
    #[serde(rename = "type")]
    pub provider: String,
    /// Provider-specific options, carried verbatim.
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

/// On-disk registry of environments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

impl Registry {
    /// Load the registry. A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Registry> {
        if !path.exists() {
            return Ok(Registry::default());
        }
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Registry::default());
        }
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(format!("environment {}", name)))
    }
}

/// Default registry location: `$HOME/.converge/environments.yaml`.
pub fn default_registry_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_else(|| ".".into());
    PathBuf::from(home).join(".converge").join("environments.yaml")
}

/// Register a new environment and bootstrap it.
///
/// The entry is written before bootstrapping so the tool can address the new
/// environment. If bootstrap then reports a configuration error, the entry
/// was wrong, so it is rolled back out of the file before the error is
/// returned. Any other bootstrap failure leaves the entry in place for
/// retry.
pub fn add_environment<F>(
    path: &Path,
    name: &str,
    config: EnvironmentConfig,
    bootstrap: F,
) -> Result<serde_yaml::Value>
where
    F: FnOnce(&str) -> Result<serde_yaml::Value>,
{
    // "default" is the implicit environment every command falls back to;
    // registering it explicitly would shadow that meaning.
    if name == "default" {
        return Err(Error::Config(
            "'default' is reserved and cannot be registered".to_string(),
        ));
    }
    let mut registry = Registry::load(path)?;
    if registry.environments.contains_key(name) {
        return Err(Error::Config(format!(
            "environment {} already exists",
            name
        )));
    }
    registry.environments.insert(name.to_string(), config);
    registry.save(path)?;
    tracing::info!(environment = name, "registered environment, bootstrapping");

    match bootstrap(name) {
        Ok(value) => Ok(value),
        Err(e) => {
            let config_error = matches!(
                &e,
                Error::CommandFailed { stderr, .. } if stderr.contains("configuration error")
            );
            if config_error {
                tracing::warn!(environment = name, "bootstrap rejected configuration, rolling back entry");
                let mut registry = Registry::load(path)?;
                registry.environments.remove(name);
                registry.save(path)?;
            }
            Err(e)
        }
    }
}

/// Tear down an environment and optionally drop its registry entry.
///
/// Destroying the default environment requires `remove_default`, as a guard
/// against fat-fingering the one environment everything else points at.
pub fn destroy_environment<F>(
    path: &Path,
    name: &str,
    remove_entry: bool,
    remove_default: bool,
    destroy: F,
) -> Result<serde_yaml::Value>
where
    F: FnOnce(&str) -> Result<serde_yaml::Value>,
{
    let mut registry = Registry::load(path)?;
    registry.get(name)?;
    if registry.default.as_deref() == Some(name) && !remove_default {
        return Err(Error::Config(format!(
            "environment {} is the default; pass --remove-default to destroy it",
            name
        )));
    }

    let result = destroy(name)?;
    if remove_entry {
        registry.environments.remove(name);
        if registry.default.as_deref() == Some(name) {
            registry.default = None;
        }
        registry.save(path)?;
        tracing::info!(environment = name, "removed environment from registry");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(provider: &str) -> EnvironmentConfig {
        EnvironmentConfig {
            provider: provider.to_string(),
            options: BTreeMap::new(),
        }
    }

    fn registry_path(dir: &TempDir) -> PathBuf {
        dir.path().join("environments.yaml")
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::load(&registry_path(&dir)).unwrap();
        assert!(registry.environments.is_empty());
        assert!(registry.default.is_none());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let mut registry = Registry::default();
        registry.default = Some("staging".to_string());
        registry
            .environments
            .insert("staging".to_string(), config("local"));
        registry.save(&path).unwrap();

        let loaded = Registry::load(&path).unwrap();
        assert_eq!(loaded.default.as_deref(), Some("staging"));
        assert_eq!(loaded.get("staging").unwrap().provider, "local");
    }

    #[test]
    fn add_registers_then_bootstraps() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let result = add_environment(&path, "staging", config("local"), |name| {
            // The entry must be visible to the bootstrap step.
            let registry = Registry::load(&path).unwrap();
            assert!(registry.environments.contains_key(name));
            Ok(serde_yaml::Value::Null)
        });
        assert!(result.is_ok());
        assert!(Registry::load(&path).unwrap().get("staging").is_ok());
    }

    #[test]
    fn the_default_name_is_reserved() {
        let dir = TempDir::new().unwrap();
        let err = add_environment(&registry_path(&dir), "default", config("local"), |_| {
            panic!("bootstrap must not run")
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn duplicate_environment_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        add_environment(&path, "staging", config("local"), |_| {
            Ok(serde_yaml::Value::Null)
        })
        .unwrap();
        let err = add_environment(&path, "staging", config("local"), |_| {
            panic!("bootstrap must not run for a duplicate")
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn configuration_error_rolls_the_entry_back() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let err = add_environment(&path, "broken", config("ec2"), |_| {
            Err(Error::CommandFailed {
                command: "fleetctl bootstrap".into(),
                stderr: "ERROR configuration error: missing access key".into(),
                exit_code: Some(1),
            })
        })
        .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(Registry::load(&path).unwrap().get("broken").is_err());
    }

    #[test]
    fn other_bootstrap_failures_keep_the_entry() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let _ = add_environment(&path, "flaky", config("ec2"), |_| {
            Err(Error::CommandFailed {
                command: "fleetctl bootstrap".into(),
                stderr: "ERROR connection timed out".into(),
                exit_code: Some(1),
            })
        });
        assert!(Registry::load(&path).unwrap().get("flaky").is_ok());
    }

    #[test]
    fn destroying_unknown_environment_fails() {
        let dir = TempDir::new().unwrap();
        let err = destroy_environment(&registry_path(&dir), "ghost", true, false, |_| {
            panic!("destroy must not run")
        })
        .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(_)));
    }

    #[test]
    fn default_environment_is_guarded() {
        let dir = TempDir::new().unwrap();
        let path = registry_path(&dir);
        let mut registry = Registry::default();
        registry.default = Some("prod".to_string());
        registry
            .environments
            .insert("prod".to_string(), config("ec2"));
        registry.save(&path).unwrap();

        let err = destroy_environment(&path, "prod", true, false, |_| {
            panic!("destroy must not run")
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        destroy_environment(&path, "prod", true, true, |_| Ok(serde_yaml::Value::Null))
            .unwrap();
        let after = Registry::load(&path).unwrap();
        assert!(after.environments.is_empty());
        assert!(after.default.is_none());
    }
}
