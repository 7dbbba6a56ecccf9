//! Kevi configuration file
//!
//! Stored in `~/.config/kevi/config.yaml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};
use crate::registry::RegistryOptions;

const DEFAULT_STORE: &str = "store";

/// Kevi configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeviConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Default store root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,

    /// Where downloaded charts are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_cache: Option<PathBuf>,

    #[serde(default)]
    pub registries: Vec<RegistryEntry>,
}

fn default_api_version() -> String {
    kevi_core::package::API_VERSION.to_string()
}

impl Default for KeviConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            store: None,
            chart_cache: None,
            registries: Vec::new(),
        }
    }
}

/// Per-host registry settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub host: String,

    #[serde(default)]
    pub plain_http: bool,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl KeviConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| RepoError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("kevi").join("config.yaml"))
    }

    pub fn store_root(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE))
    }

    pub fn chart_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.chart_cache {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine cache directory".to_string(),
        })?;
        Ok(cache_dir.join("kevi").join("charts"))
    }

    /// Transport options for `host`; unknown hosts get the defaults
    pub fn registry_options(&self, host: &str) -> RegistryOptions {
        let Some(entry) = self.registries.iter().find(|r| r.host == host) else {
            return RegistryOptions::default();
        };
        RegistryOptions {
            plain_http: entry.plain_http,
            insecure: entry.insecure,
            username: entry.username.clone(),
            password: entry
                .password_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KeviConfig::default();
        assert_eq!(config.api_version, "kevi.cattle.io/v1alpha1");
        assert_eq!(config.store_root(), PathBuf::from("store"));
        assert!(config.registries.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = KeviConfig {
            store: Some(PathBuf::from("/var/lib/kevi")),
            registries: vec![RegistryEntry {
                host: "registry.local:5000".to_string(),
                plain_http: true,
                ..Default::default()
            }],
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = KeviConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_parse_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "store: ./packs\nchartCache: /tmp/charts\nregistries:\n- host: mirror.local\n  plainHttp: true\n  insecure: true\n  username: admin\n",
        )
        .unwrap();

        let config = KeviConfig::load_from(&path).unwrap();
        assert_eq!(config.chart_cache_dir().unwrap(), PathBuf::from("/tmp/charts"));
        let options = config.registry_options("mirror.local");
        assert!(options.plain_http && options.insecure);
        assert_eq!(options.username.as_deref(), Some("admin"));
        assert!(options.password.is_none());
    }

    #[test]
    fn test_password_from_env() {
        let var = "KEVI_TEST_REGISTRY_PASSWORD";
        // SAFETY: no other test reads or writes this variable
        unsafe { std::env::set_var(var, "s3cret") };

        let config = KeviConfig {
            registries: vec![RegistryEntry {
                host: "registry.local".to_string(),
                username: Some("admin".to_string()),
                password_env: Some(var.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(
            config.registry_options("registry.local").password.as_deref(),
            Some("s3cret")
        );
        assert_eq!(config.registry_options("other.local"), RegistryOptions::default());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "registries: {not: [a list").unwrap();
        assert!(matches!(
            KeviConfig::load_from(&path),
            Err(RepoError::InvalidConfig { .. })
        ));
    }
}
