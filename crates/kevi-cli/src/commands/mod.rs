//! CLI commands

pub mod images;
pub mod ls;
pub mod pack;
pub mod relocate;
pub mod render;

use clap::Args;
use std::path::Path;

use kevi_repo::{KeviConfig, RegistryOptions};

use crate::error::{CliError, Result};

/// Registry connection flags, layered over the configuration file
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Use plain HTTP
    #[arg(long)]
    pub plain_http: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    #[arg(long, env = "KEVI_REGISTRY_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "KEVI_REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl RegistryArgs {
    pub fn options(&self, config: &KeviConfig, host: &str) -> RegistryOptions {
        let base = config.registry_options(host);
        RegistryOptions {
            plain_http: self.plain_http || base.plain_http,
            insecure: self.insecure || base.insecure,
            username: self.username.clone().or(base.username),
            password: self.password.clone().or(base.password),
        }
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<KeviConfig> {
    let config = match path {
        Some(path) => KeviConfig::load_from(path)?,
        None => KeviConfig::load()?,
    };
    Ok(config)
}

pub(crate) fn store_root(config: &KeviConfig, store: Option<&Path>) -> std::path::PathBuf {
    store.map(Path::to_path_buf).unwrap_or_else(|| config.store_root())
}

pub(crate) fn missing_store(root: &Path) -> CliError {
    CliError::usage_with_help(
        format!("No store at {}", root.display()),
        "run `kevi pack` first or pass --store",
    )
}
