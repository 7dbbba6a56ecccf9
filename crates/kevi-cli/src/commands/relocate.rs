//! Relocate command - copy a store to another registry

use console::style;
use std::path::Path;
use std::time::Duration;

use kevi_repo::{OciRegistry, Registry, Store, copy_all};

use super::{RegistryArgs, load_config, missing_store, store_root};
use crate::error::{CliError, Result};

pub async fn run(
    config_path: Option<&Path>,
    host: &str,
    store: Option<&Path>,
    registry_args: &RegistryArgs,
    timeout: u64,
) -> Result<()> {
    let config = load_config(config_path)?;
    let root = store_root(&config, store);
    if !root.is_dir() {
        return Err(missing_store(&root));
    }
    let store = Store::open(&root)?;

    let registry = OciRegistry::new(host, registry_args.options(&config, host))?;
    registry.catalog().await.map_err(|e| {
        CliError::registry_with_help(
            format!("{} is not reachable: {}", host, e),
            "check the host name, or pass --plain-http / --insecure for a local registry",
        )
    })?;

    println!(
        "{} {} artifacts to {}",
        style("Relocating").cyan().bold(),
        store.len(),
        host
    );

    let copied = tokio::time::timeout(Duration::from_secs(timeout), copy_all(&store, &registry))
        .await
        .map_err(|_| CliError::Registry {
            message: format!("relocation to {} did not finish within {}s", host, timeout),
            help: Some("raise --timeout for large stores".to_string()),
        })??;

    for descriptor in &copied {
        println!(
            "  {} {} {}",
            style("→").blue(),
            descriptor.ref_name().unwrap_or("-"),
            style(&descriptor.digest).dim()
        );
    }
    println!("{} {} artifacts", style("Copied").green().bold(), copied.len());
    Ok(())
}
