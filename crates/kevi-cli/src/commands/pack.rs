//! Pack command - build package-sets into a local store

use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kevi_core::PackageSet;
use kevi_pack::{Packer, Renderers};
use kevi_repo::{HttpChartLocator, Store};

use super::{load_config, store_root};
use crate::error::{CliError, Result};

pub async fn run(
    config_path: Option<&Path>,
    files: &[PathBuf],
    store: Option<&Path>,
    archive: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;

    let mut sets = Vec::new();
    for file in files {
        let content = std::fs::read_to_string(file).map_err(|e| CliError::Io {
            message: format!("{}: {}", file.display(), e),
        })?;
        sets.extend(PackageSet::from_yaml_documents(&content)?);
    }
    if sets.is_empty() {
        return Err(CliError::usage("No package-sets found in the given files"));
    }

    let root = store_root(&config, store);
    let locator = HttpChartLocator::new(config.chart_cache_dir()?)?;
    let renderers = Renderers::default().with_locator(Arc::new(locator));
    let mut packer = Packer::new(Store::open(&root)?, renderers);

    for set in &sets {
        println!(
            "{} {} ({} packages)",
            style("Packing").cyan().bold(),
            set.name(),
            set.packages().len()
        );
        for descriptor in packer.pack(set).await? {
            println!(
                "  {} {} {}",
                style("+").green().bold(),
                descriptor.ref_name().unwrap_or("-"),
                style(&descriptor.digest).dim()
            );
        }
    }

    println!();
    println!("{} {}", style("Store").bold(), root.display());

    if let Some(output) = archive {
        let written = packer.store().archive(output)?;
        println!("{} {}", style("Archive").bold(), written.display());
    }
    Ok(())
}
