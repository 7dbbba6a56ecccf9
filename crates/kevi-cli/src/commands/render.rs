//! Render command - fetch a package from a registry and render it

use std::io::Write;
use std::path::Path;

use kevi_core::PackageSet;
use kevi_engine::rewrite_manifest;
use kevi_pack::{Renderers, load};
use kevi_repo::Fetcher;

use super::{RegistryArgs, load_config};
use crate::error::{CliError, Result};

pub async fn run(
    config_path: Option<&Path>,
    host: &str,
    package: &str,
    file: Option<&Path>,
    set: Option<&str>,
    rewrite_images: Option<&str>,
    registry_args: &RegistryArgs,
) -> Result<()> {
    let config = load_config(config_path)?;
    let fetcher = Fetcher::connect(host, registry_args.options(&config, host))?;

    let sets = match (file, set) {
        (Some(file), _) => PackageSet::from_yaml_documents(&std::fs::read_to_string(file)?)?,
        (None, Some(name)) => vec![fetcher.fetch_package_set(name).await?],
        (None, None) => {
            return Err(CliError::usage_with_help(
                "No package-set given",
                "pass --file <package-set.yaml> or --set <name>",
            ));
        }
    };

    let spec = sets
        .iter()
        .find_map(|s| s.get(package))
        .ok_or_else(|| CliError::usage(format!("Package '{}' is not part of the package-set", package)))?;
    tracing::debug!(package, reference = %fetcher.locate(spec), "rendering");

    let package = load(&fetcher, spec, &Renderers::default()).await?;
    let mut rendered = package.generate()?;
    if let Some(registry) = rewrite_images {
        rendered = rewrite_manifest(&rendered, registry)?;
    }

    std::io::stdout().write_all(&rendered)?;
    Ok(())
}
