//! Ls command - list store contents

use console::style;
use std::path::Path;

use kevi_core::MediaType;
use kevi_repo::Store;

use super::{load_config, missing_store, store_root};
use crate::error::Result;

pub fn run(config_path: Option<&Path>, store: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let root = store_root(&config, store);
    if !root.is_dir() {
        return Err(missing_store(&root));
    }
    let store = Store::open(&root)?;

    println!(
        "{:<48} {:<14} {:<20} {:>10}",
        style("REFERENCE").bold(),
        style("TYPE").bold(),
        style("DIGEST").bold(),
        style("SIZE").bold()
    );
    store.walk(|reference, descriptor| {
        println!(
            "{:<48} {:<14} {:<20} {:>10}",
            reference,
            kind_label(descriptor.kind()),
            truncate_digest(&descriptor.digest.to_string()),
            descriptor.size
        );
        Ok(())
    })?;

    for (reference, _) in store.package_sets() {
        let set = store.load_package_set(&reference)?;
        let names: Vec<&str> = set.packages().iter().map(|p| p.name.as_str()).collect();
        println!();
        println!("{} {}: {}", style("Package-set").bold(), set.name(), names.join(", "));
    }
    Ok(())
}

fn kind_label(kind: MediaType) -> &'static str {
    match kind {
        MediaType::ManifestLayer => "manifest",
        MediaType::ChartLayer => "chart",
        MediaType::ChartConfig => "chart-config",
        MediaType::ImageLayer => "image",
        MediaType::PackageSetLayer => "package-set",
        MediaType::Unknown => "unknown",
    }
}

/// `sha256:` plus the first 12 hex characters
fn truncate_digest(digest: &str) -> &str {
    let end = digest.len().min("sha256:".len() + 12);
    &digest[..end]
}
