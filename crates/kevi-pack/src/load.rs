//! Rebuilding a package from what a registry holds

use kevi_core::{CoreError, PackageKind, PackageSpec, untgz};
use kevi_repo::{Fetcher, Store};

use crate::chart::ChartPackage;
use crate::error::{PackError, Result};
use crate::manifest::ManifestPackage;
use crate::package::{Package, Renderers};

/// Fetch a package's archive layer and rebuild the package from it
///
/// The result renders exactly like the package that was packed.
pub async fn load(fetcher: &Fetcher, spec: &PackageSpec, renderers: &Renderers) -> Result<Box<dyn Package>> {
    let mut store = Store::in_memory();
    let descriptors = fetcher.fetch(&mut store, spec).await?;

    let [descriptor] = descriptors.as_slice() else {
        return Err(PackError::UnexpectedLayerCount {
            package: spec.name.clone(),
            count: descriptors.len(),
        });
    };
    tracing::debug!(package = %spec.name, digest = %descriptor.digest, "loading package");

    match spec.identify() {
        PackageKind::Manifest => {
            let fs = untgz(store.fetch(descriptor)?)?;
            Ok(Box::new(
                ManifestPackage::new(&spec.name, fs, renderers.manifest.clone())
                    .with_images(spec.images.clone()),
            ))
        }
        PackageKind::Chart => Ok(Box::new(ChartPackage::from_archive(
            &spec.name,
            store.read_blob(descriptor)?,
            renderers.chart.clone(),
        )?)),
        PackageKind::Unknown => Err(CoreError::UnknownPackageType {
            name: spec.name.clone(),
        }
        .into()),
    }
}
