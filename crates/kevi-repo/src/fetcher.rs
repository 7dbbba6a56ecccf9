//! Pulling a single package back out of a remote registry

use std::sync::Arc;

use kevi_core::{Descriptor, MediaType, PackageSet, PackageSpec, Reference, package_reference, package_set_reference};
use tracing::{debug, info};

use crate::error::{RepoError, Result};
use crate::oci::OciRegistry;
use crate::registry::{Registry, RegistryOptions};
use crate::store::{IndexEntry, Store};

/// Copies package layers from a registry into a local store
#[derive(Clone)]
pub struct Fetcher {
    registry: Arc<dyn Registry>,
}

impl Fetcher {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// Fetcher backed by an OCI registry at `host`
    pub fn connect(host: &str, options: RegistryOptions) -> Result<Self> {
        Ok(Self::new(Arc::new(OciRegistry::new(host, options)?)))
    }

    pub fn hostname(&self) -> &str {
        self.registry.hostname()
    }

    /// Canonical remote reference for a package
    ///
    /// Falls back to the plain joined string when the name does not form a
    /// valid reference.
    pub fn locate(&self, package: &PackageSpec) -> String {
        match self.reference(package) {
            Ok(reference) => reference.to_string(),
            Err(_) => format!("{}/{}", self.hostname(), package_reference(&package.name)),
        }
    }

    fn reference(&self, package: &PackageSpec) -> Result<Reference> {
        Ok(Reference::parse(&package_reference(&package.name))?.relocated(self.hostname())?)
    }

    /// Copy the package's archive layer(s) into `store`
    ///
    /// Only layers of the media type matching the package kind are copied.
    /// The reference is tagged in `store` when exactly one layer arrives.
    pub async fn fetch(&self, store: &mut Store, package: &PackageSpec) -> Result<Vec<Descriptor>> {
        let media_type = package.content_media_type()?;
        let reference = self.reference(package)?;
        let located = reference.to_string();
        info!(package = %package.name, reference = %located, "fetching package");

        let layers = self.registry.pull(&reference, &[media_type]).await?;

        let mut descriptors = Vec::with_capacity(layers.len());
        for layer in &layers {
            layer.verify(&located)?;
            let descriptor = store.put_blob(&layer.data, &layer.descriptor.media_type)?;
            debug!(digest = %descriptor.digest, size = descriptor.size, "fetched layer");
            descriptors.push(descriptor);
        }

        if let [descriptor] = descriptors.as_slice() {
            store.tag(&located, IndexEntry::new(descriptor.clone()))?;
        }
        Ok(descriptors)
    }

    /// Pull a package-set definition stored by a previous pack
    pub async fn fetch_package_set(&self, name: &str) -> Result<PackageSet> {
        let reference = Reference::parse(&package_set_reference(name))?.relocated(self.hostname())?;
        let layers = self
            .registry
            .pull(&reference, &[MediaType::PackageSetLayer])
            .await?;

        let layer = layers.first().ok_or_else(|| RepoError::ReferenceNotFound {
            reference: reference.to_string(),
        })?;
        layer.verify(&reference.to_string())?;
        Ok(PackageSet::from_json(&layer.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Layer, MemoryRegistry};
    use kevi_core::{ChartSource, CoreError, MediaType};

    fn fetcher(registry: &Arc<MemoryRegistry>) -> Fetcher {
        Fetcher::new(registry.clone())
    }

    #[test]
    fn test_locate() {
        let registry = Arc::new(MemoryRegistry::new("registry.local:5000"));
        let spec = PackageSpec::manifest("raw", "./raw");
        assert_eq!(fetcher(&registry).locate(&spec), "registry.local:5000/kevi/raw:latest");
    }

    #[test]
    fn test_locate_falls_back_on_invalid_name() {
        let registry = Arc::new(MemoryRegistry::new("registry.local"));
        let spec = PackageSpec::manifest("Not Valid", "./raw");
        assert_eq!(fetcher(&registry).locate(&spec), "registry.local/kevi/Not Valid");
    }

    #[tokio::test]
    async fn test_fetch_filters_by_package_kind() {
        let registry = Arc::new(MemoryRegistry::new("registry.local"));
        let reference = Reference::parse("registry.local/kevi/podinfo").unwrap();
        registry.insert(
            &reference,
            vec![
                Layer::new(b"chart".to_vec(), MediaType::ChartLayer.as_str()),
                Layer::new(b"{}".to_vec(), MediaType::ChartConfig.as_str()),
            ],
        );

        let spec = PackageSpec::chart(
            "podinfo",
            ChartSource {
                path: "./podinfo".to_string(),
                ..Default::default()
            },
        );
        let mut store = Store::in_memory();
        let descriptors = fetcher(&registry).fetch(&mut store, &spec).await.unwrap();

        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].kind(), MediaType::ChartLayer);
        let resolved = store.resolve("registry.local/kevi/podinfo:latest").unwrap();
        assert_eq!(store.read_blob(&resolved).unwrap(), b"chart");
    }

    #[tokio::test]
    async fn test_fetch_wrong_kind_yields_nothing() {
        let registry = Arc::new(MemoryRegistry::new("registry.local"));
        let reference = Reference::parse("registry.local/kevi/raw").unwrap();
        registry.insert(
            &reference,
            vec![Layer::new(b"chart".to_vec(), MediaType::ChartLayer.as_str())],
        );

        let mut store = Store::in_memory();
        let spec = PackageSpec::manifest("raw", "./raw");
        let descriptors = fetcher(&registry).fetch(&mut store, &spec).await.unwrap();
        assert!(descriptors.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_unknown_package_type() {
        let registry = Arc::new(MemoryRegistry::new("registry.local"));
        let spec = PackageSpec {
            name: "empty".to_string(),
            ..Default::default()
        };
        let err = fetcher(&registry)
            .fetch(&mut Store::in_memory(), &spec)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Core(CoreError::UnknownPackageType { .. })));
    }

    #[tokio::test]
    async fn test_fetch_package_set() {
        let registry = Arc::new(MemoryRegistry::new("registry.local"));
        let set = PackageSet::new("demo", vec![PackageSpec::manifest("raw", "./raw")]);
        registry.insert(
            &Reference::parse("registry.local/kevi/kevi-demo").unwrap(),
            vec![Layer::new(set.to_json().unwrap(), MediaType::PackageSetLayer.as_str())],
        );

        let fetched = fetcher(&registry).fetch_package_set("demo").await.unwrap();
        assert_eq!(fetched, set);

        let err = fetcher(&registry).fetch_package_set("other").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_missing_reference() {
        let registry = Arc::new(MemoryRegistry::new("registry.local"));
        let spec = PackageSpec::manifest("absent", "./absent");
        let err = fetcher(&registry)
            .fetch(&mut Store::in_memory(), &spec)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
