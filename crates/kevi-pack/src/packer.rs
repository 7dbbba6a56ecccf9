//! Packing package-sets into a store

use std::collections::BTreeMap;

use kevi_core::{Artifact, Descriptor, MediaType, PackageSet};
use kevi_repo::{Registry, Store, copy_all};
use tracing::info;

use crate::error::Result;
use crate::package::{Renderers, open};

/// Builds package-sets into the store it owns
pub struct Packer {
    store: Store,
    renderers: Renderers,
}

impl Packer {
    pub fn new(store: Store, renderers: Renderers) -> Self {
        Self { store, renderers }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    /// Render every package of `set` and store its contents, then the set itself
    ///
    /// Every package is rendered before anything is written, and the packages
    /// and the set are indexed in one update, so a failure leaves the index
    /// untouched.
    pub async fn pack(&mut self, set: &PackageSet) -> Result<Vec<Descriptor>> {
        set.validate()?;
        info!(set = set.name(), packages = set.packages().len(), "packing");

        let mut collections = Vec::with_capacity(set.packages().len());
        for spec in set.packages() {
            let package = open(spec, &self.renderers).await?;
            collections.push((spec.name.clone(), package.contents()?));
        }

        let mut set_artifact = BTreeMap::new();
        set_artifact.insert(
            set.reference(),
            Artifact::blob(MediaType::PackageSetLayer, set.to_json()?),
        );
        collections.push((set.name().to_string(), set_artifact));

        let descriptors = self
            .store
            .add_collections(collections.iter().map(|(name, contents)| (name.as_str(), contents)))?;

        info!(set = set.name(), artifacts = descriptors.len(), "packed");
        Ok(descriptors)
    }

    /// Relocate the whole store onto `registry`
    pub async fn copy_all(&self, registry: &dyn Registry) -> Result<Vec<Descriptor>> {
        Ok(copy_all(&self.store, registry).await?)
    }
}
