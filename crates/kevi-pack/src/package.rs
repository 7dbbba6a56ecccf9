//! The package abstraction
//!
//! A package renders itself and lists the artifacts it is stored as. The
//! variants differ only in where their source comes from and how it renders.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use kevi_core::{Artifact, CoreError, PackageKind, PackageSpec, Reference, package_reference};
use kevi_engine::{ChartRenderer, JinjaChartRenderer, ManifestRenderer, ResourceBuilder, find_images};
use kevi_repo::ChartLocator;

use crate::chart::ChartPackage;
use crate::error::{PackError, Result};
use crate::manifest::ManifestPackage;

/// Something that can be rendered and stored
pub trait Package: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> PackageKind;

    /// Store reference of the package's archive artifact
    fn reference(&self) -> String {
        package_reference(self.name())
    }

    /// Rendered YAML
    fn generate(&self) -> Result<Vec<u8>>;

    /// Every artifact the package is stored as, keyed by reference
    ///
    /// Images found in the rendered output and images listed explicitly are
    /// keyed by their normalized reference; the archive sits under
    /// [`Package::reference`].
    fn contents(&self) -> Result<BTreeMap<String, Artifact>>;
}

/// Renderer collaborators handed to every package
#[derive(Clone)]
pub struct Renderers {
    pub manifest: Arc<dyn ManifestRenderer>,
    pub chart: Arc<dyn ChartRenderer>,

    /// Resolves charts given by repository URL; without one such charts fail
    pub locator: Option<Arc<dyn ChartLocator>>,
}

impl Default for Renderers {
    fn default() -> Self {
        Self {
            manifest: Arc::new(ResourceBuilder::new()),
            chart: Arc::new(JinjaChartRenderer::new()),
            locator: None,
        }
    }
}

impl Renderers {
    pub fn with_locator(mut self, locator: Arc<dyn ChartLocator>) -> Self {
        self.locator = Some(locator);
        self
    }
}

/// Build the package variant a spec describes from its on-disk source
pub async fn open(spec: &PackageSpec, renderers: &Renderers) -> Result<Box<dyn Package>> {
    match spec.identify() {
        PackageKind::Manifest => Ok(Box::new(ManifestPackage::from_spec(
            spec,
            renderers.manifest.clone(),
        )?)),
        PackageKind::Chart => {
            let path = if !spec.chart.path.is_empty() {
                Path::new(&spec.chart.path).to_path_buf()
            } else {
                let locator = renderers.locator.as_ref().ok_or_else(|| {
                    invalid_source(&spec.name, "no chart repository locator is configured")
                })?;
                if spec.chart.name.is_empty() {
                    return Err(invalid_source(&spec.name, "chart.name is required with chart.repoUrl"));
                }
                locator.locate(&spec.chart).await?
            };
            Ok(Box::new(ChartPackage::from_path(
                spec,
                &path,
                renderers.chart.clone(),
            )?))
        }
        PackageKind::Unknown => Err(CoreError::UnknownPackageType {
            name: spec.name.clone(),
        }
        .into()),
    }
}

pub(crate) fn invalid_source(name: &str, message: impl Into<String>) -> PackError {
    CoreError::InvalidPackageSource {
        name: name.to_string(),
        message: message.into(),
    }
    .into()
}

/// Image artifacts for everything referenced in `rendered` plus `explicit`
pub(crate) fn image_artifacts(rendered: &[u8], explicit: &[String]) -> Result<BTreeMap<String, Artifact>> {
    let discovered = find_images(rendered);
    tracing::debug!(discovered = discovered.len(), explicit = explicit.len(), "images");

    let mut artifacts = BTreeMap::new();
    for image in discovered.iter().chain(explicit) {
        let reference = Reference::parse(image)?;
        artifacts.insert(reference.to_string(), Artifact::image(reference));
    }
    Ok(artifacts)
}
