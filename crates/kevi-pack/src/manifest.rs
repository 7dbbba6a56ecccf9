//! Manifest packages: raw YAML or a kustomize tree

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use kevi_core::{Artifact, MediaType, MemFs, PackageKind, PackageSpec, tgz_fs};
use kevi_engine::{ManifestRenderer, render_manifests};

use crate::error::Result;
use crate::package::{Package, image_artifacts, invalid_source};

/// Source tree held in memory, rendered by the manifest collaborator
pub struct ManifestPackage {
    name: String,
    fs: MemFs,
    images: Vec<String>,
    renderer: Arc<dyn ManifestRenderer>,
}

impl ManifestPackage {
    pub fn new(name: impl Into<String>, fs: MemFs, renderer: Arc<dyn ManifestRenderer>) -> Self {
        Self {
            name: name.into(),
            fs,
            images: Vec::new(),
            renderer,
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Read the spec's manifest path, a directory or a single YAML file
    pub fn from_spec(spec: &PackageSpec, renderer: Arc<dyn ManifestRenderer>) -> Result<Self> {
        let path = Path::new(&spec.manifest.path);
        let fs = if path.is_dir() {
            MemFs::from_dir(path)?
        } else if path.is_file() {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| invalid_source(&spec.name, "manifest path has no file name"))?;
            let mut fs = MemFs::new();
            fs.write_file(file_name, std::fs::read(path).map_err(|e| {
                invalid_source(&spec.name, format!("{}: {}", path.display(), e))
            })?)?;
            fs
        } else {
            return Err(invalid_source(
                &spec.name,
                format!("manifest path {} does not exist", path.display()),
            ));
        };

        Ok(Self::new(&spec.name, fs, renderer).with_images(spec.images.clone()))
    }

    pub fn fs(&self) -> &MemFs {
        &self.fs
    }
}

impl Package for ManifestPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PackageKind {
        PackageKind::Manifest
    }

    fn generate(&self) -> Result<Vec<u8>> {
        Ok(render_manifests(self.renderer.as_ref(), &self.fs)?)
    }

    fn contents(&self) -> Result<BTreeMap<String, Artifact>> {
        let mut contents = image_artifacts(&self.generate()?, &self.images)?;
        contents.insert(
            self.reference(),
            Artifact::blob(MediaType::ManifestLayer, tgz_fs(&self.fs)?),
        );
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kevi_core::{CoreError, untgz};
    use kevi_engine::ResourceBuilder;

    const DEPLOYMENT: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: web
        image: busybox:1.36
";

    fn package() -> ManifestPackage {
        let mut fs = MemFs::new();
        fs.write_file("deploy.yaml", DEPLOYMENT).unwrap();
        fs.write_file("cm.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n")
            .unwrap();
        ManifestPackage::new("raw", fs, Arc::new(ResourceBuilder::new()))
    }

    #[test]
    fn test_generate_synthesizes_kustomization() {
        let rendered = String::from_utf8(package().generate().unwrap()).unwrap();
        assert!(rendered.contains("kind: ConfigMap"));
        assert!(rendered.contains("busybox:1.36"));
    }

    #[test]
    fn test_contents() {
        let package = package();
        let contents = package.contents().unwrap();
        let keys: Vec<&str> = contents.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["docker.io/library/busybox:1.36", "kevi/raw"]);

        let archive = contents["kevi/raw"].data().unwrap();
        let unpacked = untgz(archive.as_ref()).unwrap();
        assert_eq!(unpacked.files().count(), 2);
        // the synthesized kustomization stays out of the archive
        assert!(!unpacked.exists("kustomization.yaml"));
    }

    #[test]
    fn test_from_spec_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.yaml");
        std::fs::write(&file, DEPLOYMENT).unwrap();

        let spec = PackageSpec::manifest("app", file.to_string_lossy());
        let package = ManifestPackage::from_spec(&spec, Arc::new(ResourceBuilder::new())).unwrap();
        assert!(package.fs().is_file("app.yaml"));
    }

    #[test]
    fn test_from_spec_missing_path() {
        let spec = PackageSpec::manifest("gone", "/nonexistent/kevi/manifests");
        let err = ManifestPackage::from_spec(&spec, Arc::new(ResourceBuilder::new()))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            crate::PackError::Core(CoreError::InvalidPackageSource { .. })
        ));
    }
}
