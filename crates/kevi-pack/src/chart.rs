//! Chart packages

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use kevi_core::{Artifact, CoreError, MediaType, PackageKind, PackageSpec, is_compressed_archive, tgz_dir};
use kevi_engine::{Chart, ChartRenderer, RenderOptions};

use crate::error::Result;
use crate::package::{Package, image_artifacts, invalid_source};

/// A loaded chart together with the archive it is stored as
pub struct ChartPackage {
    name: String,
    chart: Chart,
    archive: Vec<u8>,
    images: Vec<String>,
    renderer: Arc<dyn ChartRenderer>,
}

impl ChartPackage {
    /// Chart from a directory or `.tgz` on disk
    ///
    /// An archive is stored byte for byte; a directory is archived under its
    /// own name.
    pub fn from_path(spec: &PackageSpec, path: &Path, renderer: Arc<dyn ChartRenderer>) -> Result<Self> {
        if !path.exists() {
            return Err(invalid_source(
                &spec.name,
                format!("chart path {} does not exist", path.display()),
            ));
        }

        let archive = if is_compressed_archive(path) {
            std::fs::read(path).map_err(|e| CoreError::Archive {
                message: format!("{}: {}", path.display(), e),
            })?
        } else {
            tgz_dir(path)?
        };

        let mut package = Self::from_archive(&spec.name, archive, renderer)?;
        package.images = spec.images.clone();
        Ok(package)
    }

    /// Chart from archive bytes, as pulled from a registry
    pub fn from_archive(name: impl Into<String>, archive: Vec<u8>, renderer: Arc<dyn ChartRenderer>) -> Result<Self> {
        let chart = Chart::load_archive(Cursor::new(&archive))?;
        Ok(Self {
            name: name.into(),
            chart,
            archive,
            images: Vec::new(),
            renderer,
        })
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }
}

impl Package for ChartPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PackageKind {
        PackageKind::Chart
    }

    fn generate(&self) -> Result<Vec<u8>> {
        Ok(self.renderer.render(&self.chart, &RenderOptions::dry_run())?)
    }

    fn contents(&self) -> Result<BTreeMap<String, Artifact>> {
        let mut contents = image_artifacts(&self.generate()?, &self.images)?;
        contents.insert(
            self.reference(),
            Artifact::blob(MediaType::ChartLayer, self.archive.clone())
                .with_config(MediaType::ChartConfig, self.chart.config_json()?),
        );
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kevi_core::ChartSource;
    use kevi_engine::JinjaChartRenderer;
    use std::fs;

    fn write_chart(dir: &Path) {
        fs::create_dir_all(dir.join("templates")).unwrap();
        fs::write(dir.join("Chart.yaml"), "apiVersion: v2\nname: podinfo\nversion: 6.0.0\n").unwrap();
        fs::write(dir.join("values.yaml"), "image: ghcr.io/stefanprodan/podinfo:6.0.0\n").unwrap();
        fs::write(
            dir.join("templates/deployment.yaml"),
            "apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ release.name }}-podinfo
spec:
  template:
    spec:
      containers:
      - name: podinfo
        image: {{ values.image }}
",
        )
        .unwrap();
    }

    fn spec(path: &Path) -> PackageSpec {
        PackageSpec::chart(
            "podinfo",
            ChartSource {
                path: path.to_string_lossy().into_owned(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_generate_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let chart_dir = dir.path().join("podinfo");
        write_chart(&chart_dir);

        let package =
            ChartPackage::from_path(&spec(&chart_dir), &chart_dir, Arc::new(JinjaChartRenderer::new())).unwrap();
        let rendered = String::from_utf8(package.generate().unwrap()).unwrap();
        assert!(rendered.contains("name: dry-podinfo"));
    }

    #[test]
    fn test_contents_carry_chart_config() {
        let dir = tempfile::tempdir().unwrap();
        let chart_dir = dir.path().join("podinfo");
        write_chart(&chart_dir);

        let package =
            ChartPackage::from_path(&spec(&chart_dir), &chart_dir, Arc::new(JinjaChartRenderer::new())).unwrap();
        let contents = package.contents().unwrap();

        assert!(contents.contains_key("ghcr.io/stefanprodan/podinfo:6.0.0"));
        let archive = &contents["kevi/podinfo"];
        assert_eq!(archive.media_type(), MediaType::ChartLayer);
        let config = archive.config().unwrap();
        assert_eq!(config.media_type, MediaType::ChartConfig);
        let metadata: serde_json::Value = serde_json::from_slice(&config.data).unwrap();
        assert_eq!(metadata["name"], "podinfo");
    }

    #[test]
    fn test_archive_source_stored_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let chart_dir = dir.path().join("podinfo");
        write_chart(&chart_dir);
        let tgz = dir.path().join("podinfo-6.0.0.tgz");
        fs::write(&tgz, tgz_dir(&chart_dir).unwrap()).unwrap();

        let package = ChartPackage::from_path(&spec(&tgz), &tgz, Arc::new(JinjaChartRenderer::new())).unwrap();
        let contents = package.contents().unwrap();
        assert_eq!(
            contents["kevi/podinfo"].data().unwrap().as_ref(),
            fs::read(&tgz).unwrap().as_slice()
        );
    }

    #[test]
    fn test_missing_path() {
        let missing = Path::new("/nonexistent/podinfo");
        let err = ChartPackage::from_path(&spec(missing), missing, Arc::new(JinjaChartRenderer::new()))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            crate::PackError::Core(CoreError::InvalidPackageSource { .. })
        ));
    }
}
