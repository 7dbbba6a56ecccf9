//! Chart model and loaders
//!
//! A chart is `Chart.yaml` metadata, default `values.yaml`, templates under
//! `templates/` and raw CRDs under `crds/`. Charts load from a directory or
//! from a `.tgz` archive whose entries sit under a single top-level directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use kevi_core::{MemFs, is_compressed_archive, untgz};

use crate::error::{EngineError, Result};

pub const CHART_FILE: &str = "Chart.yaml";
pub const VALUES_FILE: &str = "values.yaml";
pub const TEMPLATES_DIR: &str = "templates";
pub const CRDS_DIR: &str = "crds";

/// `Chart.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A loaded chart
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub metadata: ChartMetadata,

    /// Defaults from `values.yaml`
    pub values: serde_json::Value,

    /// Template sources keyed by path relative to the chart root
    pub templates: BTreeMap<String, String>,

    /// CRD documents keyed by path relative to the chart root
    pub crds: BTreeMap<String, String>,
}

impl Chart {
    /// Load from a chart directory or a chart archive
    pub fn load(path: &Path) -> Result<Self> {
        if is_compressed_archive(path) {
            Self::load_archive(File::open(path)?)
        } else if path.is_dir() {
            Self::from_fs(&MemFs::from_dir(path)?)
        } else {
            Err(EngineError::chart(format!(
                "{} is neither a chart directory nor a .tgz archive",
                path.display()
            )))
        }
    }

    /// Load from a tar+gzip stream
    pub fn load_archive<R: Read>(reader: R) -> Result<Self> {
        let fs = untgz(reader)?;
        if fs.is_file(CHART_FILE) {
            return Self::from_fs(&fs);
        }

        let roots: Vec<String> = fs
            .read_dir("")?
            .into_iter()
            .filter(|entry| fs.is_file(&format!("{}/{}", entry, CHART_FILE)))
            .collect();
        match roots.as_slice() {
            [root] => Self::from_fs(&fs.subtree(root)?),
            [] => Err(EngineError::chart("archive contains no Chart.yaml")),
            _ => Err(EngineError::chart(format!(
                "archive contains several charts: {}",
                roots.join(", ")
            ))),
        }
    }

    /// Load from a tree rooted at the chart directory
    pub fn from_fs(fs: &MemFs) -> Result<Self> {
        let raw = fs
            .read_file(CHART_FILE)
            .map_err(|_| EngineError::chart("missing Chart.yaml"))?;
        let metadata: ChartMetadata = serde_yaml::from_slice(raw)
            .map_err(|e| EngineError::chart(format!("Chart.yaml: {}", e)))?;
        if metadata.name.is_empty() || metadata.version.is_empty() {
            return Err(EngineError::chart("Chart.yaml needs name and version"));
        }

        let values = match fs.read_file(VALUES_FILE) {
            Ok(data) => {
                let values: serde_json::Value = serde_yaml::from_slice(data)
                    .map_err(|e| EngineError::chart(format!("values.yaml: {}", e)))?;
                if values.is_null() {
                    serde_json::Value::Object(Default::default())
                } else {
                    values
                }
            }
            Err(_) => serde_json::Value::Object(Default::default()),
        };

        Ok(Self {
            metadata,
            values,
            templates: collect_text(fs, TEMPLATES_DIR)?,
            crds: collect_text(fs, CRDS_DIR)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Metadata as JSON, the body of a chart config artifact
    pub fn config_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.metadata)?)
    }
}

fn collect_text(fs: &MemFs, dir: &str) -> Result<BTreeMap<String, String>> {
    let prefix = format!("{}/", dir);
    fs.files()
        .filter(|(path, _)| path.starts_with(&prefix))
        .map(|(path, data)| {
            let text = String::from_utf8(data.to_vec())
                .map_err(|e| EngineError::chart(format!("{}: {}", path, e)))?;
            Ok((path.to_string(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kevi_core::tgz_dir;
    use tempfile::TempDir;

    fn write_chart(dir: &Path) {
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::create_dir_all(dir.join("crds")).unwrap();
        std::fs::write(
            dir.join("Chart.yaml"),
            "apiVersion: v2\nname: podinfo\nversion: 6.0.3\nappVersion: 6.0.3\n",
        )
        .unwrap();
        std::fs::write(dir.join("values.yaml"), "image:\n  repository: ghcr.io/stefanprodan/podinfo\n  tag: 6.0.3\n").unwrap();
        std::fs::write(dir.join("templates/deployment.yaml"), "kind: Deployment\n").unwrap();
        std::fs::write(dir.join("crds/crd.yaml"), "kind: CustomResourceDefinition\n").unwrap();
    }

    #[test]
    fn test_load_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("podinfo");
        write_chart(&dir);

        let chart = Chart::load(&dir).unwrap();
        assert_eq!(chart.name(), "podinfo");
        assert_eq!(chart.metadata.app_version.as_deref(), Some("6.0.3"));
        assert_eq!(chart.values["image"]["tag"], "6.0.3");
        assert!(chart.templates.contains_key("templates/deployment.yaml"));
        assert!(chart.crds.contains_key("crds/crd.yaml"));
    }

    #[test]
    fn test_load_archive() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("podinfo");
        write_chart(&dir);

        let archive = temp.path().join("podinfo-6.0.3.tgz");
        std::fs::write(&archive, tgz_dir(&dir).unwrap()).unwrap();

        let from_archive = Chart::load(&archive).unwrap();
        assert_eq!(from_archive, Chart::load(&dir).unwrap());
    }

    #[test]
    fn test_missing_values_defaults_to_empty() {
        let mut fs = MemFs::new();
        fs.write_file("Chart.yaml", "name: x\nversion: 0.1.0\n").unwrap();
        let chart = Chart::from_fs(&fs).unwrap();
        assert!(chart.values.as_object().unwrap().is_empty());
        assert!(chart.templates.is_empty());
    }

    #[test]
    fn test_invalid_charts() {
        assert!(matches!(
            Chart::from_fs(&MemFs::new()),
            Err(EngineError::Chart { .. })
        ));

        let mut fs = MemFs::new();
        fs.write_file("Chart.yaml", "name: x\nversion: \"\"\n").unwrap();
        assert!(Chart::from_fs(&fs).is_err());

        assert!(Chart::load_archive(&b"garbage"[..]).is_err());
    }

    #[test]
    fn test_config_json() {
        let mut fs = MemFs::new();
        fs.write_file("Chart.yaml", "apiVersion: v2\nname: x\nversion: 0.1.0\n").unwrap();
        let chart = Chart::from_fs(&fs).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&chart.config_json().unwrap()).unwrap();
        assert_eq!(json["name"], "x");
        assert_eq!(json["apiVersion"], "v2");
    }
}
