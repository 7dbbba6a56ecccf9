//! Package identities and package-sets
//!
//! A package-set file is a stream of YAML documents, each one a named set of
//! packages:
//!
//! ```yaml
//! apiVersion: kevi.cattle.io/v1alpha1
//! kind: Kevi
//! metadata:
//!   name: demo
//! spec:
//!   packages:
//!     - name: raw
//!       manifest:
//!         path: ./manifests
//!     - name: podinfo
//!       chart:
//!         repoUrl: https://stefanprodan.github.io/podinfo
//!         name: podinfo
//!         version: 6.0.3
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::media::MediaType;
use crate::reference::Reference;

/// Repository namespace every package artifact is stored under
pub const DEFAULT_REPOSITORY_NAMESPACE: &str = "kevi";

/// Prefix of the reserved package-set reference (`kevi/kevi-<name>`)
pub const PACKAGE_SET_PREFIX: &str = "kevi";

pub const API_VERSION: &str = "kevi.cattle.io/v1alpha1";
pub const KIND: &str = "Kevi";

/// Reference a package artifact is stored under
pub fn package_reference(name: &str) -> String {
    format!("{}/{}", DEFAULT_REPOSITORY_NAMESPACE, name)
}

/// Reserved reference a package-set artifact is stored under
pub fn package_set_reference(name: &str) -> String {
    format!(
        "{}/{}-{}",
        DEFAULT_REPOSITORY_NAMESPACE, PACKAGE_SET_PREFIX, name
    )
}

/// Package variant, derived from which source fields are populated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Manifest,
    Chart,
    Unknown,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => f.write_str("manifest"),
            Self::Chart => f.write_str("chart"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Raw manifests or a kustomize tree on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSource {
    #[serde(default)]
    pub path: String,
}

impl ManifestSource {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// A local chart (directory or archive) or a chart in an HTTP repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl ChartSource {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && self.name.is_empty() && self.repo_url.is_empty() && self.version.is_empty()
    }
}

/// Package identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "ManifestSource::is_empty")]
    pub manifest: ManifestSource,

    #[serde(default, skip_serializing_if = "ChartSource::is_empty")]
    pub chart: ChartSource,

    /// Images to carry along with the package in addition to the discovered ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl PackageSpec {
    pub fn manifest(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manifest: ManifestSource { path: path.into() },
            ..Default::default()
        }
    }

    pub fn chart(name: impl Into<String>, chart: ChartSource) -> Self {
        Self {
            name: name.into(),
            chart,
            ..Default::default()
        }
    }

    /// Derive the variant: a manifest path wins, then a chart path or repo URL
    pub fn identify(&self) -> PackageKind {
        if !self.manifest.path.is_empty() {
            PackageKind::Manifest
        } else if !self.chart.path.is_empty() || !self.chart.repo_url.is_empty() {
            PackageKind::Chart
        } else {
            PackageKind::Unknown
        }
    }

    pub fn reference(&self) -> String {
        package_reference(&self.name)
    }

    /// Media type of the single archive layer this package is stored as
    pub fn content_media_type(&self) -> Result<MediaType> {
        match self.identify() {
            PackageKind::Manifest => Ok(MediaType::ManifestLayer),
            PackageKind::Chart => Ok(MediaType::ChartLayer),
            PackageKind::Unknown => Err(CoreError::UnknownPackageType {
                name: self.name.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSetSpec {
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
}

/// An ordered list of packages bound to a set name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSet {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PackageSetSpec,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl PackageSet {
    pub fn new(name: impl Into<String>, packages: Vec<PackageSpec>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                ..Default::default()
            },
            spec: PackageSetSpec { packages },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn packages(&self) -> &[PackageSpec] {
        &self.spec.packages
    }

    pub fn get(&self, package: &str) -> Option<&PackageSpec> {
        self.spec.packages.iter().find(|p| p.name == package)
    }

    pub fn reference(&self) -> String {
        package_set_reference(self.name())
    }

    /// Parse every package-set in a multi-document YAML stream
    pub fn from_yaml_documents(yaml: &str) -> Result<Vec<Self>> {
        let mut sets = Vec::new();
        for document in serde_yaml::Deserializer::from_str(yaml) {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            sets.push(serde_yaml::from_value(value)?);
        }
        Ok(sets)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Check names before anything is rendered
    ///
    /// Package names must be present and unique within the set, and must not
    /// start with the package-set prefix, which would let a package shadow a
    /// package-set reference.
    pub fn validate(&self) -> Result<()> {
        if self.name().is_empty() {
            return Err(CoreError::InvalidPackageSource {
                name: String::new(),
                message: "package-set metadata.name is required".to_string(),
            });
        }
        Reference::parse(&self.reference())?;

        let reserved = format!("{}-", PACKAGE_SET_PREFIX);
        let mut seen = HashSet::new();
        for pkg in &self.spec.packages {
            if pkg.name.is_empty() {
                return Err(CoreError::InvalidPackageSource {
                    name: self.name().to_string(),
                    message: "every package needs a name".to_string(),
                });
            }
            if pkg.name.starts_with(&reserved) {
                return Err(CoreError::ReservedName {
                    name: pkg.name.clone(),
                    prefix: PACKAGE_SET_PREFIX.to_string(),
                });
            }
            if !seen.insert(pkg.name.as_str()) {
                return Err(CoreError::InvalidPackageSource {
                    name: pkg.name.clone(),
                    message: format!("duplicate package name in set '{}'", self.name()),
                });
            }
            Reference::parse(&pkg.reference())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify() {
        let m = PackageSpec::manifest("raw", "./raw");
        assert_eq!(m.identify(), PackageKind::Manifest);

        let c = PackageSpec::chart(
            "podinfo",
            ChartSource {
                path: "podinfo-6.0.3.tgz".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(c.identify(), PackageKind::Chart);

        let remote = PackageSpec::chart(
            "loki",
            ChartSource {
                name: "loki".to_string(),
                repo_url: "https://grafana.github.io/helm-charts".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(remote.identify(), PackageKind::Chart);

        // A chart name alone is not a location
        let nameonly = PackageSpec::chart(
            "x",
            ChartSource {
                name: "x".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(nameonly.identify(), PackageKind::Unknown);
        assert!(matches!(
            nameonly.content_media_type(),
            Err(CoreError::UnknownPackageType { .. })
        ));
    }

    #[test]
    fn test_references() {
        assert_eq!(package_reference("raw"), "kevi/raw");
        assert_eq!(package_set_reference("demo"), "kevi/kevi-demo");
        assert_eq!(PackageSet::new("demo", vec![]).reference(), "kevi/kevi-demo");
    }

    #[test]
    fn test_content_media_type() {
        assert_eq!(
            PackageSpec::manifest("raw", "./raw").content_media_type().unwrap(),
            MediaType::ManifestLayer
        );
    }

    #[test]
    fn test_parse_documents() {
        let yaml = r#"
apiVersion: kevi.cattle.io/v1alpha1
kind: Kevi
metadata:
  name: demo
spec:
  packages:
    - name: raw
      manifest:
        path: ./raw
    - name: loki
      chart:
        repoUrl: https://grafana.github.io/helm-charts
        name: loki
        version: 2.9.1
      images:
        - grafana/loki:2.9.1
---
metadata:
  name: second
---
"#;
        let sets = PackageSet::from_yaml_documents(yaml).unwrap();
        assert_eq!(sets.len(), 2);

        let demo = &sets[0];
        assert_eq!(demo.name(), "demo");
        assert_eq!(demo.packages().len(), 2);
        assert_eq!(demo.packages()[0].identify(), PackageKind::Manifest);

        let loki = demo.get("loki").unwrap();
        assert_eq!(loki.chart.repo_url, "https://grafana.github.io/helm-charts");
        assert_eq!(loki.images, vec!["grafana/loki:2.9.1".to_string()]);

        assert_eq!(sets[1].kind, KIND);
        assert!(sets[1].packages().is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let set = PackageSet::new("demo", vec![PackageSpec::manifest("raw", "./raw")]);
        let data = set.to_json().unwrap();
        assert_eq!(PackageSet::from_json(&data).unwrap(), set);

        let json: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(json["spec"]["packages"][0]["manifest"]["path"], "./raw");
        assert!(json["spec"]["packages"][0].get("chart").is_none());
    }

    #[test]
    fn test_validate() {
        assert!(PackageSet::new("demo", vec![PackageSpec::manifest("raw", "./raw")])
            .validate()
            .is_ok());

        let reserved = PackageSet::new("demo", vec![PackageSpec::manifest("kevi-demo", "./x")]);
        assert!(matches!(
            reserved.validate(),
            Err(CoreError::ReservedName { .. })
        ));

        let dup = PackageSet::new(
            "demo",
            vec![
                PackageSpec::manifest("raw", "./a"),
                PackageSpec::manifest("raw", "./b"),
            ],
        );
        assert!(dup.validate().is_err());

        assert!(PackageSet::new("", vec![]).validate().is_err());

        let bad = PackageSet::new(
            "demo",
            vec![
                PackageSpec::manifest("good", "./a"),
                PackageSpec::manifest("Bad", "./b"),
            ],
        );
        assert!(matches!(
            bad.validate(),
            Err(CoreError::InvalidReference { .. })
        ));
        assert!(matches!(
            PackageSet::new("Demo Set", vec![]).validate(),
            Err(CoreError::InvalidReference { .. })
        ));
    }
}
