//! Manifest builds from kustomize-style source trees
//!
//! The builder understands the subset of a kustomization that package sources
//! rely on: `resources` (files or directories with their own kustomization),
//! `namespace`, `commonLabels` and `commonAnnotations`. Any other field is
//! rejected rather than silently ignored.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

use kevi_core::MemFs;
use kevi_core::fs::join;

use crate::error::{EngineError, Result};
use crate::images::split_documents;
use crate::lock::with_manifest_build_lock;

/// File names recognized as a kustomization, in lookup order
pub const KUSTOMIZATION_FILES: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];

pub const KUSTOMIZATION_API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";
pub const KUSTOMIZATION_KIND: &str = "Kustomization";

/// Kinds that never receive the kustomization namespace
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "PersistentVolume",
    "StorageClass",
    "PriorityClass",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_annotations: BTreeMap<String, String>,

    #[serde(flatten, skip_serializing)]
    unsupported: BTreeMap<String, serde_yaml::Value>,
}

impl Kustomization {
    pub fn with_resources(resources: Vec<String>) -> Self {
        Self {
            api_version: KUSTOMIZATION_API_VERSION.to_string(),
            kind: KUSTOMIZATION_KIND.to_string(),
            resources,
            ..Default::default()
        }
    }
}

/// Manifest renderer collaborator: turns a source tree with a root
/// kustomization into one multi-document YAML stream
pub trait ManifestRenderer: Send + Sync {
    fn build(&self, fs: &MemFs) -> Result<Vec<u8>>;
}

/// Built-in manifest renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceBuilder;

impl ResourceBuilder {
    pub fn new() -> Self {
        Self
    }

    fn build_dir(
        &self,
        fs: &MemFs,
        dir: &str,
        stack: &mut Vec<String>,
    ) -> Result<Vec<serde_yaml::Value>> {
        if stack.iter().any(|d| d == dir) {
            return Err(EngineError::render(
                dir,
                format!("kustomization cycle: {} -> {}", stack.join(" -> "), dir),
            ));
        }

        let file = find_kustomization(fs, dir).ok_or_else(|| {
            EngineError::render(
                display_dir(dir),
                "directory has no kustomization.yaml, kustomization.yml or Kustomization",
            )
        })?;
        let kustomization: Kustomization = serde_yaml::from_slice(fs.read_file(&file)?)
            .map_err(|e| EngineError::render(&file, e))?;
        if let Some(feature) = kustomization.unsupported.keys().next() {
            return Err(EngineError::Unsupported {
                source_name: file,
                feature: feature.clone(),
            });
        }

        stack.push(dir.to_string());
        let mut objects = Vec::new();
        for resource in &kustomization.resources {
            if resource.contains("://") {
                return Err(EngineError::Unsupported {
                    source_name: file.clone(),
                    feature: format!("remote resource {}", resource),
                });
            }

            let path = join(dir, resource)?;
            if fs.is_dir(&path) {
                objects.extend(self.build_dir(fs, &path, stack)?);
            } else if fs.is_file(&path) {
                objects.extend(parse_resource(fs, &path)?);
            } else {
                return Err(EngineError::render(
                    &file,
                    format!("resource '{}' not found", resource),
                ));
            }
        }
        stack.pop();

        for object in &mut objects {
            apply_transformers(object, &kustomization);
        }
        Ok(objects)
    }
}

impl ManifestRenderer for ResourceBuilder {
    fn build(&self, fs: &MemFs) -> Result<Vec<u8>> {
        let objects = self.build_dir(fs, "", &mut Vec::new())?;

        let mut out = String::new();
        for (i, object) in objects.iter().enumerate() {
            if i > 0 {
                out.push_str("---\n");
            }
            out.push_str(&serde_yaml::to_string(object)?);
        }
        Ok(out.into_bytes())
    }
}

/// Render a source tree, synthesizing a root kustomization if it lacks one
///
/// The renderer runs under the process-wide manifest build lock.
pub fn render_manifests(renderer: &dyn ManifestRenderer, fs: &MemFs) -> Result<Vec<u8>> {
    let fs = ensure_kustomization(fs)?;
    with_manifest_build_lock(|| renderer.build(&fs))
}

/// Return the tree unchanged if it has a root kustomization, otherwise a copy
/// with one listing every `.yaml`/`.yml` file in path order
///
/// Each listed file must parse as YAML.
pub fn ensure_kustomization(fs: &MemFs) -> Result<Cow<'_, MemFs>> {
    if find_kustomization(fs, "").is_some() {
        return Ok(Cow::Borrowed(fs));
    }

    let mut resources = Vec::new();
    for (path, data) in fs.files() {
        if !(path.ends_with(".yaml") || path.ends_with(".yml")) {
            continue;
        }
        parse_documents(path, data)?;
        resources.push(path.to_string());
    }
    tracing::debug!(resources = resources.len(), "synthesized root kustomization");

    let data = serde_yaml::to_string(&Kustomization::with_resources(resources))?;
    let mut synthesized = fs.clone();
    synthesized.write_file(KUSTOMIZATION_FILES[0], data)?;
    Ok(Cow::Owned(synthesized))
}

fn find_kustomization(fs: &MemFs, dir: &str) -> Option<String> {
    KUSTOMIZATION_FILES
        .iter()
        .filter_map(|name| join(dir, name).ok())
        .find(|path| fs.is_file(path))
}

fn parse_resource(fs: &MemFs, path: &str) -> Result<Vec<serde_yaml::Value>> {
    parse_documents(path, fs.read_file(path)?)
}

fn parse_documents(path: &str, data: &[u8]) -> Result<Vec<serde_yaml::Value>> {
    let text = std::str::from_utf8(data).map_err(|e| EngineError::render(path, e))?;
    let mut objects = Vec::new();
    for doc in split_documents(text) {
        let value: serde_yaml::Value =
            serde_yaml::from_str(doc).map_err(|e| EngineError::render(path, e))?;
        match value {
            serde_yaml::Value::Null => {}
            serde_yaml::Value::Mapping(_) => objects.push(value),
            _ => {
                return Err(EngineError::render(path, "document is not a mapping"));
            }
        }
    }
    Ok(objects)
}

fn apply_transformers(object: &mut serde_yaml::Value, kustomization: &Kustomization) {
    let kind = object
        .get("kind")
        .and_then(serde_yaml::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let Some(metadata) = ensure_mapping(object, "metadata") else {
        return;
    };

    if let Some(namespace) = &kustomization.namespace {
        if !CLUSTER_SCOPED_KINDS.contains(&kind.as_str()) {
            metadata.insert("namespace".into(), namespace.clone().into());
        }
    }
    if !kustomization.common_labels.is_empty() {
        if let Some(labels) = ensure_mapping_in(metadata, "labels") {
            for (k, v) in &kustomization.common_labels {
                labels.insert(k.clone().into(), v.clone().into());
            }
        }
    }
    if !kustomization.common_annotations.is_empty() {
        if let Some(annotations) = ensure_mapping_in(metadata, "annotations") {
            for (k, v) in &kustomization.common_annotations {
                annotations.insert(k.clone().into(), v.clone().into());
            }
        }
    }
}

fn ensure_mapping<'a>(value: &'a mut serde_yaml::Value, key: &str) -> Option<&'a mut serde_yaml::Mapping> {
    ensure_mapping_in(value.as_mapping_mut()?, key)
}

fn ensure_mapping_in<'a>(
    map: &'a mut serde_yaml::Mapping,
    key: &str,
) -> Option<&'a mut serde_yaml::Mapping> {
    if !map.get(key).is_some_and(serde_yaml::Value::is_mapping) {
        map.insert(key.into(), serde_yaml::Mapping::new().into());
    }
    map.get_mut(key)?.as_mapping_mut()
}

fn display_dir(dir: &str) -> &str {
    if dir.is_empty() { "." } else { dir }
}
