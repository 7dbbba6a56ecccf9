//! Registry transport
//!
//! The engine treats a registry as a reference-addressed blob mover. Every
//! reference handed to a transport already carries the transport's host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use kevi_core::{ANNOTATION_REF_NAME, Descriptor, Digest, ImagePointer, MediaType, Reference};

use crate::error::{RepoError, Result};

/// Connection options for a registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryOptions {
    /// Talk plain HTTP instead of HTTPS
    #[serde(default)]
    pub plain_http: bool,

    /// Accept invalid TLS certificates
    #[serde(default)]
    pub insecure: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Never serialized
    #[serde(skip)]
    pub password: Option<String>,
}

impl RegistryOptions {
    pub fn scheme(&self) -> &'static str {
        if self.plain_http { "http" } else { "https" }
    }
}

/// A blob together with its descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub descriptor: Descriptor,
    pub data: Vec<u8>,
}

impl Layer {
    pub fn new(data: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor::from_bytes(&data, media_type),
            data,
        }
    }

    /// Check the bytes against the descriptor's digest
    pub fn verify(&self, reference: &str) -> Result<()> {
        let actual = Digest::of(&self.data);
        if actual != self.descriptor.digest {
            return Err(RepoError::Integrity {
                reference: reference.to_string(),
                expected: self.descriptor.digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

/// What gets pushed under one reference: a single layer and optional config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    pub layer: Layer,
    pub config: Option<Layer>,
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Registry host, `name[:port]`
    fn hostname(&self) -> &str;

    /// Repository names, also used as a connectivity probe
    async fn catalog(&self) -> Result<Vec<String>>;

    /// Push an artifact; returns the layer descriptor as the registry holds it
    async fn push(&self, reference: &Reference, artifact: &RemoteArtifact) -> Result<Descriptor>;

    /// Pull only the layers whose media type is in `media_types`
    async fn pull(&self, reference: &Reference, media_types: &[MediaType]) -> Result<Vec<Layer>>;

    /// Copy a container image from its source registry to `target`
    async fn mirror(&self, source: &Reference, target: &Reference) -> Result<Descriptor>;
}

#[derive(Debug, Default)]
struct MemoryState {
    artifacts: BTreeMap<String, Vec<Layer>>,
    failing: Vec<String>,
    corrupt: bool,
    pushes: Vec<String>,
}

/// In-process registry for tests and dry runs
///
/// Can be told to fail pushes for matching references or to corrupt pushed
/// content, to exercise failure handling without a network.
#[derive(Debug)]
pub struct MemoryRegistry {
    hostname: String,
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every push whose reference contains `pattern`
    pub fn fail_pushes_matching(&self, pattern: impl Into<String>) {
        self.state().failing.push(pattern.into());
    }

    /// Store altered bytes for every subsequent push
    pub fn corrupt_pushes(&self) {
        self.state().corrupt = true;
    }

    /// Seed an artifact directly
    pub fn insert(&self, reference: &Reference, layers: Vec<Layer>) {
        self.state().artifacts.insert(reference.to_string(), layers);
    }

    pub fn references(&self) -> Vec<String> {
        self.state().artifacts.keys().cloned().collect()
    }

    pub fn layers(&self, reference: &str) -> Option<Vec<Layer>> {
        self.state().artifacts.get(reference).cloned()
    }

    /// References of successful pushes, in order
    pub fn pushes(&self) -> Vec<String> {
        self.state().pushes.clone()
    }

    fn check_host(&self, reference: &Reference) -> Result<()> {
        if reference.registry() != self.hostname {
            return Err(RepoError::registry(
                &self.hostname,
                format!("reference {} belongs to another registry", reference),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn catalog(&self) -> Result<Vec<String>> {
        let repositories: BTreeSet<String> = self
            .state()
            .artifacts
            .keys()
            .filter_map(|r| Reference::parse(r).ok())
            .map(|r| r.repository().to_string())
            .collect();
        Ok(repositories.into_iter().collect())
    }

    async fn push(&self, reference: &Reference, artifact: &RemoteArtifact) -> Result<Descriptor> {
        self.check_host(reference)?;
        let key = reference.to_string();
        let mut state = self.state();

        if state.failing.iter().any(|p| key.contains(p.as_str())) {
            return Err(RepoError::registry(&self.hostname, format!("push of {} refused", key)));
        }

        let mut layer = artifact.layer.clone();
        if state.corrupt {
            layer.data.push(b'!');
            layer.descriptor = Descriptor::from_bytes(&layer.data, layer.descriptor.media_type.clone());
        }
        let descriptor = layer.descriptor.clone().with_annotation(ANNOTATION_REF_NAME, &key);

        let mut layers = vec![layer];
        layers.extend(artifact.config.clone());
        state.artifacts.insert(key.clone(), layers);
        state.pushes.push(key);
        Ok(descriptor)
    }

    async fn pull(&self, reference: &Reference, media_types: &[MediaType]) -> Result<Vec<Layer>> {
        self.check_host(reference)?;
        let key = reference.to_string();
        let layers = self
            .state()
            .artifacts
            .get(&key)
            .cloned()
            .ok_or_else(|| RepoError::ReferenceNotFound {
                reference: key.clone(),
            })?;

        Ok(layers
            .into_iter()
            .filter(|l| media_types.contains(&l.descriptor.kind()))
            .collect())
    }

    async fn mirror(&self, source: &Reference, target: &Reference) -> Result<Descriptor> {
        let layer = Layer::new(ImagePointer::new(source).to_bytes()?, MediaType::ImageLayer.as_str());
        self.push(
            target,
            &RemoteArtifact {
                layer,
                config: None,
            },
        )
        .await
    }
}
