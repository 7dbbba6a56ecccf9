//! OCI registry transport
//!
//! Push, pull and image mirroring through `oci-distribution`. The catalog
//! probe goes straight to `/v2/_catalog`, which the client does not expose.

use async_trait::async_trait;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol, Config, ImageLayer};
use oci_distribution::manifest::{
    IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE, IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
    IMAGE_LAYER_GZIP_MEDIA_TYPE, IMAGE_LAYER_MEDIA_TYPE, OciDescriptor,
};
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;

use kevi_core::media::EMPTY_CONFIG;
use kevi_core::{ANNOTATION_REF_NAME, Descriptor, Digest, MediaType, Qualifier, Reference, validate_registry};

use crate::error::{RepoError, Result};
use crate::registry::{Layer, Registry, RegistryOptions, RemoteArtifact};

/// Layer media types accepted when mirroring container images
const IMAGE_LAYER_MEDIA_TYPES: &[&str] = &[
    IMAGE_LAYER_MEDIA_TYPE,
    IMAGE_LAYER_GZIP_MEDIA_TYPE,
    IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
    IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE,
];

const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    repositories: Vec<String>,
}

/// A remote OCI registry
pub struct OciRegistry {
    hostname: String,
    options: RegistryOptions,
    client: Client,
    auth: RegistryAuth,
    http: reqwest::Client,
}

impl OciRegistry {
    pub fn new(hostname: &str, options: RegistryOptions) -> Result<Self> {
        validate_registry(hostname)?;

        let client = Client::new(ClientConfig {
            protocol: client_protocol(hostname, &options),
            accept_invalid_certificates: options.insecure,
            ..Default::default()
        });

        let auth = match (&options.username, &options.password) {
            (Some(user), Some(pass)) => RegistryAuth::Basic(user.clone(), pass.clone()),
            _ => RegistryAuth::Anonymous,
        };

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(options.insecure)
            .build()?;

        Ok(Self {
            hostname: hostname.to_string(),
            options,
            client,
            auth,
            http,
        })
    }

    fn err(&self, err: impl ToString) -> RepoError {
        RepoError::registry(&self.hostname, err)
    }

    async fn remote_layers(&self, reference: &oci_distribution::Reference) -> Result<Vec<OciDescriptor>> {
        let (manifest, _) = self
            .client
            .pull_image_manifest(reference, &self.auth)
            .await
            .map_err(|e| self.err(format!("manifest of {}: {}", reference, e)))?;
        Ok(manifest.layers)
    }
}

/// Plain HTTP only ever applies to the target host; mirrored images are
/// pulled from their source registries over HTTPS.
fn client_protocol(hostname: &str, options: &RegistryOptions) -> ClientProtocol {
    if options.plain_http {
        ClientProtocol::HttpsExcept(vec![hostname.to_string()])
    } else {
        ClientProtocol::Https
    }
}

/// Convert without re-parsing, so dotless hosts stay hosts
fn to_oci(reference: &Reference) -> oci_distribution::Reference {
    let registry = reference.registry().to_string();
    let repository = reference.repository().to_string();
    match reference.qualifier() {
        Qualifier::Tag(tag) => oci_distribution::Reference::with_tag(registry, repository, tag.clone()),
        Qualifier::Digest(digest) => {
            oci_distribution::Reference::with_digest(registry, repository, digest.to_string())
        }
    }
}

fn to_descriptor(layer: &OciDescriptor) -> Result<Descriptor> {
    Ok(Descriptor {
        media_type: layer.media_type.clone(),
        digest: Digest::parse(&layer.digest)?,
        size: layer.size,
        annotations: layer
            .annotations
            .clone()
            .map(|a| a.into_iter().collect())
            .unwrap_or_default(),
    })
}

/// The destination manifest must carry exactly the layers that were pulled
fn verify_layers(target: &Reference, expected: &[Digest], layers: &[OciDescriptor]) -> Result<()> {
    if layers.len() != expected.len() {
        return Err(RepoError::Integrity {
            reference: target.to_string(),
            expected: format!("{} layers", expected.len()),
            actual: format!("{} layers", layers.len()),
        });
    }
    for (want, got) in expected.iter().zip(layers) {
        if want.to_string() != got.digest {
            return Err(RepoError::Integrity {
                reference: target.to_string(),
                expected: want.to_string(),
                actual: got.digest.clone(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl Registry for OciRegistry {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn catalog(&self) -> Result<Vec<String>> {
        let url = format!("{}://{}/v2/_catalog", self.options.scheme(), self.hostname);
        let mut request = self.http.get(&url);
        if let Some(user) = &self.options.username {
            request = request.basic_auth(user, self.options.password.as_ref());
        }

        let response = request.send().await?.error_for_status()?;
        let catalog: Catalog = response.json().await?;
        Ok(catalog.repositories)
    }

    async fn push(&self, reference: &Reference, artifact: &RemoteArtifact) -> Result<Descriptor> {
        let target = to_oci(reference);

        let layers = vec![ImageLayer {
            data: artifact.layer.data.clone(),
            media_type: artifact.layer.descriptor.media_type.clone(),
            annotations: None,
        }];
        let config = match &artifact.config {
            Some(config) => Config {
                data: config.data.clone(),
                media_type: config.descriptor.media_type.clone(),
                annotations: None,
            },
            None => Config {
                data: b"{}".to_vec(),
                media_type: EMPTY_CONFIG.to_string(),
                annotations: None,
            },
        };

        self.client
            .push(&target, &layers, config, &self.auth, None)
            .await
            .map_err(|e| self.err(format!("push of {}: {}", reference, e)))?;

        let remote = self.remote_layers(&target).await?;
        let layer = remote
            .first()
            .ok_or_else(|| self.err(format!("{} has no layers after push", reference)))?;
        Ok(to_descriptor(layer)?.with_annotation(ANNOTATION_REF_NAME, reference.to_string()))
    }

    async fn pull(&self, reference: &Reference, media_types: &[MediaType]) -> Result<Vec<Layer>> {
        let source = to_oci(reference);

        let mut layers = Vec::new();
        for remote in self.remote_layers(&source).await? {
            let descriptor = to_descriptor(&remote)?;
            if !media_types.contains(&descriptor.kind()) {
                continue;
            }

            let mut data = Vec::with_capacity(remote.size.max(0) as usize);
            self.client
                .pull_blob(&source, &remote, &mut data)
                .await
                .map_err(|e| self.err(format!("blob {} of {}: {}", remote.digest, reference, e)))?;
            layers.push(Layer { descriptor, data });
        }

        tracing::debug!(reference = %reference, layers = layers.len(), "pulled");
        Ok(layers)
    }

    async fn mirror(&self, source: &Reference, target: &Reference) -> Result<Descriptor> {
        let src = to_oci(source);
        let dst = to_oci(target);

        let image = self
            .client
            .pull(&src, &RegistryAuth::Anonymous, IMAGE_LAYER_MEDIA_TYPES.to_vec())
            .await
            .map_err(|e| self.err(format!("pull of {}: {}", source, e)))?;
        let expected: Vec<Digest> = image.layers.iter().map(|l| Digest::of(&l.data)).collect();

        self.client
            .push(&dst, &image.layers, image.config, &self.auth, image.manifest)
            .await
            .map_err(|e| self.err(format!("push of {}: {}", target, e)))?;

        let (manifest, digest) = self
            .client
            .pull_image_manifest(&dst, &self.auth)
            .await
            .map_err(|e| self.err(format!("manifest of {}: {}", target, e)))?;
        verify_layers(target, &expected, &manifest.layers)?;

        let size = serde_json::to_vec(&manifest)?.len() as i64;
        Ok(Descriptor {
            media_type: manifest
                .media_type
                .clone()
                .unwrap_or_else(|| OCI_MANIFEST_MEDIA_TYPE.to_string()),
            digest: Digest::parse(&digest)?,
            size,
            annotations: Default::default(),
        }
        .with_annotation(ANNOTATION_REF_NAME, target.to_string()))
    }
}
