//! Copying a whole store to another registry host

use kevi_core::{Descriptor, ImagePointer, MediaType, Reference};
use tracing::{debug, info};

use crate::error::{RepoError, Result};
use crate::registry::{Layer, Registry, RemoteArtifact};
use crate::store::{IndexEntry, Store};

/// Push every store entry to `registry`, relocating each reference onto its host
///
/// Entries are visited in reference order and the first failure aborts the
/// walk. Image entries are mirrored from their source registry; everything
/// else is pushed from local blobs and the returned digest must match.
pub async fn copy_all(store: &Store, registry: &dyn Registry) -> Result<Vec<Descriptor>> {
    let host = registry.hostname();
    let entries = store.entries();
    info!(references = entries.len(), registry = host, "relocating store");

    let mut copied = Vec::with_capacity(entries.len());
    for (reference, entry) in entries {
        let target = Reference::parse(&reference)?.relocated(host)?;
        let descriptor = copy_entry(store, registry, &reference, &entry, &target).await?;
        debug!(from = %reference, to = %target, digest = %descriptor.digest, "copied");
        copied.push(descriptor);
    }

    info!(copied = copied.len(), registry = host, "relocation complete");
    Ok(copied)
}

async fn copy_entry(
    store: &Store,
    registry: &dyn Registry,
    reference: &str,
    entry: &IndexEntry,
    target: &Reference,
) -> Result<Descriptor> {
    if entry.descriptor.kind() == MediaType::ImageLayer {
        let pointer = ImagePointer::from_bytes(&store.read_blob(&entry.descriptor)?)?;
        return registry.mirror(&pointer.parse_reference()?, target).await;
    }

    let layer = Layer {
        descriptor: entry.descriptor.clone(),
        data: store.read_blob(&entry.descriptor)?,
    };
    let config = match &entry.config {
        Some(config) => Some(Layer {
            descriptor: config.clone(),
            data: store.read_blob(config)?,
        }),
        None => None,
    };

    let pushed = registry.push(target, &RemoteArtifact { layer, config }).await?;
    if pushed.digest != entry.descriptor.digest {
        return Err(RepoError::Integrity {
            reference: reference.to_string(),
            expected: entry.descriptor.digest.to_string(),
            actual: pushed.digest.to_string(),
        });
    }
    Ok(pushed)
}
