//! Content-addressable store
//!
//! Layout of a store root:
//!
//! ```text
//! <root>/
//!   index.json           reference -> descriptor index
//!   blobs/sha256/<hex>   blob content, named by digest
//! ```
//!
//! Blobs are append-only and written once per digest. The index is rewritten
//! through a temporary file and a rename, so readers never see a torn index.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use kevi_core::{
    ANNOTATION_REF_NAME, Artifact, Descriptor, Digest, MediaType, PackageSet, Reference,
    archive_dir_to,
};

use crate::error::{RepoError, Result};

pub const INDEX_FILE: &str = "index.json";
const BLOBS_DIR: &str = "blobs/sha256";
const INDEX_SCHEMA_VERSION: u32 = 1;

/// What a reference points at: one layer blob and an optional config blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub descriptor: Descriptor,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,
}

impl IndexEntry {
    pub fn new(descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            config: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexFile {
    #[serde(default)]
    schema_version: u32,

    #[serde(default)]
    references: BTreeMap<String, IndexEntry>,
}

#[derive(Debug)]
enum Backend {
    Dir(PathBuf),
    Memory(HashMap<Digest, Vec<u8>>),
}

/// Local store of blobs keyed by digest, plus a reference index
#[derive(Debug)]
pub struct Store {
    backend: Backend,
    index: BTreeMap<String, IndexEntry>,
}

impl Store {
    /// Open a store root, initializing it if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let blobs = root.join(BLOBS_DIR);
        std::fs::create_dir_all(&blobs).map_err(|e| store_write(&blobs, e))?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            let data = std::fs::read(&index_path)?;
            let file: IndexFile =
                serde_json::from_slice(&data).map_err(|e| RepoError::IndexCorrupt {
                    path: index_path.display().to_string(),
                    message: e.to_string(),
                })?;
            file.references
        } else {
            BTreeMap::new()
        };

        tracing::debug!(root = %root.display(), references = index.len(), "opened store");
        Ok(Self {
            backend: Backend::Dir(root),
            index,
        })
    }

    /// Ephemeral store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(HashMap::new()),
            index: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Dir(root) => Some(root),
            Backend::Memory(_) => None,
        }
    }

    /// Store `content` and index it under `reference`
    ///
    /// Writing a blob that already exists is a no-op.
    pub fn add(&mut self, content: &[u8], media_type: MediaType, reference: &str) -> Result<Descriptor> {
        self.add_artifact(reference, &Artifact::blob(media_type, content))
    }

    /// Store an artifact's layer (and config, if any) under `reference`
    pub fn add_artifact(&mut self, reference: &str, artifact: &Artifact) -> Result<Descriptor> {
        let entry = self.stage(reference, artifact)?;
        let descriptor = entry.descriptor.clone();
        self.commit(vec![(reference.to_string(), entry)])?;
        Ok(descriptor)
    }

    /// Store a collection of artifacts, all or nothing
    ///
    /// Blobs for every member are written first; the index only changes once
    /// all of them succeeded, so a failing member leaves none of the
    /// collection's references behind.
    pub fn add_collection(
        &mut self,
        name: &str,
        artifacts: &BTreeMap<String, Artifact>,
    ) -> Result<Vec<Descriptor>> {
        self.add_collections([(name, artifacts)])
    }

    /// Store several collections under a single index update
    ///
    /// Either every reference of every collection ends up indexed, or none
    /// of them does.
    pub fn add_collections<'a, I>(&mut self, collections: I) -> Result<Vec<Descriptor>>
    where
        I: IntoIterator<Item = (&'a str, &'a BTreeMap<String, Artifact>)>,
    {
        let mut staged = Vec::new();
        let mut names = Vec::new();
        for (name, artifacts) in collections {
            for (reference, artifact) in artifacts {
                staged.push((reference.clone(), self.stage(reference, artifact)?));
            }
            names.push((name, artifacts.len()));
        }

        let descriptors = staged.iter().map(|(_, e)| e.descriptor.clone()).collect();
        self.commit(staged)?;
        for (name, count) in names {
            tracing::debug!(collection = name, artifacts = count, "added collection");
        }
        Ok(descriptors)
    }

    /// Write a blob without indexing it
    pub fn put_blob(&mut self, content: &[u8], media_type: &str) -> Result<Descriptor> {
        let descriptor = Descriptor::from_bytes(content, media_type);
        match &mut self.backend {
            Backend::Memory(blobs) => {
                blobs
                    .entry(descriptor.digest.clone())
                    .or_insert_with(|| content.to_vec());
            }
            Backend::Dir(root) => {
                let path = root.join(BLOBS_DIR).join(descriptor.digest.hex());
                if !path.exists() {
                    write_atomic(&path, content)?;
                    tracing::debug!(digest = %descriptor.digest, size = descriptor.size, "wrote blob");
                }
            }
        }
        Ok(descriptor)
    }

    /// Point `reference` at already stored blobs
    pub fn tag(&mut self, reference: &str, entry: IndexEntry) -> Result<()> {
        validate_reference(reference)?;
        for desc in std::iter::once(&entry.descriptor).chain(entry.config.as_ref()) {
            if !self.contains_blob(&desc.digest) {
                return Err(RepoError::BlobNotFound {
                    digest: desc.digest.to_string(),
                });
            }
        }
        let mut entry = entry;
        entry.descriptor = entry
            .descriptor
            .with_annotation(ANNOTATION_REF_NAME, reference);
        self.commit(vec![(reference.to_string(), entry)])
    }

    pub fn resolve(&self, reference: &str) -> Result<Descriptor> {
        self.entry(reference).map(|e| e.descriptor.clone())
    }

    pub fn entry(&self, reference: &str) -> Result<&IndexEntry> {
        self.index
            .get(reference)
            .ok_or_else(|| RepoError::ReferenceNotFound {
                reference: reference.to_string(),
            })
    }

    /// Open a blob for reading
    pub fn fetch(&self, descriptor: &Descriptor) -> Result<Box<dyn Read + Send>> {
        let not_found = || RepoError::BlobNotFound {
            digest: descriptor.digest.to_string(),
        };
        match &self.backend {
            Backend::Memory(blobs) => {
                let data = blobs.get(&descriptor.digest).ok_or_else(not_found)?;
                Ok(Box::new(Cursor::new(data.clone())))
            }
            Backend::Dir(root) => {
                let path = root.join(BLOBS_DIR).join(descriptor.digest.hex());
                match File::open(&path) {
                    Ok(file) => Ok(Box::new(file)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Read a whole blob, checking it against its digest
    pub fn read_blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(descriptor.size.max(0) as usize);
        self.fetch(descriptor)?.read_to_end(&mut data)?;

        let actual = Digest::of(&data);
        if actual != descriptor.digest {
            return Err(RepoError::Integrity {
                reference: descriptor
                    .ref_name()
                    .unwrap_or(descriptor.digest.hex())
                    .to_string(),
                expected: descriptor.digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(data)
    }

    pub fn contains_blob(&self, digest: &Digest) -> bool {
        match &self.backend {
            Backend::Memory(blobs) => blobs.contains_key(digest),
            Backend::Dir(root) => root.join(BLOBS_DIR).join(digest.hex()).exists(),
        }
    }

    /// Number of distinct blobs held
    pub fn blob_count(&self) -> Result<usize> {
        match &self.backend {
            Backend::Memory(blobs) => Ok(blobs.len()),
            Backend::Dir(root) => Ok(std::fs::read_dir(root.join(BLOBS_DIR))?
                .filter_map(|e| e.ok())
                .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
                .count()),
        }
    }

    /// Visit every index entry in reference order, stopping at the first error
    pub fn walk<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &Descriptor) -> Result<()>,
    {
        for (reference, entry) in &self.index {
            visit(reference, &entry.descriptor)?;
        }
        Ok(())
    }

    /// Snapshot of the index in walk order
    pub fn entries(&self) -> Vec<(String, IndexEntry)> {
        self.index
            .iter()
            .map(|(r, e)| (r.clone(), e.clone()))
            .collect()
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Package-set artifacts, recognized by media type
    pub fn package_sets(&self) -> Vec<(String, Descriptor)> {
        self.index
            .iter()
            .filter(|(_, e)| e.descriptor.kind() == MediaType::PackageSetLayer)
            .map(|(r, e)| (r.clone(), e.descriptor.clone()))
            .collect()
    }

    /// Deserialize the package-set stored under `reference`
    pub fn load_package_set(&self, reference: &str) -> Result<PackageSet> {
        let descriptor = self.resolve(reference)?;
        if descriptor.kind() != MediaType::PackageSetLayer {
            return Err(RepoError::ReferenceNotFound {
                reference: format!("{} (not a package-set)", reference),
            });
        }
        Ok(PackageSet::from_json(&self.read_blob(&descriptor)?)?)
    }

    /// Write the whole store root as one `.tar.gz`
    pub fn archive(&self, output: &Path) -> Result<PathBuf> {
        match &self.backend {
            Backend::Dir(root) => Ok(archive_dir_to(root, output)?),
            Backend::Memory(_) => Err(RepoError::InvalidConfig {
                message: "an in-memory store cannot be archived".to_string(),
            }),
        }
    }

    fn stage(&mut self, reference: &str, artifact: &Artifact) -> Result<IndexEntry> {
        validate_reference(reference)?;

        let data = artifact.data()?;
        let descriptor = self
            .put_blob(&data, artifact.media_type().as_str())?
            .with_annotation(ANNOTATION_REF_NAME, reference);
        let config = match artifact.config() {
            Some(config) => Some(self.put_blob(&config.data, config.media_type.as_str())?),
            None => None,
        };

        Ok(IndexEntry { descriptor, config })
    }

    fn commit(&mut self, entries: Vec<(String, IndexEntry)>) -> Result<()> {
        let previous = self.index.clone();
        for (reference, entry) in entries {
            tracing::debug!(reference = %reference, digest = %entry.descriptor.digest, "indexed");
            self.index.insert(reference, entry);
        }

        if let Err(e) = self.persist() {
            self.index = previous;
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let Backend::Dir(root) = &self.backend else {
            return Ok(());
        };

        let file = IndexFile {
            schema_version: INDEX_SCHEMA_VERSION,
            references: self.index.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        write_atomic(&root.join(INDEX_FILE), &data)
    }
}

fn validate_reference(reference: &str) -> Result<()> {
    Reference::parse(reference)?;
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, data).map_err(|e| store_write(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| store_write(path, e))
}

fn store_write(path: &Path, err: std::io::Error) -> RepoError {
    RepoError::StoreWrite {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
