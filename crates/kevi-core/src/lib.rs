//! Kevi Core - Value types shared by every Kevi crate
//!
//! This crate provides:
//! - `Descriptor` / `Digest`: content descriptors keyed by SHA-256
//! - `MediaType`: the closed media-type taxonomy
//! - `Reference`: parsing, normalization and registry relocation
//! - `PackageSpec` / `PackageSet`: package identities and package-sets
//! - `Artifact`: entries ready for ingestion into a store
//! - `MemFs` and archive helpers for source trees

pub mod archive;
pub mod artifact;
pub mod descriptor;
pub mod error;
pub mod fs;
pub mod media;
pub mod package;
pub mod reference;

pub use archive::{archive_dir_to, is_compressed_archive, tgz_dir, tgz_fs, tgz_fs_with_prefix, untgz};
pub use artifact::{Artifact, ArtifactConfig, ImagePointer};
pub use descriptor::{ANNOTATION_REF_NAME, ANNOTATION_TITLE, Descriptor, Digest};
pub use error::{CoreError, Result};
pub use fs::MemFs;
pub use media::MediaType;
pub use package::{
    ChartSource, DEFAULT_REPOSITORY_NAMESPACE, ManifestSource, PACKAGE_SET_PREFIX, PackageKind,
    PackageSet, PackageSpec, package_reference, package_set_reference,
};
pub use reference::{Qualifier, Reference, relocate, validate_registry};
