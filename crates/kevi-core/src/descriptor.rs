//! Content descriptors
//!
//! A [`Descriptor`] identifies an artifact without carrying its bytes. Two
//! descriptors with the same [`Digest`] always refer to identical content.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, Result};
use crate::media::MediaType;

/// OCI annotation holding the reference an artifact was stored under
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// OCI annotation holding a human readable title
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";

/// SHA-256 content digest, rendered as `sha256:<hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    hex: String,
}

impl Digest {
    pub const ALGORITHM: &'static str = "sha256";

    /// Compute the digest of some content
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self {
            hex: hex::encode(hasher.finalize()),
        }
    }

    /// Parse a `sha256:<64 hex>` string
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidDigest {
            digest: s.to_string(),
        };

        let (algorithm, encoded) = s.split_once(':').ok_or_else(invalid)?;
        if algorithm != Self::ALGORITHM
            || encoded.len() != 64
            || !encoded.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(invalid());
        }

        Ok(Self {
            hex: encoded.to_string(),
        })
    }

    /// Hex-encoded hash without the algorithm prefix
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Check that `data` hashes to this digest
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::of(data) == *self
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Self::ALGORITHM, self.hex)
    }
}

impl TryFrom<String> for Digest {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

/// Content descriptor: digest, size, media type and annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    /// Describe a blob
    pub fn from_bytes(data: &[u8], media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            digest: Digest::of(data),
            size: data.len() as i64,
            annotations: BTreeMap::new(),
        }
    }

    /// Media type mapped onto the engine taxonomy
    pub fn kind(&self) -> MediaType {
        MediaType::parse(&self.media_type)
    }

    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Reference this descriptor was recorded under, if annotated
    pub fn ref_name(&self) -> Option<&str> {
        self.annotations.get(ANNOTATION_REF_NAME).map(String::as_str)
    }
}
