//! Artifacts ready for ingestion into a store

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::error::Result;
use crate::media::MediaType;
use crate::reference::Reference;

/// Optional config blob attached to an artifact's layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactConfig {
    pub media_type: MediaType,
    pub data: Vec<u8>,
}

/// One entry of a package's contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Bytes held in memory: a source archive or a serialized package-set
    Blob {
        media_type: MediaType,
        data: Vec<u8>,
        config: Option<ArtifactConfig>,
    },
    /// A container image, described by reference only; nothing is pulled
    Image(Reference),
}

impl Artifact {
    pub fn blob(media_type: MediaType, data: impl Into<Vec<u8>>) -> Self {
        Self::Blob {
            media_type,
            data: data.into(),
            config: None,
        }
    }

    pub fn with_config(self, media_type: MediaType, data: impl Into<Vec<u8>>) -> Self {
        match self {
            Self::Blob {
                media_type: layer,
                data: layer_data,
                ..
            } => Self::Blob {
                media_type: layer,
                data: layer_data,
                config: Some(ArtifactConfig {
                    media_type,
                    data: data.into(),
                }),
            },
            image => image,
        }
    }

    pub fn image(reference: Reference) -> Self {
        Self::Image(reference)
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Blob { media_type, .. } => *media_type,
            Self::Image(_) => MediaType::ImageLayer,
        }
    }

    /// Layer bytes as stored; images become a pointer document
    pub fn data(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Blob { data, .. } => Ok(Cow::Borrowed(data.as_slice())),
            Self::Image(reference) => Ok(Cow::Owned(ImagePointer::new(reference).to_bytes()?)),
        }
    }

    pub fn config(&self) -> Option<&ArtifactConfig> {
        match self {
            Self::Blob { config, .. } => config.as_ref(),
            Self::Image(_) => None,
        }
    }
}

/// Stored body of an image artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePointer {
    pub reference: String,
}

impl ImagePointer {
    pub fn new(reference: &Reference) -> Self {
        Self {
            reference: reference.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn parse_reference(&self) -> Result<Reference> {
        Reference::parse(&self.reference)
    }
}
