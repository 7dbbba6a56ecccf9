//! Media type taxonomy
//!
//! Every artifact the engine writes carries one of these media types. Dispatch
//! on package variant and on fetched content always goes through [`MediaType`];
//! a string that maps to [`MediaType::Unknown`] is never treated as a default.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Raw manifests (kustomize tree) packed as tar+gzip
pub const MANIFEST_LAYER: &str = "application/vnd.kevi.cattle.io.kustomize.layer.tar+gzip";
/// Helm chart content layer
pub const CHART_LAYER: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
/// Helm chart config
pub const CHART_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
/// Container image pointer, mirrored from its source registry on relocation
pub const IMAGE_LAYER: &str = "application/vnd.kevi.cattle.io.image.layer.v1+json";
/// Serialized package-set definition
pub const PACKAGE_SET_LAYER: &str = "application/vnd.kevi.cattle.io.package.layer";
/// Fallback for anything else
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Config media type pushed alongside artifacts that carry no config of their own
pub const EMPTY_CONFIG: &str = "application/vnd.kevi.cattle.io.config.v1+json";

/// Closed set of media types the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaType {
    ManifestLayer,
    ChartLayer,
    ChartConfig,
    ImageLayer,
    PackageSetLayer,
    Unknown,
}

impl MediaType {
    /// Map a media type string onto the taxonomy
    pub fn parse(s: &str) -> Self {
        match s {
            MANIFEST_LAYER => Self::ManifestLayer,
            CHART_LAYER => Self::ChartLayer,
            CHART_CONFIG => Self::ChartConfig,
            IMAGE_LAYER => Self::ImageLayer,
            PACKAGE_SET_LAYER => Self::PackageSetLayer,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManifestLayer => MANIFEST_LAYER,
            Self::ChartLayer => CHART_LAYER,
            Self::ChartConfig => CHART_CONFIG,
            Self::ImageLayer => IMAGE_LAYER,
            Self::PackageSetLayer => PACKAGE_SET_LAYER,
            Self::Unknown => OCTET_STREAM,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MediaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}
