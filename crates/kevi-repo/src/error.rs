//! Error types for store, registry and chart repository operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Store Errors ============
    #[error("Failed to write to store at {path}: {message}")]
    StoreWrite { path: String, message: String },

    #[error("Reference not found: {reference}")]
    ReferenceNotFound { reference: String },

    #[error("Blob not found: {digest}")]
    BlobNotFound { digest: String },

    #[error("Store index at {path} is corrupt: {message}")]
    IndexCorrupt { path: String, message: String },

    #[error("Integrity check failed for {reference}: expected {expected}, got {actual}")]
    Integrity {
        reference: String,
        expected: String,
        actual: String,
    },

    // ============ Registry Errors ============
    #[error("Registry error ({registry}): {message}")]
    Registry { registry: String, message: String },

    // ============ Chart Repository Errors ============
    #[error("Chart not found: {name} in repository {repo}")]
    ChartNotFound { name: String, repo: String },

    #[error("Version not found: {name}@{version} in repository {repo}")]
    VersionNotFound {
        name: String,
        version: String,
        repo: String,
    },

    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    // ============ Configuration Errors ============
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error(transparent)]
    Core(#[from] kevi_core::CoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Absence, as opposed to corruption or transport failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ReferenceNotFound { .. }
                | Self::BlobNotFound { .. }
                | Self::ChartNotFound { .. }
                | Self::VersionNotFound { .. }
        )
    }

    pub(crate) fn registry(registry: &str, message: impl ToString) -> Self {
        Self::Registry {
            registry: registry.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RepoError>;

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RepoError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => RepoError::Network {
                message: e.to_string(),
            },
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}
