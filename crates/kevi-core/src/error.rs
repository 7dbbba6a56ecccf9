//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid package source for '{name}': {message}")]
    InvalidPackageSource { name: String, message: String },

    #[error("Unknown package type for '{name}': set either manifest.path, chart.path or chart.repoUrl")]
    UnknownPackageType { name: String },

    #[error("Package name '{name}' uses the reserved prefix '{prefix}-'")]
    ReservedName { name: String, prefix: String },

    #[error("Invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Invalid digest '{digest}'")]
    InvalidDigest { digest: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_reference(reference: &str, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
