//! CLI error types with exit code handling
//!
//! Library errors are folded into a small set of categories, each with its
//! own exit code.

use miette::Diagnostic;
use thiserror::Error;

use kevi_core::CoreError;
use kevi_engine::EngineError;
use kevi_pack::PackError;
use kevi_repo::RepoError;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid arguments
    #[error("{message}")]
    #[diagnostic(code(kevi::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Manifest or chart rendering failed
    #[error("Render error: {message}")]
    #[diagnostic(code(kevi::cli::render))]
    Render { message: String },

    /// Package definition or package layout problem
    #[error("Package error: {message}")]
    #[diagnostic(code(kevi::cli::pack))]
    Pack {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Not found: {message}")]
    #[diagnostic(code(kevi::cli::not_found))]
    NotFound { message: String },

    /// Stored or transferred content does not match its digest
    #[error("Integrity check failed: {message}")]
    #[diagnostic(
        code(kevi::cli::integrity),
        help("the content was corrupted in storage or in transit; nothing was accepted")
    )]
    Integrity { message: String },

    #[error("Registry error: {message}")]
    #[diagnostic(code(kevi::cli::registry))]
    Registry {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(kevi::cli::io))]
    Io { message: String },

    #[error("{message}")]
    #[diagnostic(code(kevi::cli::error))]
    Other { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Render { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Pack { .. } => exit_codes::PACK_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Integrity { .. } => exit_codes::INTEGRITY_ERROR,
            CliError::Registry { .. } => exit_codes::REGISTRY_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: None,
        }
    }

    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn registry_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::InvalidPackageSource { .. }
            | CoreError::UnknownPackageType { .. }
            | CoreError::ReservedName { .. } => CliError::Pack {
                message,
                help: Some("check the package entries of the package-set file".to_string()),
            },
            CoreError::InvalidReference { .. } | CoreError::InvalidDigest { .. } => {
                CliError::Usage { message, help: None }
            }
            CoreError::FileNotFound { .. } => CliError::NotFound { message },
            CoreError::Io(_) | CoreError::Archive { .. } => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(core) => core.into(),
            other => CliError::Render {
                message: other.to_string(),
            },
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        if err.is_not_found() {
            return CliError::NotFound {
                message: err.to_string(),
            };
        }
        let message = err.to_string();
        match err {
            RepoError::Core(core) => core.into(),
            RepoError::Integrity { .. } => CliError::Integrity { message },
            RepoError::Registry { .. } | RepoError::Http { .. } | RepoError::Network { .. } => {
                CliError::Registry { message, help: None }
            }
            RepoError::StoreWrite { .. } | RepoError::Io(_) => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<PackError> for CliError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::Core(core) => core.into(),
            PackError::Engine(engine) => engine.into(),
            PackError::Repo(repo) => repo.into(),
            unexpected @ PackError::UnexpectedLayerCount { .. } => CliError::Pack {
                message: unexpected.to_string(),
                help: None,
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
