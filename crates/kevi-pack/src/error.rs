//! Packaging error types

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum PackError {
    #[error("Package '{package}' must be stored as exactly one layer, found {count}")]
    #[diagnostic(
        code(kevi::pack::layers),
        help("the registry holds something other than a package packed by kevi at this reference")
    )]
    UnexpectedLayerCount { package: String, count: usize },

    #[error(transparent)]
    #[diagnostic(code(kevi::core))]
    Core(#[from] kevi_core::CoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] kevi_engine::EngineError),

    #[error(transparent)]
    #[diagnostic(code(kevi::repo))]
    Repo(#[from] kevi_repo::RepoError),
}

pub type Result<T> = std::result::Result<T, PackError>;
