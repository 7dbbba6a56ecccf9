//! Engine error types

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("Render error in '{source_name}': {message}")]
    #[diagnostic(code(kevi::render))]
    Render { source_name: String, message: String },

    #[error("Invalid chart: {message}")]
    #[diagnostic(code(kevi::chart), help("a chart needs a Chart.yaml with at least name and version"))]
    Chart { message: String },

    #[error("Unsupported kustomization feature in '{source_name}': {feature}")]
    #[diagnostic(code(kevi::kustomize::unsupported))]
    Unsupported { source_name: String, feature: String },

    #[error(transparent)]
    #[diagnostic(code(kevi::core))]
    Core(#[from] kevi_core::CoreError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn render(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Render {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn chart(message: impl Into<String>) -> Self {
        Self::Chart {
            message: message.into(),
        }
    }

    pub(crate) fn from_minijinja(err: minijinja::Error, template: &str) -> Self {
        let message = match err.line() {
            Some(line) => format!("{} (line {})", err, line),
            None => err.to_string(),
        };
        Self::Render {
            source_name: template.to_string(),
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
