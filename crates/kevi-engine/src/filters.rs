//! Template filters for chart rendering
//!
//! The subset of Helm-style helpers chart templates commonly lean on.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};
use sha2::{Digest, Sha256};

fn invalid(err: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, err.to_string())
}

/// Usage: {{ values.resources | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json = serde_json::to_value(&value).map_err(invalid)?;
    let yaml = serde_yaml::to_string(&json).map_err(invalid)?;
    Ok(yaml.trim_end().to_string())
}

/// Usage: {{ values.annotations | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(invalid)
}

/// Usage: {{ values.password | b64encode }}
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value)
}

/// Usage: {{ values.name | quote }}
pub fn quote(value: Value) -> String {
    let raw = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Usage: {{ values.labels | toyaml | nindent(4) }}
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Indent every non-empty line
///
/// Usage: {{ values.labels | toyaml | indent(4) }}
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Usage: {{ values.host | required("host is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined() || value.is_none() || value.as_str() == Some("");
    if missing {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

/// Usage: {{ name | trunc(63) }}
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

/// Usage: {{ config | toyaml | sha256 }}
pub fn sha256sum(value: String) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
