//! Image and artifact references
//!
//! A reference has the form `host[/namespace]/repository[:tag|@digest]`.
//! Parsing follows the Docker normalization rules: a first path component is
//! only a registry host when it contains `.` or `:` or is `localhost`,
//! otherwise the reference lives on `docker.io`, and single-component
//! repositories there get the `library/` prefix. A missing qualifier means
//! the `latest` tag.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::descriptor::Digest;
use crate::error::{CoreError, Result};

/// Registry assumed for references without an explicit host
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag assumed for references without a qualifier
pub const DEFAULT_TAG: &str = "latest";

static REGISTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9.-]*[a-zA-Z0-9])?(?::[0-9]+)?$").expect("valid regex")
});

static PATH_COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("valid regex")
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid regex"));

/// The mutable-or-immutable part of a reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Qualifier {
    /// Mutable pointer, may be reassigned
    Tag(String),
    /// Immutable, self-verifying
    Digest(Digest),
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, ":{}", tag),
            Self::Digest(digest) => write!(f, "@{}", digest),
        }
    }
}

/// A parsed, normalized reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    registry: String,
    repository: String,
    qualifier: Qualifier,
}

impl Reference {
    /// Parse and normalize a reference string
    ///
    /// A reference carrying both a tag and a digest is digest-qualified; the
    /// tag is dropped.
    pub fn parse(s: &str) -> Result<Self> {
        let input = s.trim();
        if input.is_empty() {
            return Err(CoreError::invalid_reference(s, "empty reference"));
        }

        let (name_tag, digest) = match input.split_once('@') {
            Some((name_tag, digest)) => {
                let digest = Digest::parse(digest)
                    .map_err(|_| CoreError::invalid_reference(s, "invalid digest"))?;
                (name_tag, Some(digest))
            }
            None => (input, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a host port
        let last_slash = name_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name_tag[..split], Some(&name_tag[split + 1..]))
            }
            None => (name_tag, None),
        };

        if let Some(tag) = tag {
            if !TAG_RE.is_match(tag) {
                return Err(CoreError::invalid_reference(s, format!("invalid tag '{}'", tag)));
            }
        }

        let (registry, repository) = split_registry(name);
        if !REGISTRY_RE.is_match(&registry) {
            return Err(CoreError::invalid_reference(
                s,
                format!("invalid registry '{}'", registry),
            ));
        }
        validate_repository(s, &repository)?;

        let qualifier = match (digest, tag) {
            (Some(digest), _) => Qualifier::Digest(digest),
            (None, Some(tag)) => Qualifier::Tag(tag.to_string()),
            (None, None) => Qualifier::Tag(DEFAULT_TAG.to_string()),
        };

        Ok(Self {
            registry,
            repository,
            qualifier,
        })
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.qualifier {
            Qualifier::Tag(tag) => Some(tag),
            Qualifier::Digest(_) => None,
        }
    }

    pub fn digest(&self) -> Option<&Digest> {
        match &self.qualifier {
            Qualifier::Digest(digest) => Some(digest),
            Qualifier::Tag(_) => None,
        }
    }

    pub fn is_digest(&self) -> bool {
        matches!(self.qualifier, Qualifier::Digest(_))
    }

    /// `registry/repository` without qualifier
    pub fn context(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Same repository path and qualifier on another registry host
    pub fn relocated(&self, registry: &str) -> Result<Self> {
        validate_registry(registry)?;
        let registry = normalize_registry(registry);
        let repository = if registry == DEFAULT_REGISTRY && !self.repository.contains('/') {
            format!("library/{}", self.repository)
        } else {
            self.repository.clone()
        };

        Ok(Self {
            registry,
            repository,
            qualifier: self.qualifier.clone(),
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.registry, self.repository, self.qualifier)
    }
}

impl FromStr for Reference {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Rewrite the registry host of `reference`, keeping repository path and
/// tag-or-digest identity.
///
/// ```
/// use kevi_core::relocate;
///
/// assert_eq!(
///     relocate("registry-a.io/ns/app:v1", "registry-b.io").unwrap(),
///     "registry-b.io/ns/app:v1"
/// );
/// ```
pub fn relocate(reference: &str, registry: &str) -> Result<String> {
    Ok(Reference::parse(reference)?.relocated(registry)?.to_string())
}

/// Check that `host` is usable as a registry host (`name[:port]`)
pub fn validate_registry(host: &str) -> Result<()> {
    if host.is_empty() {
        return Err(CoreError::invalid_reference(host, "registry hostname cannot be empty"));
    }
    if !REGISTRY_RE.is_match(host) {
        return Err(CoreError::invalid_reference(host, "invalid registry hostname"));
    }
    Ok(())
}

fn split_registry(name: &str) -> (String, String) {
    let (registry, path) = match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
    };

    let registry = normalize_registry(&registry);
    if registry == DEFAULT_REGISTRY && !path.contains('/') {
        (registry, format!("library/{}", path))
    } else {
        (registry, path)
    }
}

fn normalize_registry(host: &str) -> String {
    if host == "index.docker.io" {
        DEFAULT_REGISTRY.to_string()
    } else {
        host.to_string()
    }
}

fn validate_repository(original: &str, repository: &str) -> Result<()> {
    if repository.is_empty() {
        return Err(CoreError::invalid_reference(original, "missing repository"));
    }
    for component in repository.split('/') {
        if !PATH_COMPONENT_RE.is_match(component) {
            return Err(CoreError::invalid_reference(
                original,
                format!("invalid repository component '{}'", component),
            ));
        }
    }
    Ok(())
}
