//! HTTP chart repositories
//!
//! Resolves `{repoUrl, name, version}` through the repository's
//! `index.yaml` and downloads the archive into a local cache.

use async_trait::async_trait;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use kevi_core::{ChartSource, Digest};

use crate::error::{RepoError, Result};

/// Repository index, Helm-compatible
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

/// One chart version in an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartEntry {
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub urls: Vec<String>,

    /// Archive sha256, with or without the `sha256:` prefix
    #[serde(default)]
    pub digest: Option<String>,
}

impl ChartEntry {
    fn semver(&self) -> Option<Version> {
        Version::parse(self.version.trim_start_matches('v')).ok()
    }
}

fn by_version(a: &&ChartEntry, b: &&ChartEntry) -> Ordering {
    match (a.semver(), b.semver()) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.version.cmp(&b.version),
    }
}

impl ChartIndex {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(data)?)
    }

    /// Highest version, preferring stable releases over pre-releases
    pub fn latest(&self, name: &str) -> Option<&ChartEntry> {
        let versions = self.entries.get(name)?;
        let stable = versions
            .iter()
            .filter(|e| e.semver().is_some_and(|v| v.pre.is_empty()))
            .max_by(by_version);
        stable.or_else(|| versions.iter().max_by(by_version))
    }

    /// Exact version first, then the highest version satisfying `version` as a constraint
    pub fn find(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        let versions = self.entries.get(name)?;
        if let Some(exact) = versions
            .iter()
            .find(|e| e.version == version || e.version.trim_start_matches('v') == version)
        {
            return Some(exact);
        }

        let req = VersionReq::parse(version).ok()?;
        versions
            .iter()
            .filter(|e| e.semver().is_some_and(|v| req.matches(&v)))
            .max_by(by_version)
    }
}

/// Resolves a chart locator to a local archive path
#[async_trait]
pub trait ChartLocator: Send + Sync {
    async fn locate(&self, chart: &ChartSource) -> Result<PathBuf>;
}

/// Locator for Helm-style HTTP repositories
pub struct HttpChartLocator {
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl HttpChartLocator {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kevi/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn index(&self, repo_url: &Url) -> Result<ChartIndex> {
        let url = repo_url.join("index.yaml").map_err(|e| RepoError::InvalidConfig {
            message: format!("invalid repository URL {}: {}", repo_url, e),
        })?;
        ChartIndex::from_bytes(&self.get(url.as_str()).await?)
    }
}

/// Repository base with a trailing slash so relative joins stay inside it
fn repository_base(repo_url: &str) -> Result<Url> {
    Url::parse(&format!("{}/", repo_url.trim_end_matches('/'))).map_err(|e| {
        RepoError::InvalidConfig {
            message: format!("invalid repository URL {}: {}", repo_url, e),
        }
    })
}

fn verify_digest(entry: &ChartEntry, data: &[u8]) -> Result<()> {
    let Some(expected) = &entry.digest else {
        return Ok(());
    };
    let actual = Digest::of(data);
    let expected = expected.trim_start_matches("sha256:");
    if !expected.eq_ignore_ascii_case(actual.hex()) {
        return Err(RepoError::Integrity {
            reference: format!("{}-{}", entry.name, entry.version),
            expected: format!("sha256:{}", expected),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl ChartLocator for HttpChartLocator {
    async fn locate(&self, chart: &ChartSource) -> Result<PathBuf> {
        let base = repository_base(&chart.repo_url)?;
        let index = self.index(&base).await?;

        let entry = if chart.version.is_empty() {
            index.latest(&chart.name)
        } else {
            index.find(&chart.name, &chart.version)
        };
        let entry = match entry {
            Some(entry) => entry,
            None if index.entries.contains_key(&chart.name) => {
                return Err(RepoError::VersionNotFound {
                    name: chart.name.clone(),
                    version: chart.version.clone(),
                    repo: chart.repo_url.clone(),
                });
            }
            None => {
                return Err(RepoError::ChartNotFound {
                    name: chart.name.clone(),
                    repo: chart.repo_url.clone(),
                });
            }
        };

        let path = self
            .cache_dir
            .join(format!("{}-{}.tgz", entry.name, entry.version));
        if path.exists() {
            let cached = tokio::fs::read(&path).await?;
            match verify_digest(entry, &cached) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "chart cache hit");
                    return Ok(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discarding stale cached chart");
                }
            }
        }

        let url = entry.urls.first().ok_or_else(|| RepoError::ChartNotFound {
            name: chart.name.clone(),
            repo: chart.repo_url.clone(),
        })?;
        let url = base.join(url).map_err(|e| RepoError::InvalidConfig {
            message: format!("invalid chart URL {}: {}", url, e),
        })?;

        let data = self.get(url.as_str()).await?;
        verify_digest(entry, &data)?;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(&path, &data).await?;
        tracing::info!(chart = %entry.name, version = %entry.version, "downloaded chart");
        Ok(path)
    }
}
