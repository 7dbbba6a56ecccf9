//! In-memory filesystem for source trees
//!
//! Manifest packages are rendered from a `MemFs` whether their sources come
//! from disk or from an archive layer pulled out of a registry, so a fetched
//! package renders exactly like a freshly authored one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

/// Sorted, slash-separated paths relative to the tree root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemFs {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every regular file under `root`
    pub fn from_dir(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(CoreError::FileNotFound {
                path: root.display().to_string(),
            });
        }

        let mut fs = Self::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if rel.is_empty() {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                fs.mkdir_all(&rel)?;
            } else if file_type.is_file() {
                fs.write_file(&rel, std::fs::read(entry.path())?)?;
            }
        }
        Ok(fs)
    }

    pub fn write_file(&mut self, path: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        let path = normalize(path)?;
        if path.is_empty() || self.dirs.contains(&path) {
            return Err(CoreError::InvalidPackageSource {
                name: path,
                message: "not a file path".to_string(),
            });
        }
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.mkdir_all(parent)?;
        }
        self.files.insert(path, data.into());
        Ok(())
    }

    pub fn mkdir_all(&mut self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            self.dirs.insert(current.clone());
        }
        Ok(())
    }

    pub fn read_file(&self, path: &str) -> Result<&[u8]> {
        let normalized = normalize(path)?;
        self.files
            .get(&normalized)
            .map(Vec::as_slice)
            .ok_or_else(|| CoreError::FileNotFound {
                path: path.to_string(),
            })
    }

    pub fn exists(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(p) => p.is_empty() || self.files.contains_key(&p) || self.dirs.contains(&p),
            Err(_) => false,
        }
    }

    pub fn is_file(&self, path: &str) -> bool {
        normalize(path).is_ok_and(|p| self.files.contains_key(&p))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        normalize(path).is_ok_and(|p| p.is_empty() || self.dirs.contains(&p))
    }

    /// Direct children of a directory, files and directories, sorted by name
    pub fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let dir = normalize(path)?;
        if !self.is_dir(&dir) {
            return Err(CoreError::FileNotFound {
                path: path.to_string(),
            });
        }

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let children: BTreeSet<String> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        Ok(children.into_iter().collect())
    }

    /// Regular files in path order
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, d)| (p.as_str(), d.as_slice()))
    }

    pub fn dirs(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Tree rooted at a subdirectory
    pub fn subtree(&self, path: &str) -> Result<Self> {
        let dir = normalize(path)?;
        if dir.is_empty() {
            return Ok(self.clone());
        }
        if !self.dirs.contains(&dir) {
            return Err(CoreError::FileNotFound {
                path: path.to_string(),
            });
        }

        let prefix = format!("{}/", dir);
        let mut fs = Self::new();
        for d in &self.dirs {
            if let Some(rest) = d.strip_prefix(&prefix) {
                fs.dirs.insert(rest.to_string());
            }
        }
        for (p, data) in &self.files {
            if let Some(rest) = p.strip_prefix(&prefix) {
                fs.files.insert(rest.to_string(), data.clone());
            }
        }
        Ok(fs)
    }
}

/// Join a relative path onto a directory, resolving `.` and `..`
pub fn join(base: &str, rel: &str) -> Result<String> {
    if rel.starts_with('/') {
        return normalize(rel);
    }
    normalize(&format!("{}/{}", base, rel))
}

/// Canonical form: no leading `/` or `./`, no empty or `.` segments
///
/// `..` is resolved lexically and may not climb above the root.
pub fn normalize(path: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(CoreError::InvalidPackageSource {
                        name: path.to_string(),
                        message: "path escapes the source root".to_string(),
                    });
                }
            }
            p => parts.push(p),
        }
    }
    Ok(parts.join("/"))
}
