//! Deterministic tar+gzip archives
//!
//! Entries are written in path order with a zero mtime, so packing the same
//! tree twice yields the same bytes and therefore the same digest.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};

use crate::error::{CoreError, Result};
use crate::fs::{normalize, MemFs};

/// Whether a path names a compressed chart archive rather than a directory
pub fn is_compressed_archive(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".tgz") || name.ends_with(".tar.gz")
}

/// Archive a tree, entries relative to its root
pub fn tgz_fs(fs: &MemFs) -> Result<Vec<u8>> {
    tgz_fs_with_prefix(fs, None)
}

/// Archive a tree with every entry placed under `prefix/`
pub fn tgz_fs_with_prefix(fs: &MemFs, prefix: Option<&str>) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let encoder = write_tree(encoder, fs, prefix)?;
    encoder.finish().map_err(archive_io)
}

/// Archive a directory on disk, entries placed under the directory's own name
///
/// This is the layout chart tooling expects (`podinfo/Chart.yaml`, ...).
pub fn tgz_dir(dir: &Path) -> Result<Vec<u8>> {
    let fs = MemFs::from_dir(dir)?;
    let name = dir
        .canonicalize()?
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| CoreError::archive(format!("cannot archive {}", dir.display())))?;
    tgz_fs_with_prefix(&fs, Some(&name))
}

/// Write a directory's contents into a `.tar.gz` file
pub fn archive_dir_to(dir: &Path, output: &Path) -> Result<PathBuf> {
    let fs = MemFs::from_dir(dir)?;
    let file = File::create(output)?;
    let encoder = write_tree(GzEncoder::new(file, Compression::default()), &fs, None)?;
    encoder.finish().map_err(archive_io)?;
    Ok(output.to_path_buf())
}

/// Unpack a tar+gzip stream into memory
pub fn untgz<R: Read>(reader: R) -> Result<MemFs> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut fs = MemFs::new();

    for entry in archive.entries().map_err(archive_io)? {
        let mut entry = entry.map_err(archive_io)?;
        let path = entry.path().map_err(archive_io)?.to_string_lossy().to_string();
        let path = normalize(&path)
            .map_err(|_| CoreError::archive(format!("entry '{}' escapes the archive root", path)))?;
        if path.is_empty() {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs.mkdir_all(&path)?;
        } else if entry_type.is_file() {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(archive_io)?;
            fs.write_file(&path, data)?;
        }
    }

    Ok(fs)
}

fn write_tree<W: Write>(writer: W, fs: &MemFs, prefix: Option<&str>) -> Result<W> {
    let mut builder = Builder::new(writer);
    let place = |p: &str| match prefix {
        Some(prefix) => format!("{}/{}", prefix, p),
        None => p.to_string(),
    };

    if let Some(prefix) = prefix {
        add_dir_to_archive(&mut builder, prefix)?;
    }
    for dir in fs.dirs() {
        add_dir_to_archive(&mut builder, &place(dir))?;
    }
    for (path, data) in fs.files() {
        add_bytes_to_archive(&mut builder, &place(path), data)?;
    }

    builder.into_inner().map_err(archive_io)
}

fn add_dir_to_archive<W: Write>(builder: &mut Builder<W>, archive_path: &str) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(0);
    header.set_cksum();

    builder
        .append_data(&mut header, format!("{}/", archive_path), std::io::empty())
        .map_err(archive_io)
}

fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();

    builder
        .append_data(&mut header, archive_path, content)
        .map_err(archive_io)
}

fn archive_io(err: std::io::Error) -> CoreError {
    CoreError::archive(err.to_string())
}
