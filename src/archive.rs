//! Archive provider used for backups, packages, and rollback

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

use crate::error::{Result, UpdateError};

/// Compresses directories into archives and extracts them back
pub trait Archiver: Send + Sync {
    /// Archive every entry under `source_dir`, skipping the `exclude` paths
    /// and everything beneath them. Entry names are relative to `source_dir`.
    fn compress(&self, source_dir: &Path, archive: &Path, exclude: &[PathBuf]) -> Result<()>;

    /// Extract `archive` into `dest_dir`, overwriting existing files
    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()>;
}

/// `.tar.gz` archives
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzArchiver;

impl Archiver for TarGzArchiver {
    fn compress(&self, source_dir: &Path, archive: &Path, exclude: &[PathBuf]) -> Result<()> {
        if let Some(parent) = archive.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(archive)?;

        // Canonical forms so exclusions match walker output regardless of
        // how the caller spelled the paths. The archive now exists.
        let source_dir = source_dir.canonicalize()?;
        let mut skip: Vec<PathBuf> = exclude.iter().map(|p| canonical_or_self(p)).collect();
        skip.push(canonical_or_self(archive));

        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        let walker = WalkDir::new(&source_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !skip.iter().any(|s| entry.path() == s));

        let mut count = 0usize;
        for entry in walker {
            let entry = entry.map_err(|e| UpdateError::Archive(format!("walk failed: {e}")))?;
            let relative = entry
                .path()
                .strip_prefix(&source_dir)
                .map_err(|e| UpdateError::Archive(e.to_string()))?;
            builder
                .append_path_with_name(entry.path(), relative)
                .map_err(|e| {
                    UpdateError::Archive(format!(
                        "failed to add {}: {e}",
                        entry.path().display()
                    ))
                })?;
            count += 1;
        }

        let encoder = builder.into_inner()?;
        let mut writer = encoder.finish()?;
        std::io::Write::flush(&mut writer)?;

        tracing::debug!(
            source = %source_dir.display(),
            archive = %archive.display(),
            entries = count,
            "Archive created"
        );
        Ok(())
    }

    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dest_dir)?;
        let file = File::open(archive)?;
        let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        tar.set_overwrite(true);
        tar.set_preserve_permissions(true);
        tar.set_preserve_mtime(true);
        tar.unpack(dest_dir).map_err(|e| {
            UpdateError::Archive(format!(
                "failed to extract {} into {}: {e}",
                archive.display(),
                dest_dir.display()
            ))
        })?;

        tracing::debug!(
            archive = %archive.display(),
            dest = %dest_dir.display(),
            "Archive extracted"
        );
        Ok(())
    }
}

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Copy a tree through an intermediate archive
///
/// Compresses `source` into `scratch`, extracts it into `dest`, then deletes
/// `scratch`. `scratch` is always excluded from the archive.
pub fn mirror(
    archiver: &dyn Archiver,
    source: &Path,
    dest: &Path,
    scratch: &Path,
    exclude: &[PathBuf],
) -> Result<()> {
    let mut skip = exclude.to_vec();
    skip.push(scratch.to_path_buf());

    let result = archiver
        .compress(source, scratch, &skip)
        .and_then(|_| archiver.extract(scratch, dest));

    if scratch.exists() {
        if let Err(e) = std::fs::remove_file(scratch) {
            tracing::warn!(path = %scratch.display(), "Failed to remove scratch archive: {}", e);
        }
    }
    result
}
