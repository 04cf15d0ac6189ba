//! Tarball extraction
//!
//! Extracts `.tar.gz` archives (the format source hosts serve repository
//! snapshots in) behind an async interface. Any entry that would land
//! outside the destination fails the whole extraction.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use velox_proto::ErrorKind;


#[derive(Debug, thiserror::Error)]
pub enum TarballError {
    #[error("tar error: {0}")]
    Tar(String),

    #[error("non-UTF8 path in tarball")]
    NonUtf8Path,

    #[error("unsafe path in tarball: {path}")]
    UnsafePath { path: String },

    #[error("tarball has no top-level directory")]
    NoRoot,

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create file {path}: {source}")]
    CreateFile {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write file {path}: {source}")]
    WriteFile {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("failed to set permissions on {path}: {source}")]
    SetPermissions {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("spawn_blocking failed: {0}")]
    SpawnBlocking(#[from] tokio::task::JoinError),
}

impl TarballError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TarballError::SpawnBlocking(_) => ErrorKind::IoFailed,
            _ => ErrorKind::ExtractFailed,
        }
    }
}

/// What an extraction produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// `dest` joined with the archive's first path component
    pub root: Utf8PathBuf,
    /// Number of regular files written
    pub files: usize,
}

/// Extract a tar.gz archive into `dest` (created if missing).
///
/// Entries containing `..`, or rooted at `/` or a drive prefix, fail with
/// [`TarballError::UnsafePath`]. Entries that are neither regular files nor
/// directories (pax headers, links) are skipped.
pub async fn extract(tarball_bytes: Vec<u8>, dest: Utf8PathBuf) -> Result<Extracted, TarballError> {
    tokio::task::spawn_blocking(move || extract_sync(&tarball_bytes, &dest)).await?
}

/// Reject anything that can escape the destination directory.
pub fn check_entry_path(path: &Utf8Path) -> Result<(), TarballError> {
    let unsafe_component = path.components().any(|c| {
        matches!(
            c,
            Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_)
        )
    });
    if unsafe_component {
        return Err(TarballError::UnsafePath {
            path: path.to_string(),
        });
    }
    Ok(())
}

pub fn extract_sync(tarball_bytes: &[u8], dest: &Utf8Path) -> Result<Extracted, TarballError> {
    std::fs::create_dir_all(dest).map_err(|e| TarballError::CreateDir {
        path: dest.to_owned(),
        source: e,
    })?;

    let mut archive = tar::Archive::new(GzDecoder::new(tarball_bytes));
    let mut root: Option<Utf8PathBuf> = None;
    let mut files = 0usize;

    for entry in archive
        .entries()
        .map_err(|e| TarballError::Tar(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| TarballError::Tar(e.to_string()))?;
        let entry_type = entry.header().entry_type();
        if !(entry_type.is_file() || entry_type.is_dir()) {
            continue;
        }

        let path = entry.path().map_err(|e| TarballError::Tar(e.to_string()))?;
        let path =
            Utf8PathBuf::from_path_buf(path.into_owned()).map_err(|_| TarballError::NonUtf8Path)?;
        check_entry_path(&path)?;

        if root.is_none() {
            if let Some(Utf8Component::Normal(first)) = path.components().next() {
                root = Some(dest.join(first));
            }
        }

        let target_path = dest.join(&path);

        if entry_type.is_dir() {
            std::fs::create_dir_all(&target_path).map_err(|e| TarballError::CreateDir {
                path: target_path.clone(),
                source: e,
            })?;
            continue;
        }

        if let Some(parent) = target_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TarballError::CreateDir {
                path: parent.to_owned(),
                source: e,
            })?;
        }

        let mut output_file =
            std::fs::File::create(&target_path).map_err(|e| TarballError::CreateFile {
                path: target_path.clone(),
                source: e,
            })?;

        std::io::copy(&mut entry, &mut output_file).map_err(|e| TarballError::WriteFile {
            path: target_path.clone(),
            source: e,
        })?;
        files += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(mode) = entry.header().mode() {
                if mode & 0o111 != 0 {
                    let perms = std::fs::Permissions::from_mode(mode & 0o777);
                    std::fs::set_permissions(&target_path, perms).map_err(|e| {
                        TarballError::SetPermissions {
                            path: target_path.clone(),
                            source: e,
                        }
                    })?;
                }
            }
        }
    }

    let root = root.ok_or(TarballError::NoRoot)?;
    tracing::debug!(root = %root, files, "extracted tarball");
    Ok(Extracted { root, files })
}
