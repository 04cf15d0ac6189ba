//! Common I/O utilities for velox crates

use camino::{Utf8Path, Utf8PathBuf};

pub mod net;


/// Atomically write contents to a file.
///
/// Creates a temporary file in the same directory, writes contents,
/// then renames it over the final path. The result has mode 0600 on unix.
pub async fn atomic_write(path: &Utf8Path, contents: &[u8]) -> Result<(), std::io::Error> {
    let parent_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    tokio::fs::create_dir_all(parent_dir).await?;

    let temp_file = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent_dir)
        .map_err(std::io::Error::other)?;

    let temp_path = temp_file.into_temp_path();
    tokio::fs::write(&temp_path, contents).await?;

    temp_path
        .persist(path)
        .map_err(|e| std::io::Error::other(format!("failed to persist temp file: {}", e)))?;

    Ok(())
}

/// Copy `from` over `to`, keeping the source's permission bits.
pub async fn copy_preserving_mode(from: &Utf8Path, to: &Utf8Path) -> Result<u64, std::io::Error> {
    let permissions = tokio::fs::metadata(from).await?.permissions();
    // remove first so a running binary at `to` is not rewritten in place
    match tokio::fs::remove_file(to).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let copied = tokio::fs::copy(from, to).await?;
    tokio::fs::set_permissions(to, permissions).await?;
    Ok(copied)
}

/// Remove a directory tree, treating "already gone" as success.
pub async fn remove_dir_all_if_exists(path: &Utf8Path) -> Result<(), std::io::Error> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub async fn remove_file_if_exists(path: &Utf8Path) -> Result<(), std::io::Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove every entry directly under `dir` whose name starts with `prefix`.
///
/// Deletes `dir/<prefix>*`. Failures on individual entries are logged and
/// skipped; the removed paths are returned.
pub async fn sweep_prefixed(dir: &Utf8Path, prefix: &str) -> Vec<Utf8PathBuf> {
    let mut removed = Vec::new();
    let pattern = format!(
        "{}/{}*",
        glob::Pattern::escape(dir.as_str()),
        glob::Pattern::escape(prefix)
    );
    let matches = match glob::glob(&pattern) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid cleanup pattern");
            return removed;
        }
    };

    for entry in matches {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(path = %e.path().display(), error = %e, "failed to read directory entry");
                continue;
            }
        };
        let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
            continue;
        };

        let result = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                tracing::info!(path = %path, "cleaning temporary folders");
                removed.push(path);
            }
            Err(e) => tracing::warn!(path = %path, error = %e, "failed to remove temporary entry"),
        }
    }

    removed
}

/// System temp directory as a UTF-8 path.
pub fn temp_dir() -> Result<Utf8PathBuf, std::io::Error> {
    Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|p| {
        std::io::Error::other(format!("temp dir is not valid UTF-8: {}", p.display()))
    })
}

/// A name for a scratch directory that no other call in any process shares.
///
/// Derived from timestamp + PID + atomic counter.
pub fn unique_scratch_name() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{}-{}", timestamp, pid, count)
}
