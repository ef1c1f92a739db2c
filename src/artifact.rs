//! On-disk layout of captured chapters.
//!
//! Every chapter lives in a file named by the SHA-256 of its source URL,
//! inside a directory named after its novel. A chapter whose file exists
//! counts as captured and is never fetched again.

use crate::error::CrawlError;
use crate::site::sanitize_title;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Suffix of a chapter file that is still being written.
const PARTIAL_SUFFIX: &str = "part";

/// Hex-encoded SHA-256 of `url`, used as the chapter file name.
pub fn chapter_file_name(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Path of the chapter file for `url` inside `dir`.
pub fn chapter_path(dir: &Path, url: &str) -> PathBuf {
    dir.join(chapter_file_name(url))
}

/// Returns true if the chapter for `url` was already captured into `dir`.
pub async fn is_captured(dir: &Path, url: &str) -> Result<bool, CrawlError> {
    let path = chapter_path(dir, url);
    tokio::fs::try_exists(&path)
        .await
        .map_err(|source| CrawlError::Io { path, source })
}

/// Chapter file contents: the sanitized title, a blank line, then the body.
pub fn render_chapter(title: &str, body: &str) -> String {
    format!("{}\n\n{}", sanitize_title(title), body)
}

/// Writes a chapter to `path`.
///
/// Data goes to a sibling `.part` file first and is renamed into place, so
/// an interrupted write never leaves a file that looks captured.
pub async fn write_chapter(path: &Path, title: &str, body: &str) -> Result<(), CrawlError> {
    let partial = path.with_extension(PARTIAL_SUFFIX);

    tokio::fs::write(&partial, render_chapter(title, body))
        .await
        .map_err(|source| CrawlError::Io {
            path: partial.clone(),
            source,
        })?;

    tokio::fs::rename(&partial, path)
        .await
        .map_err(|source| CrawlError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Creates (or reuses) the directory for a novel titled `title` inside `root`.
pub async fn ensure_novel_dir(root: &Path, title: &str) -> Result<PathBuf, CrawlError> {
    let dir = root.join(sanitize_title(title));

    match tokio::fs::create_dir(&dir).await {
        Ok(()) => Ok(dir),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(dir),
        Err(source) => Err(CrawlError::Io { path: dir, source }),
    }
}
