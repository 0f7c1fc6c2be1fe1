//! Target-file loading and atomic write-back.
//!
//! The loader reads a target file's full text once; the writer overwrites the
//! same path atomically (tempfile in the same directory + fsync + rename), so
//! a crash mid-write leaves the previous contents intact and a concurrent
//! reader never observes a torn file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One target file: its path and the text read from it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    content: String,
}

impl SourceFile {
    /// Read the complete file as UTF-8 text. No partial reads: a missing or
    /// unreadable file is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        let bytes = fs::read(&path).map_err(|source| SourceError::Read {
            path: path.clone(),
            source,
        })?;
        let content =
            String::from_utf8(bytes).map_err(|_| SourceError::NotUtf8 { path: path.clone() })?;
        Ok(Self { path, content })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Overwrite the original path with `new_content`.
    ///
    /// The write goes to a tempfile in the target's directory, is fsynced,
    /// then renamed over the target. The mtime is refreshed afterwards so
    /// watch-mode dev servers notice the change.
    pub fn store(&self, new_content: &str) -> Result<(), SourceError> {
        atomic_write(&self.path, new_content.as_bytes()).map_err(|source| SourceError::Write {
            path: self.path.clone(),
            source,
        })?;

        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&self.path, now).map_err(|source| SourceError::Write {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Tempfile must live in the same directory so the rename stays on one
    // filesystem.
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
