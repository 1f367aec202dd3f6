//! Archive extraction.
//!
//! Packages are zip files. Entries whose names would land outside the
//! destination directory fail the whole extraction.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

/// Errors raised while expanding an archive
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid archive: {0}")]
    Archive(String),

    #[error("Archive entry escapes the destination: {name}")]
    UnsafeEntry { name: String },

    #[error("Extraction task failed: {0}")]
    Task(String),
}

impl From<ZipError> for ExtractError {
    fn from(e: ZipError) -> Self {
        match e {
            ZipError::Io(io) => ExtractError::Io(io),
            other => ExtractError::Archive(other.to_string()),
        }
    }
}

/// Expands an archive into a directory
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(&self, archive: &Path, destination: &Path) -> Result<(), ExtractError>;
}

/// Zip extraction on the blocking thread pool
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_blocking(archive: &Path, destination: &Path) -> Result<usize, ExtractError> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file)?;
        fs::create_dir_all(destination)?;

        let mut files = 0;
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let relative: PathBuf = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    return Err(ExtractError::UnsafeEntry {
                        name: entry.name().to_string(),
                    })
                }
            };
            let out_path = destination.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path)?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&out_path)?;
            io::copy(&mut entry, &mut outfile)?;
            files += 1;
        }

        Ok(files)
    }
}

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, destination: &Path) -> Result<(), ExtractError> {
        let archive_path = archive.to_path_buf();
        let destination_path = destination.to_path_buf();

        let files = tokio::task::spawn_blocking(move || {
            Self::extract_blocking(&archive_path, &destination_path)
        })
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))??;

        debug!(archive = %archive.display(), files, "Extracted archive");
        Ok(())
    }
}
