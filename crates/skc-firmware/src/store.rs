use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {op} program store {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persistent copy of the uploaded program.
///
/// Uploads arrive as a truncate followed by any number of appends; the store never interprets the
/// bytes.
#[derive(Debug, Clone)]
pub struct ProgramStore {
    path: PathBuf,
}

impl ProgramStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty the store, creating it if needed.
    pub async fn truncate(&self) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .await
            .map_err(|source| self.error("truncate", source))?;
        file.sync_all()
            .await
            .map_err(|source| self.error("truncate", source))
    }

    pub async fn append(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await
            .map_err(|source| self.error("append to", source))?;
        file.write_all(bytes)
            .await
            .map_err(|source| self.error("append to", source))?;
        file.flush()
            .await
            .map_err(|source| self.error("append to", source))
    }

    pub async fn load(&self) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| self.error("read", source))
    }

    fn error(&self, op: &'static str, source: io::Error) -> StoreError {
        StoreError::Io {
            op,
            path: self.path.clone(),
            source,
        }
    }
}
