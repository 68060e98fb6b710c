//! History persistence backends.

use crate::types::Job;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Durable storage for the bounded history list.
///
/// The list is always read and written wholesale.
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    async fn load(&self) -> Result<Vec<Job>>;
    async fn save(&self, history: &[Job]) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Process-local history, lost on exit.
#[derive(Default)]
pub struct MemoryHistory {
    entries: RwLock<Vec<Job>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<Job>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl HistoryBackend for MemoryHistory {
    async fn load(&self) -> Result<Vec<Job>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.clone())
    }

    async fn save(&self, history: &[Job]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        *entries = history.to_vec();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn poisoned() -> Error {
    Error::runtime_with_context(
        "history lock poisoned",
        ErrorContext::new().with_source("memory_history"),
    )
}

/// History stored as a JSON array in a single file.
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryBackend for FileHistory {
    async fn load(&self) -> Result<Vec<Job>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, history: &[Job]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(history)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
