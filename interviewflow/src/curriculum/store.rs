//! Persistence boundary for finished curricula.

use super::models::Curriculum;
use crate::errors::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Stores a finished curriculum and returns its artifact id.
///
/// Errors are surfaced to the caller unchanged and end the run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CurriculumStore: Send + Sync {
    /// Persists `curriculum` and returns its artifact id.
    async fn persist(&self, curriculum: &Curriculum) -> Result<String, StorageError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryCurriculumStore {
    items: DashMap<String, Curriculum>,
}

impl InMemoryCurriculumStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of a stored curriculum.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Curriculum> {
        self.items.get(id).map(|c| c.clone())
    }

    /// Number of stored curricula.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl CurriculumStore for InMemoryCurriculumStore {
    async fn persist(&self, curriculum: &Curriculum) -> Result<String, StorageError> {
        let id = Uuid::now_v7().to_string();
        self.items.insert(id.clone(), curriculum.clone());
        Ok(id)
    }
}

/// One pretty-printed JSON document per artifact under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileCurriculumStore {
    dir: PathBuf,
}

impl JsonFileCurriculumStore {
    /// Stores under `dir`, which is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Reads an artifact back.
    pub async fn load(&self, id: &str) -> Result<Curriculum, StorageError> {
        let bytes = tokio::fs::read(self.path_for(id)).await?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl CurriculumStore for JsonFileCurriculumStore {
    async fn persist(&self, curriculum: &Curriculum) -> Result<String, StorageError> {
        let id = Uuid::now_v7().to_string();
        let body = serde_json::to_vec_pretty(curriculum)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        // Write then rename so readers never see a partial document.
        let tmp = self.dir.join(format!(".{id}.json.tmp"));
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, self.path_for(&id)).await?;

        debug!(artifact_id = %id, dir = %self.dir.display(), bytes = body.len(), "Curriculum written");
        Ok(id)
    }
}
