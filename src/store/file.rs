use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    Condition, FieldPatch, ScanFilter, StoreError, WorkflowStore, newest_first, patched_document,
};
use crate::state_machine::WorkflowRecord;

/// File system backed workflow store.
///
/// One JSON document per workflow:
/// ```text
/// {root}/
/// └── workflows/
///     ├── {id}.json
///     ├── {id}.lock
///     └── ...
/// ```
///
/// Read-modify-write of a document holds an exclusive advisory lock on
/// `{id}.lock`, so updates from separate processes (or separate handles on
/// the same root) are serialized. Writes go through a uniquely named temp
/// file and a rename.
pub struct FileWorkflowStore {
    root: PathBuf,
}

/// Exclusive lock on a document's lock file; released on drop.
struct DocumentLock {
    file: File,
}

impl DocumentLock {
    async fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(Self { file })
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release document lock: {}", e);
        }
    }
}

impl FileWorkflowStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("workflows")).await?;
        debug!("FileWorkflowStore initialized at {:?}", root);
        Ok(Self { root })
    }

    fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.workflows_dir()
            .join(format!("{}.json", Self::sanitize_id(id)))
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.workflows_dir()
            .join(format!("{}.lock", Self::sanitize_id(id)))
    }

    async fn lock(&self, id: &str) -> Result<DocumentLock, StoreError> {
        DocumentLock::acquire(self.lock_path(id)).await
    }

    fn sanitize_id(id: &str) -> String {
        id.chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    async fn read_document(&self, id: &str) -> Result<Option<Map<String, Value>>, StoreError> {
        let path = self.document_path(id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn write_document(&self, id: &str, document: &Map<String, Value>) -> Result<(), StoreError> {
        let path = self.document_path(id);
        let tmp = temp_path(&path);
        let json = serde_json::to_string_pretty(document)?;
        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn decode(id: &str, document: &Map<String, Value>) -> Result<WorkflowRecord, StoreError> {
        WorkflowRecord::from_document(document).map_err(|source| StoreError::InvalidRecord {
            id: id.to_string(),
            source,
        })
    }
}

/// `{id}.json.{uuid}.tmp` next to `path`.
fn temp_path(path: &Path) -> PathBuf {
    path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()))
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn create(&self, record: &WorkflowRecord) -> Result<(), StoreError> {
        let document = record.to_document()?;
        let json = serde_json::to_string_pretty(&document)?;
        let _lock = self.lock(&record.id).await?;

        let path = self.document_path(&record.id);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(record.id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        debug!(workflow_id = %record.id, "Created workflow document");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WorkflowRecord>, StoreError> {
        match self.read_document(id).await? {
            Some(document) => Ok(Some(Self::decode(id, &document)?)),
            None => Ok(None),
        }
    }

    async fn update_fields(
        &self,
        id: &str,
        patch: FieldPatch,
        conditions: &[Condition],
    ) -> Result<WorkflowRecord, StoreError> {
        let _lock = self.lock(id).await?;
        let current = self
            .read_document(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let (updated, record) = patched_document(id, &current, &patch, conditions)?;
        self.write_document(id, &updated).await?;
        Ok(record)
    }

    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<WorkflowRecord>, StoreError> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(self.workflows_dir()).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read workflow document {:?}: {}", path, e);
                    continue;
                }
            };
            match serde_json::from_str::<WorkflowRecord>(&content) {
                Ok(record) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!("Skipping undecodable workflow document {:?}: {}", path, e),
            }
        }

        newest_first(&mut records);
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _lock = self.lock(id).await?;
        match fs::remove_file(self.document_path(id)).await {
            Ok(()) => {
                // Holders of the unlinked lock file find no document either.
                let _ = fs::remove_file(self.lock_path(id)).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
