use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{
    Condition, FieldPatch, ScanFilter, StoreError, WorkflowStore, newest_first, patched_document,
};
use crate::state_machine::WorkflowRecord;

/// In-memory workflow store, used by tests and dry runs.
pub struct MemoryWorkflowStore {
    documents: RwLock<HashMap<String, Map<String, Value>>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a raw document, bypassing validation. Lets tests seed
    /// records written under an older schema.
    #[cfg(test)]
    pub async fn insert_raw(&self, id: &str, document: Map<String, Value>) {
        self.documents.write().await.insert(id.to_string(), document);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

impl Default for MemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn create(&self, record: &WorkflowRecord) -> Result<(), StoreError> {
        let document = record.to_document()?;
        let mut documents = self.documents.write().await;
        if documents.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        documents.insert(record.id.clone(), document);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WorkflowRecord>, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(id)
            .map(|doc| {
                WorkflowRecord::from_document(doc).map_err(|source| StoreError::InvalidRecord {
                    id: id.to_string(),
                    source,
                })
            })
            .transpose()
    }

    async fn update_fields(
        &self,
        id: &str,
        patch: FieldPatch,
        conditions: &[Condition],
    ) -> Result<WorkflowRecord, StoreError> {
        let mut documents = self.documents.write().await;
        let current = documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let (updated, record) = patched_document(id, current, &patch, conditions)?;
        documents.insert(id.to_string(), updated);
        Ok(record)
    }

    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<WorkflowRecord>, StoreError> {
        let documents = self.documents.read().await;
        let mut records = Vec::new();
        for (id, doc) in documents.iter() {
            match WorkflowRecord::from_document(doc) {
                Ok(record) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => tracing::warn!(workflow_id = %id, error = %e, "Skipping undecodable record"),
            }
        }
        newest_first(&mut records);
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{StageName, StageState, TriggerType, WorkflowStatus};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn create_is_insert_if_absent() {
        let store = MemoryWorkflowStore::new();
        let record = WorkflowRecord::new(TriggerType::Daily, 2);
        store.create(&record).await.unwrap();
        let err = store.create(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = MemoryWorkflowStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = MemoryWorkflowStore::new();
        let err = store
            .update_fields("nope", FieldPatch::new().touch(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_disjoint_stage_writes_both_land() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let record = WorkflowRecord::new(TriggerType::Daily, 2);
        store.create(&record).await.unwrap();

        let mut handles = Vec::new();
        for stage in [StageName::Research, StageName::Writing] {
            let store = Arc::clone(&store);
            let id = record.id.clone();
            handles.push(tokio::spawn(async move {
                let path = format!("stage_states.{stage}");
                let patch = FieldPatch::new()
                    .set(&path, StageState::running(Utc::now()))
                    .unwrap();
                store
                    .update_fields(&id, patch, &[Condition::not_exists(&path)])
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.stage_states.len(), 2);
    }

    #[tokio::test]
    async fn conditional_status_update() {
        let store = MemoryWorkflowStore::new();
        let record = WorkflowRecord::new(TriggerType::Daily, 2);
        store.create(&record).await.unwrap();

        let patch = FieldPatch::new()
            .set("status", WorkflowStatus::DiscoveringTopic)
            .unwrap();
        let updated = store
            .update_fields(
                &record.id,
                patch.clone(),
                &[Condition::status_is(WorkflowStatus::Initialized)],
            )
            .await
            .unwrap();
        assert_eq!(updated.status, WorkflowStatus::DiscoveringTopic);

        let err = store
            .update_fields(
                &record.id,
                patch,
                &[Condition::status_is(WorkflowStatus::Initialized)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
    }

    #[tokio::test]
    async fn scan_filters_and_orders_newest_first() {
        let store = MemoryWorkflowStore::new();
        let now = Utc::now();
        for (offset, status) in [
            (3, WorkflowStatus::EmailSent),
            (1, WorkflowStatus::EmailSent),
            (2, WorkflowStatus::Published),
        ] {
            let mut record = WorkflowRecord::new(TriggerType::Daily, 2);
            record.created_at = now - Duration::hours(offset);
            record.status = status;
            store.create(&record).await.unwrap();
        }

        let found = store
            .scan(&ScanFilter::with_statuses([WorkflowStatus::EmailSent]))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].created_at > found[1].created_at);

        let all = store.scan(&ScanFilter::all()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = MemoryWorkflowStore::new();
        let record = WorkflowRecord::new(TriggerType::Daily, 2);
        store.create(&record).await.unwrap();
        store.delete(&record.id).await.unwrap();
        assert!(store.get(&record.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
