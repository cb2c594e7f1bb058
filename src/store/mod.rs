//! Persistence for workflow records.
//!
//! Records are stored as JSON documents and mutated through [`FieldPatch`]es:
//! a patch sets individual (possibly nested) fields and never replaces the
//! document wholesale, so two writers touching disjoint fields of the same
//! record both land. Writes may carry [`Condition`]s that are checked
//! atomically against the stored document before the patch applies.

mod file;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::state_machine::{WorkflowRecord, WorkflowStatus};

pub use file::FileWorkflowStore;
pub use memory::MemoryWorkflowStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Workflow {0} already exists")]
    AlreadyExists(String),

    #[error("Workflow {0} not found")]
    NotFound(String),

    #[error("Condition failed for workflow {id}: {detail}")]
    ConditionFailed { id: String, detail: String },

    #[error("Workflow {id} would become invalid: {source}")]
    InvalidRecord {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid field path: '{0}'")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value store of workflow records keyed by workflow id.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::AlreadyExists`] if the id is taken.
    async fn create(&self, record: &WorkflowRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<WorkflowRecord>, StoreError>;

    /// Apply `patch` if every condition holds; returns the updated record.
    async fn update_fields(
        &self,
        id: &str,
        patch: FieldPatch,
        conditions: &[Condition],
    ) -> Result<WorkflowRecord, StoreError>;

    /// Records matching `filter`, newest first.
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<WorkflowRecord>, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// A set of field assignments addressed by dotted paths
/// (`"stage_states.research"`, `"status"`).
#[derive(Debug, Clone, Default)]
pub struct FieldPatch {
    assignments: Vec<(String, Value)>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(self, path: &str, value: impl Serialize) -> Result<Self, StoreError> {
        let value = serde_json::to_value(value)?;
        Ok(self.set_value(path, value))
    }

    pub fn set_value(mut self, path: &str, value: Value) -> Self {
        self.assignments.push((path.to_string(), value));
        self
    }

    /// Stamp `updated_at` with the current time.
    pub fn touch(self) -> Self {
        self.set_value("updated_at", Value::String(Utc::now().to_rfc3339()))
    }

    fn apply(&self, doc: &mut Map<String, Value>) -> Result<(), StoreError> {
        for (path, value) in &self.assignments {
            let segments = split_path(path)?;
            let (leaf, parents) = segments
                .split_last()
                .ok_or_else(|| StoreError::InvalidPath(path.clone()))?;

            let mut current = &mut *doc;
            for segment in parents {
                let entry = current
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if entry.is_null() {
                    *entry = Value::Object(Map::new());
                }
                current = entry
                    .as_object_mut()
                    .ok_or_else(|| StoreError::InvalidPath(path.clone()))?;
            }
            current.insert(leaf.to_string(), value.clone());
        }
        Ok(())
    }
}

/// A precondition checked against the stored document before a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals { path: String, value: Value },
    Exists { path: String },
    NotExists { path: String },
}

impl Condition {
    pub fn equals(path: &str, value: impl Serialize) -> Result<Self, StoreError> {
        Ok(Condition::Equals {
            path: path.to_string(),
            value: serde_json::to_value(value)?,
        })
    }

    pub fn exists(path: &str) -> Self {
        Condition::Exists {
            path: path.to_string(),
        }
    }

    pub fn not_exists(path: &str) -> Self {
        Condition::NotExists {
            path: path.to_string(),
        }
    }

    /// The record is currently in `status`.
    pub fn status_is(status: WorkflowStatus) -> Self {
        Condition::Equals {
            path: "status".to_string(),
            value: serde_json::to_value(status).unwrap_or(Value::Null),
        }
    }

    /// Returns a description of the mismatch if the condition does not hold.
    fn violation(&self, doc: &Map<String, Value>) -> Result<Option<String>, StoreError> {
        let detail = match self {
            Condition::Equals { path, value } => {
                let found = lookup(doc, path)?;
                if found == Some(value) {
                    None
                } else {
                    let found = found.map_or_else(|| "<absent>".to_string(), Value::to_string);
                    Some(format!("expected {path} = {value}, found {found}"))
                }
            }
            Condition::Exists { path } => {
                if lookup(doc, path)?.is_some() {
                    None
                } else {
                    Some(format!("expected {path} to exist"))
                }
            }
            Condition::NotExists { path } => {
                if lookup(doc, path)?.is_none() {
                    None
                } else {
                    Some(format!("expected {path} to be absent"))
                }
            }
        };
        Ok(detail)
    }
}

/// Predicate for [`WorkflowStore::scan`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub statuses: Option<Vec<WorkflowStatus>>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
}

impl ScanFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_statuses(statuses: impl IntoIterator<Item = WorkflowStatus>) -> Self {
        Self {
            statuses: Some(statuses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    pub fn created_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_after = Some(cutoff);
        self
    }

    /// Both bounds are strict.
    pub fn matches(&self, record: &WorkflowRecord) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&record.status) {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if record.created_at >= before {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if record.created_at <= after {
                return false;
            }
        }
        true
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Result<Option<&'a Value>, StoreError> {
    let segments = split_path(path)?;
    let mut current = doc;
    for (i, segment) in segments.iter().enumerate() {
        let Some(value) = current.get(*segment) else {
            return Ok(None);
        };
        if i == segments.len() - 1 {
            return Ok(if value.is_null() { None } else { Some(value) });
        }
        match value.as_object() {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(None)
}

/// Check conditions, apply the patch to a copy and validate the result.
/// The caller commits the returned document only on success.
pub(crate) fn patched_document(
    id: &str,
    doc: &Map<String, Value>,
    patch: &FieldPatch,
    conditions: &[Condition],
) -> Result<(Map<String, Value>, WorkflowRecord), StoreError> {
    for condition in conditions {
        if let Some(detail) = condition.violation(doc)? {
            return Err(StoreError::ConditionFailed {
                id: id.to_string(),
                detail,
            });
        }
    }

    let mut updated = doc.clone();
    patch.apply(&mut updated)?;
    let record = WorkflowRecord::from_document(&updated).map_err(|source| {
        StoreError::InvalidRecord {
            id: id.to_string(),
            source,
        }
    })?;
    Ok((updated, record))
}

/// Sort newest first.
pub(crate) fn newest_first(records: &mut [WorkflowRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
