//! Store maintenance: stale approval sweep, the duplicate-invocation
//! pre-check and additive schema migration.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::state_machine::{SCHEMA_VERSION, WorkflowRecord, WorkflowStatus};
use crate::store::{Condition, FieldPatch, ScanFilter, StoreError, WorkflowStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Delete EMAIL_SENT records created strictly before `now - horizon`.
/// Individual delete failures are logged and reported, not raised.
pub async fn sweep_stale(
    store: &dyn WorkflowStore,
    horizon: Duration,
    now: DateTime<Utc>,
) -> Result<SweepReport, StoreError> {
    let cutoff = now - horizon;
    let stale = store
        .scan(&ScanFilter::with_statuses([WorkflowStatus::EmailSent]).created_before(cutoff))
        .await?;

    let mut report = SweepReport::default();
    for record in stale {
        match store.delete(&record.id).await {
            Ok(()) => {
                info!(workflow_id = %record.id, created_at = %record.created_at, "Deleted stale workflow");
                report.deleted.push(record.id);
            }
            Err(e) => {
                warn!(workflow_id = %record.id, error = %e, "Failed to delete stale workflow");
                report.failed.push(record.id);
            }
        }
    }

    info!(
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        cutoff = %cutoff,
        "Stale sweep complete"
    );
    Ok(report)
}

/// Statuses that block a new invocation.
pub fn blocking_statuses() -> Vec<WorkflowStatus> {
    WorkflowStatus::ALL
        .into_iter()
        .filter(|s| s.is_in_progress() || s.is_awaiting_approval())
        .collect()
}

/// Find a workflow that is still running or awaiting approval and was
/// created within `window` of `now`.
///
/// This is a scan followed by a separate create, so two invocations racing
/// inside the gap can both pass.
pub async fn find_conflict(
    store: &dyn WorkflowStore,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<Option<WorkflowRecord>, StoreError> {
    let filter = ScanFilter::with_statuses(blocking_statuses()).created_after(now - window);
    Ok(store.scan(&filter).await?.into_iter().next())
}

/// Rewrite records stored under an older schema so every defaulted field is
/// explicit and `schema_version` is current. Returns the migrated ids.
pub async fn migrate_schema(store: &dyn WorkflowStore) -> Result<Vec<String>, StoreError> {
    let mut migrated = Vec::new();
    for record in store.scan(&ScanFilter::all()).await? {
        if !record.needs_migration() {
            continue;
        }
        let patch = FieldPatch::new()
            .set("stage_states", &record.stage_states)?
            .set("retry_count", record.retry_count)?
            .set("trigger_type", record.trigger_type)?
            .set("schema_version", SCHEMA_VERSION)?;
        let guard = if record.schema_version == 1 {
            Condition::not_exists("schema_version")
        } else {
            Condition::equals("schema_version", record.schema_version)?
        };
        match store.update_fields(&record.id, patch, &[guard]).await {
            Ok(_) => {
                info!(workflow_id = %record.id, from = record.schema_version, to = SCHEMA_VERSION, "Migrated workflow record");
                migrated.push(record.id);
            }
            Err(StoreError::ConditionFailed { .. }) => {
                info!(workflow_id = %record.id, "Record migrated concurrently, skipping");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::TriggerType;
    use crate::store::MemoryWorkflowStore;
    use serde_json::json;

    fn record_at(status: WorkflowStatus, created_at: DateTime<Utc>) -> WorkflowRecord {
        let mut record = WorkflowRecord::new(TriggerType::Daily, 2);
        record.status = status;
        record.created_at = created_at;
        record.updated_at = created_at;
        record
    }

    #[tokio::test]
    async fn sweep_deletes_only_records_past_the_horizon() {
        let store = MemoryWorkflowStore::new();
        let now = Utc::now();
        let horizon = Duration::hours(24);

        let stale = record_at(WorkflowStatus::EmailSent, now - horizon - Duration::seconds(1));
        let fresh = record_at(WorkflowStatus::EmailSent, now - horizon + Duration::seconds(1));
        let old_published = record_at(WorkflowStatus::Published, now - Duration::days(30));
        for record in [&stale, &fresh, &old_published] {
            store.create(record).await.unwrap();
        }

        let report = sweep_stale(&store, horizon, now).await.unwrap();
        assert_eq!(report.deleted, vec![stale.id.clone()]);
        assert!(report.failed.is_empty());
        assert!(store.get(&stale.id).await.unwrap().is_none());
        assert!(store.get(&fresh.id).await.unwrap().is_some());
        assert!(store.get(&old_published.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn conflict_found_for_recent_active_workflow() {
        let store = MemoryWorkflowStore::new();
        let now = Utc::now();
        let running = record_at(WorkflowStatus::Researching, now - Duration::minutes(3));
        store.create(&running).await.unwrap();

        let conflict = find_conflict(&store, Duration::minutes(10), now).await.unwrap();
        assert_eq!(conflict.map(|r| r.id), Some(running.id));
    }

    #[tokio::test]
    async fn no_conflict_for_old_or_terminal_workflows() {
        let store = MemoryWorkflowStore::new();
        let now = Utc::now();
        store
            .create(&record_at(WorkflowStatus::Writing, now - Duration::minutes(30)))
            .await
            .unwrap();
        store
            .create(&record_at(WorkflowStatus::Failed, now - Duration::minutes(1)))
            .await
            .unwrap();
        store
            .create(&record_at(WorkflowStatus::Rejected, now - Duration::minutes(1)))
            .await
            .unwrap();

        assert!(
            find_conflict(&store, Duration::minutes(10), now)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn awaiting_approval_blocks() {
        let statuses = blocking_statuses();
        assert!(statuses.contains(&WorkflowStatus::EmailSent));
        assert!(statuses.contains(&WorkflowStatus::Initialized));
        assert!(!statuses.contains(&WorkflowStatus::Published));
        assert!(!statuses.contains(&WorkflowStatus::Failed));
    }

    #[tokio::test]
    async fn migrate_rewrites_legacy_records_once() {
        let store = MemoryWorkflowStore::new();
        let legacy = json!({
            "id": "legacy",
            "status": "published",
            "created_at": "2024-02-01T00:00:00Z",
            "updated_at": "2024-02-01T00:00:00Z",
            "max_retries": 2
        });
        store
            .insert_raw("legacy", legacy.as_object().unwrap().clone())
            .await;
        store
            .create(&WorkflowRecord::new(TriggerType::Manual, 2))
            .await
            .unwrap();

        let migrated = migrate_schema(&store).await.unwrap();
        assert_eq!(migrated, vec!["legacy".to_string()]);

        let record = store.get("legacy").await.unwrap().unwrap();
        assert_eq!(record.schema_version, SCHEMA_VERSION);
        assert_eq!(record.trigger_type, TriggerType::Daily);

        assert!(migrate_schema(&store).await.unwrap().is_empty());
    }
}
