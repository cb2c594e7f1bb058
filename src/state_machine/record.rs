use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::state::WorkflowStatus;
use crate::content::{ContentItem, MediaItem};
use crate::quality::QualityVerdict;
use crate::topic::TopicCandidate;

/// Current persisted layout. Records without a `schema_version` are version 1.
pub const SCHEMA_VERSION: u32 = 2;

/// One discrete pipeline unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    TopicDiscovery,
    Research,
    Writing,
    ContentCheck,
}

impl StageName {
    pub const ORDER: [StageName; 4] = [
        StageName::TopicDiscovery,
        StageName::Research,
        StageName::Writing,
        StageName::ContentCheck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::TopicDiscovery => "topic_discovery",
            StageName::Research => "research",
            StageName::Writing => "writing",
            StageName::ContentCheck => "content_check",
        }
    }

    /// Workflow status while the stage is executing.
    pub fn running_status(self) -> WorkflowStatus {
        match self {
            StageName::TopicDiscovery => WorkflowStatus::DiscoveringTopic,
            StageName::Research => WorkflowStatus::Researching,
            StageName::Writing => WorkflowStatus::Writing,
            StageName::ContentCheck => WorkflowStatus::Checking,
        }
    }

    /// Workflow status once the stage output is persisted. The check stage
    /// resolves to a decision status instead, so it has none.
    pub fn completed_status(self) -> Option<WorkflowStatus> {
        match self {
            StageName::TopicDiscovery => Some(WorkflowStatus::TopicSelected),
            StageName::Research => Some(WorkflowStatus::ResearchComplete),
            StageName::Writing => Some(WorkflowStatus::DraftComplete),
            StageName::ContentCheck => None,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }
}

/// Captured execution of one stage within one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StageState {
    pub fn running(started_at: DateTime<Utc>) -> Self {
        Self {
            status: StageStatus::Running,
            started_at,
            completed_at: None,
            duration_seconds: None,
            output: None,
            error: None,
            metadata: None,
        }
    }

    pub fn completed(
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        output: Value,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            status: StageStatus::Completed,
            started_at,
            completed_at: Some(completed_at),
            duration_seconds: Some(elapsed_seconds(started_at, completed_at)),
            output: Some(output),
            error: None,
            metadata,
        }
    }

    pub fn failed(
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        error: String,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            status: StageStatus::Failed,
            started_at,
            completed_at: Some(completed_at),
            duration_seconds: Some(elapsed_seconds(started_at, completed_at)),
            output: None,
            error: Some(error),
            metadata,
        }
    }
}

fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

/// What started a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Daily,
    Manual,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::Daily => f.write_str("daily"),
            TriggerType::Manual => f.write_str("manual"),
        }
    }
}

/// Stage states from an abandoned attempt, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedAttempt {
    pub attempt: u32,
    pub error: String,
    pub stage_states: BTreeMap<StageName, StageState>,
}

/// Persistent record of one workflow.
///
/// Everything after `schema_version` arrived in a later layout; absent
/// fields deserialize to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub stage_states: BTreeMap<StageName, StageState>,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub trigger_type: TriggerType,
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<QualityVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_attempts: Vec<ArchivedAttempt>,
}

fn legacy_schema_version() -> u32 {
    1
}

impl WorkflowRecord {
    pub fn new(trigger_type: TriggerType, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: WorkflowStatus::Initialized,
            created_at: now,
            updated_at: now,
            stage_states: BTreeMap::new(),
            retry_count: 0,
            max_retries,
            trigger_type,
            schema_version: SCHEMA_VERSION,
            error: None,
            verdict: None,
            topic: None,
            content: None,
            media: Vec::new(),
            approval_token: None,
            published_url: None,
            published_at: None,
            previous_attempts: Vec::new(),
        }
    }

    /// Decode a stored document, applying defaults for fields that
    /// predate its schema version.
    pub fn from_document(doc: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(doc.clone()))
    }

    pub fn to_document(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "workflow record serialized to non-object: {other}"
            ))),
        }
    }

    pub fn stage(&self, name: StageName) -> Option<&StageState> {
        self.stage_states.get(&name)
    }

    pub fn needs_migration(&self) -> bool {
        self.schema_version < SCHEMA_VERSION
    }

    /// Seconds from creation to the last update.
    pub fn age_at_last_update(&self) -> f64 {
        elapsed_seconds(self.created_at, self.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_starts_initialized() {
        let record = WorkflowRecord::new(TriggerType::Manual, 2);
        assert_eq!(record.status, WorkflowStatus::Initialized);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.max_retries, 2);
        assert_eq!(record.schema_version, SCHEMA_VERSION);
        assert!(record.stage_states.is_empty());
        assert!(Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn stage_names_serialize_as_map_keys() {
        let mut record = WorkflowRecord::new(TriggerType::Daily, 1);
        record
            .stage_states
            .insert(StageName::TopicDiscovery, StageState::running(Utc::now()));
        let doc = record.to_document().unwrap();
        assert!(doc["stage_states"].get("topic_discovery").is_some());
        assert_eq!(doc["status"], json!("initialized"));
    }

    #[test]
    fn version_one_document_loads_with_defaults() {
        let doc = json!({
            "id": "legacy-1",
            "status": "email_sent",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:05:00Z",
            "max_retries": 2
        });
        let record = WorkflowRecord::from_document(doc.as_object().unwrap()).unwrap();
        assert_eq!(record.schema_version, 1);
        assert!(record.needs_migration());
        assert_eq!(record.trigger_type, TriggerType::Daily);
        assert_eq!(record.retry_count, 0);
        assert!(record.stage_states.is_empty());
        assert!(record.verdict.is_none());
        assert!(record.previous_attempts.is_empty());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let doc = json!({
            "id": "bad",
            "status": "half_done",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z",
            "max_retries": 2
        });
        assert!(WorkflowRecord::from_document(doc.as_object().unwrap()).is_err());
    }

    #[test]
    fn completed_stage_records_duration() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(1500);
        let state = StageState::completed(start, end, json!({"ok": true}), None);
        assert_eq!(state.status, StageStatus::Completed);
        assert_eq!(state.duration_seconds, Some(1.5));
        assert!(state.status.is_terminal());
    }

    #[test]
    fn stage_order_maps_to_statuses() {
        assert_eq!(
            StageName::Research.running_status(),
            WorkflowStatus::Researching
        );
        assert_eq!(
            StageName::Writing.completed_status(),
            Some(WorkflowStatus::DraftComplete)
        );
        assert_eq!(StageName::ContentCheck.completed_status(), None);
        assert_eq!(StageName::ORDER[0], StageName::TopicDiscovery);
    }
}
