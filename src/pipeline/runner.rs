use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::PressroomError;
use crate::metrics::{MetricsSink, best_effort};
use crate::retry::RetryPolicy;
use crate::state_machine::{StageName, StageState, StageStatus};
use crate::store::{Condition, FieldPatch, StoreError, WorkflowStore};

/// Wraps one pipeline stage with state capture, timing and retries.
///
/// The stage entry is written as `running` before the operation starts and
/// replaced by a terminal entry afterwards. Both writes are conditional, so a
/// stage cannot start twice within one attempt and a terminal entry is never
/// overwritten.
pub struct StageRunner {
    store: Arc<dyn WorkflowStore>,
    retry: RetryPolicy,
    metrics: Arc<dyn MetricsSink>,
}

impl StageRunner {
    pub fn new(store: Arc<dyn WorkflowStore>, retry: RetryPolicy, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            store,
            retry,
            metrics,
        }
    }

    /// Run `operation` as `stage` of `workflow_id`.
    ///
    /// Transient errors are retried per the retry policy; anything else fails
    /// the stage immediately. Errors come back as [`PressroomError::Stage`].
    pub async fn run<T, F, Fut>(
        &self,
        workflow_id: &str,
        stage: StageName,
        mut operation: F,
    ) -> Result<T, PressroomError>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PressroomError>>,
    {
        let path = format!("stage_states.{stage}");
        let started_at = Utc::now();

        let begin = FieldPatch::new()
            .set(&path, StageState::running(started_at))
            .map_err(|e| wrap(stage, e.into()))?
            .touch();
        match self
            .store
            .update_fields(workflow_id, begin, &[Condition::not_exists(&path)])
            .await
        {
            Ok(_) => {}
            Err(StoreError::ConditionFailed { .. }) => {
                return Err(PressroomError::StageReentry(stage));
            }
            Err(e) => return Err(wrap(stage, e.into())),
        }
        info!(workflow_id, stage = %stage, "Stage started");

        let attempts = AtomicU32::new(0);
        let result = self
            .retry
            .run_transient(stage.as_str(), || {
                attempts.fetch_add(1, Ordering::Relaxed);
                operation()
            })
            .await
            .and_then(|value| {
                let output = serde_json::to_value(&value)?;
                Ok((value, output))
            });

        let finished_at = Utc::now();
        let metadata = Some(json!({ "attempts": attempts.load(Ordering::Relaxed) }));
        let running = Condition::equals(&format!("{path}.status"), StageStatus::Running)
            .map_err(|e| wrap(stage, e.into()))?;

        match result {
            Ok((value, output)) => {
                let state = StageState::completed(started_at, finished_at, output, metadata);
                let duration = state.duration_seconds.unwrap_or_default();
                let end = FieldPatch::new()
                    .set(&path, state)
                    .map_err(|e| wrap(stage, e.into()))?
                    .touch();
                self.store
                    .update_fields(workflow_id, end, &[running])
                    .await
                    .map_err(|e| wrap(stage, e.into()))?;

                best_effort("stage_duration", self.metrics.stage_finished(stage, duration, true));
                info!(workflow_id, stage = %stage, duration_secs = duration, "Stage completed");
                Ok(value)
            }
            Err(e) => {
                let state = StageState::failed(started_at, finished_at, e.to_string(), metadata);
                let duration = state.duration_seconds.unwrap_or_default();
                match FieldPatch::new().set(&path, state) {
                    Ok(end) => {
                        if let Err(store_err) =
                            self.store.update_fields(workflow_id, end.touch(), &[running]).await
                        {
                            error!(workflow_id, stage = %stage, error = %store_err, "Failed to record stage failure");
                        }
                    }
                    Err(store_err) => {
                        error!(workflow_id, stage = %stage, error = %store_err, "Failed to encode stage failure");
                    }
                }

                best_effort("stage_duration", self.metrics.stage_finished(stage, duration, false));
                best_effort(
                    "stage_error",
                    self.metrics.stage_error(workflow_id, stage, &e.to_string()),
                );
                error!(workflow_id, stage = %stage, error = %e, "Stage failed");
                Err(wrap(stage, e))
            }
        }
    }
}

fn wrap(stage: StageName, source: PressroomError) -> PressroomError {
    PressroomError::Stage {
        stage,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::RecordingMetrics;
    use crate::state_machine::{TriggerType, WorkflowRecord};
    use crate::store::MemoryWorkflowStore;
    use std::io;

    async fn setup() -> (Arc<MemoryWorkflowStore>, Arc<RecordingMetrics>, StageRunner, String) {
        let store = Arc::new(MemoryWorkflowStore::new());
        let metrics = Arc::new(RecordingMetrics::default());
        let record = WorkflowRecord::new(TriggerType::Manual, 2);
        store.create(&record).await.unwrap();
        let runner = StageRunner::new(store.clone(), RetryPolicy::immediate(2), metrics.clone());
        (store, metrics, runner, record.id)
    }

    #[tokio::test]
    async fn success_records_completed_state_with_output() {
        let (store, metrics, runner, id) = setup().await;
        let out = runner
            .run(&id, StageName::Research, || async { Ok::<_, PressroomError>(vec!["fact"]) })
            .await
            .unwrap();
        assert_eq!(out, vec!["fact"]);

        let record = store.get(&id).await.unwrap().unwrap();
        let state = record.stage(StageName::Research).unwrap();
        assert_eq!(state.status, StageStatus::Completed);
        assert_eq!(state.output, Some(json!(["fact"])));
        assert_eq!(state.metadata, Some(json!({"attempts": 1})));
        assert!(state.completed_at.is_some());
        assert_eq!(
            *metrics.stages.lock().unwrap(),
            vec![(StageName::Research, true)]
        );
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let (store, _metrics, runner, id) = setup().await;
        let calls = AtomicU32::new(0);
        let out = runner
            .run(&id, StageName::Writing, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PressroomError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")))
                    } else {
                        Ok("draft")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "draft");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(
            record.stage(StageName::Writing).unwrap().metadata,
            Some(json!({"attempts": 3}))
        );
    }

    #[tokio::test]
    async fn validation_error_fails_fast_and_is_recorded() {
        let (store, metrics, runner, id) = setup().await;
        let calls = AtomicU32::new(0);
        let err = runner
            .run(&id, StageName::Writing, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(PressroomError::Validation("missing title".into())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.stage(), Some(StageName::Writing));
        assert_eq!(err.to_string(), "Stage writing failed: Validation error: missing title");

        let record = store.get(&id).await.unwrap().unwrap();
        let state = record.stage(StageName::Writing).unwrap();
        assert_eq!(state.status, StageStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("Validation error: missing title"));
        assert_eq!(
            *metrics.stages.lock().unwrap(),
            vec![(StageName::Writing, false)]
        );
    }

    #[tokio::test]
    async fn stage_cannot_reenter_within_attempt() {
        let (_store, _metrics, runner, id) = setup().await;
        runner
            .run(&id, StageName::TopicDiscovery, || async { Ok::<_, PressroomError>(1) })
            .await
            .unwrap();
        let err = runner
            .run(&id, StageName::TopicDiscovery, || async { Ok::<_, PressroomError>(2) })
            .await
            .unwrap_err();
        assert!(matches!(err, PressroomError::StageReentry(StageName::TopicDiscovery)));
    }

    #[tokio::test]
    async fn failing_metrics_do_not_affect_the_stage() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let record = WorkflowRecord::new(TriggerType::Manual, 2);
        store.create(&record).await.unwrap();
        let runner = StageRunner::new(
            store.clone(),
            RetryPolicy::immediate(0),
            Arc::new(RecordingMetrics::failing()),
        );
        let out = runner
            .run(&record.id, StageName::Research, || async { Ok::<_, PressroomError>(5) })
            .await
            .unwrap();
        assert_eq!(out, 5);
    }

    #[tokio::test]
    async fn missing_workflow_is_a_stage_error() {
        let (_store, _metrics, runner, _id) = setup().await;
        let err = runner
            .run("nope", StageName::Research, || async { Ok::<_, PressroomError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PressroomError::Stage { stage: StageName::Research, .. }
        ));
    }
}
