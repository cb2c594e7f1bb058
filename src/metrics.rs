//! Best-effort operational metrics.
//!
//! A failing sink is logged and otherwise ignored; metrics never affect
//! workflow control flow.

use tracing::{info, warn};

use crate::quality::Decision;
use crate::state_machine::{StageName, WorkflowStatus};

pub trait MetricsSink: Send + Sync {
    fn stage_finished(&self, stage: StageName, duration_secs: f64, success: bool) -> anyhow::Result<()>;

    fn stage_error(&self, workflow_id: &str, stage: StageName, error: &str) -> anyhow::Result<()>;

    fn quality_scored(&self, workflow_id: &str, score: f64, decision: Decision) -> anyhow::Result<()>;

    fn workflow_finished(
        &self,
        workflow_id: &str,
        duration_secs: f64,
        stages_run: usize,
        status: WorkflowStatus,
    ) -> anyhow::Result<()>;
}

/// Emits metrics as structured tracing events under the
/// `pressroom::metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn stage_finished(&self, stage: StageName, duration_secs: f64, success: bool) -> anyhow::Result<()> {
        info!(target: "pressroom::metrics", metric = "stage_duration", %stage, duration_secs, success);
        Ok(())
    }

    fn stage_error(&self, workflow_id: &str, stage: StageName, error: &str) -> anyhow::Result<()> {
        info!(target: "pressroom::metrics", metric = "stage_error", workflow_id, %stage, error);
        Ok(())
    }

    fn quality_scored(&self, workflow_id: &str, score: f64, decision: Decision) -> anyhow::Result<()> {
        info!(target: "pressroom::metrics", metric = "quality_score", workflow_id, score, %decision);
        Ok(())
    }

    fn workflow_finished(
        &self,
        workflow_id: &str,
        duration_secs: f64,
        stages_run: usize,
        status: WorkflowStatus,
    ) -> anyhow::Result<()> {
        info!(
            target: "pressroom::metrics",
            metric = "workflow_duration",
            workflow_id,
            duration_secs,
            stages_run,
            %status
        );
        Ok(())
    }
}

/// Run a metrics call, logging instead of propagating failure.
pub fn best_effort(what: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!(metric = what, error = %e, "Failed to record metric");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingMetrics;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn tracing_sink_never_fails() {
        let sink = TracingMetrics;
        assert!(sink.stage_finished(StageName::Research, 1.2, true).is_ok());
        assert!(sink.quality_scored("wf", 0.75, Decision::Rejected).is_ok());
        assert!(
            sink.workflow_finished("wf", 10.0, 4, WorkflowStatus::EmailSent)
                .is_ok()
        );
    }

    #[test]
    fn best_effort_swallows_errors() {
        let sink = RecordingMetrics::failing();
        best_effort("stage_duration", sink.stage_finished(StageName::Writing, 0.1, false));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
