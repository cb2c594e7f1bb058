use tracing::info;

use crate::content::{ContentItem, ResearchReport};
use crate::error::PressroomError;
use crate::quality::{QualityGate, QualityVerdict};
use crate::store::WorkflowStore;

use super::{content_history, recent_published};

/// Content check: score the draft against its research and the titles of
/// the most recently published items.
pub async fn check_draft(
    store: &dyn WorkflowStore,
    gate: &QualityGate,
    content: &ContentItem,
    research: &ResearchReport,
) -> Result<QualityVerdict, PressroomError> {
    let published = recent_published(store, gate.config().recent_window).await?;
    let recent = content_history(&published);

    let verdict = gate.evaluate(content, research, &recent);
    info!(
        title = %content.title,
        score = verdict.weighted_score,
        decision = %verdict.decision,
        failed = verdict.failed().count(),
        "Quality check complete"
    );
    Ok(verdict)
}
