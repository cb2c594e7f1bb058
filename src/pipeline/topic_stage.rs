use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::error::PressroomError;
use crate::housekeeping;
use crate::store::WorkflowStore;
use crate::topic::{TopicCandidate, TopicSelector};

use super::{recent_published, topic_history};

/// Topic discovery: clear stale approval requests, then pick the next topic
/// against the most recent `history_limit` published workflows.
pub async fn discover_topic(
    store: &dyn WorkflowStore,
    selector: &TopicSelector,
    history_limit: usize,
    stale_horizon: Duration,
) -> Result<TopicCandidate, PressroomError> {
    if let Err(e) = housekeeping::sweep_stale(store, stale_horizon, Utc::now()).await {
        warn!(error = %e, "Stale sweep failed, continuing with topic discovery");
    }

    let published = recent_published(store, history_limit).await?;
    let history = topic_history(&published);
    debug!(history = history.len(), "Loaded topic history");

    Ok(selector.select_next(&history))
}
