//! Pipeline stages and the runner that records them.
//!
//! Each stage body is a plain async function over its collaborators. The
//! orchestrator wraps every call in [`StageRunner::run`] so the stage entry,
//! timing and retries are captured the same way for all of them.

pub mod check;
pub mod research;
pub mod runner;
pub mod topic_stage;
pub mod writing;

use crate::content::PublishedItem;
use crate::state_machine::{WorkflowRecord, WorkflowStatus};
use crate::store::{ScanFilter, StoreError, WorkflowStore};

pub use runner::StageRunner;

/// Published workflows, newest first, at most `limit`.
pub async fn recent_published(
    store: &dyn WorkflowStore,
    limit: usize,
) -> Result<Vec<WorkflowRecord>, StoreError> {
    let mut records = store
        .scan(&ScanFilter::with_statuses([WorkflowStatus::Published]))
        .await?;
    records.truncate(limit);
    Ok(records)
}

/// Topic titles chosen by published workflows, for topic deduplication.
pub fn topic_history(records: &[WorkflowRecord]) -> Vec<PublishedItem> {
    records
        .iter()
        .filter_map(|record| {
            let topic = record.topic.as_ref()?;
            Some(PublishedItem {
                title: topic.title.clone(),
                category: topic.category.clone(),
                created_at: record.created_at,
            })
        })
        .collect()
}

/// Titles of published content, for the novelty check.
pub fn content_history(records: &[WorkflowRecord]) -> Vec<PublishedItem> {
    records
        .iter()
        .filter_map(|record| {
            let content = record.content.as_ref()?;
            let category = record
                .topic
                .as_ref()
                .map(|t| t.category.clone())
                .unwrap_or_default();
            Some(PublishedItem {
                title: content.title.clone(),
                category,
                created_at: record.created_at,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::generator::{ContentGenerator, GenerationRequest, GeneratorError};

    /// Replays canned responses in order; the last one repeats.
    pub struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, GeneratorError>>>,
        pub calls: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new(responses: Vec<Result<String, GeneratorError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn always(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn replay(result: &Result<String, GeneratorError>) -> Result<String, GeneratorError> {
        match result {
            Ok(text) => Ok(text.clone()),
            Err(GeneratorError::RateLimited { retry_after_ms }) => Err(GeneratorError::RateLimited {
                retry_after_ms: *retry_after_ms,
            }),
            Err(GeneratorError::ApiError { status, message }) => Err(GeneratorError::ApiError {
                status: *status,
                message: message.clone(),
            }),
            Err(GeneratorError::Timeout) => Err(GeneratorError::Timeout),
            Err(_) => Err(GeneratorError::EmptyResponse),
        }
    }

    #[async_trait]
    impl ContentGenerator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap_or(Err(GeneratorError::EmptyResponse))
            } else {
                responses
                    .front()
                    .map(replay)
                    .unwrap_or(Err(GeneratorError::EmptyResponse))
            }
        }
    }
}
