use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{error, info, warn};

use crate::collaborators::{MediaSource, NotificationChannel, PublishTarget};
use crate::content::ContentItem;
use crate::error::PressroomError;
use crate::generator::ContentGenerator;
use crate::housekeeping;
use crate::metrics::{MetricsSink, best_effort};
use crate::pipeline::{self, StageRunner, check, research, topic_stage, writing};
use crate::quality::{Decision, QualityGate, QualityVerdict};
use crate::retry::RetryPolicy;
use crate::state_machine::{
    ArchivedAttempt, FailureDecision, StageName, StageState, StateMachine, TriggerType,
    WorkflowRecord, WorkflowStatus,
};
use crate::store::{Condition, FieldPatch, ScanFilter, StoreError, WorkflowStore};
use crate::topic::{TopicCandidate, TopicSelector};

const APPROVAL_TOKEN_LEN: usize = 32;
const PREVIEW_CHARS: usize = 800;

/// Result of one `start` call that did not end in failure.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    /// Draft passed the gate and a human decision has been requested.
    AwaitingApproval {
        workflow_id: String,
        title: String,
        verdict: QualityVerdict,
        /// False when the notification could not be delivered.
        notified: bool,
    },
    Rejected {
        workflow_id: String,
        verdict: QualityVerdict,
    },
    /// Another workflow is already running or waiting for approval.
    Conflict { existing_workflow_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Decline,
}

impl ApprovalAction {
    fn target(self) -> WorkflowStatus {
        match self {
            ApprovalAction::Approve => WorkflowStatus::Published,
            ApprovalAction::Decline => WorkflowStatus::Declined,
        }
    }
}

/// Tunables for a workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Whole-attempt restarts before a workflow is marked FAILED.
    pub max_retries: u32,
    pub conflict_window: Duration,
    pub stale_horizon: Duration,
    /// Published workflows considered for topic deduplication.
    pub topic_history: usize,
    pub media_limit: usize,
    pub approver: String,
    /// Base URL for approve/decline links in the notification, if any.
    pub approval_url: Option<String>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            conflict_window: Duration::minutes(10),
            stale_horizon: Duration::hours(24),
            topic_history: 50,
            media_limit: 5,
            approver: "editor@localhost".to_string(),
            approval_url: None,
        }
    }
}

/// Everything the orchestrator talks to.
pub struct Services {
    pub store: Arc<dyn WorkflowStore>,
    pub generator: Arc<dyn ContentGenerator>,
    pub media: Arc<dyn MediaSource>,
    pub notifier: Arc<dyn NotificationChannel>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// Drives workflows through the status graph, one stage at a time.
pub struct WorkflowOrchestrator {
    store: Arc<dyn WorkflowStore>,
    generator: Arc<dyn ContentGenerator>,
    media: Arc<dyn MediaSource>,
    notifier: Arc<dyn NotificationChannel>,
    metrics: Arc<dyn MetricsSink>,
    runner: StageRunner,
    selector: TopicSelector,
    gate: QualityGate,
    settings: WorkflowSettings,
}

impl WorkflowOrchestrator {
    pub fn new(
        services: Services,
        selector: TopicSelector,
        gate: QualityGate,
        retry: RetryPolicy,
        settings: WorkflowSettings,
    ) -> Self {
        let runner = StageRunner::new(services.store.clone(), retry, services.metrics.clone());
        Self {
            store: services.store,
            generator: services.generator,
            media: services.media,
            notifier: services.notifier,
            metrics: services.metrics,
            runner,
            selector,
            gate,
            settings,
        }
    }

    pub fn store(&self) -> &dyn WorkflowStore {
        self.store.as_ref()
    }

    /// Run a new workflow from topic discovery to the approval request.
    ///
    /// A stage failure restarts the whole attempt while retries remain;
    /// after that the record is marked FAILED and
    /// [`PressroomError::WorkflowFailed`] is returned.
    pub async fn start(&self, trigger: TriggerType) -> Result<WorkflowOutcome, PressroomError> {
        match housekeeping::find_conflict(self.store(), self.settings.conflict_window, Utc::now()).await {
            Ok(Some(existing)) => {
                warn!(
                    existing_workflow_id = %existing.id,
                    status = %existing.status,
                    "Another workflow is active, not starting"
                );
                return Ok(WorkflowOutcome::Conflict {
                    existing_workflow_id: existing.id,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Duplicate check failed, starting anyway"),
        }

        let record = WorkflowRecord::new(trigger, self.settings.max_retries);
        self.store.create(&record).await?;
        let id = record.id;
        let started = Instant::now();
        let mut retries = 0;
        info!(workflow_id = %id, %trigger, "Workflow created");

        loop {
            let cause = match self.run_attempt(&id).await {
                Ok(outcome) => {
                    self.record_finish(&id, started).await;
                    return Ok(outcome);
                }
                Err(e) => e,
            };

            let current = match self.load(&id).await {
                Ok(current) => current,
                Err(e) => {
                    error!(workflow_id = %id, error = %e, "Could not reload workflow after a failure");
                    let failure = self.abandon(&id, retries, &cause).await;
                    self.record_finish(&id, started).await;
                    return Err(failure);
                }
            };
            if let FailureDecision::Restart { retry_count } =
                StateMachine::on_failure(current.retry_count, current.max_retries)
            {
                match self.restart(&current, retry_count, &cause).await {
                    Ok(()) => {
                        retries = retry_count;
                        continue;
                    }
                    Err(e) => warn!(workflow_id = %id, error = %e, "Restart not possible"),
                }
            }

            let failure = self.give_up(&current, &cause).await;
            self.record_finish(&id, started).await;
            return Err(failure);
        }
    }

    async fn run_attempt(&self, id: &str) -> Result<WorkflowOutcome, PressroomError> {
        let store = self.store.as_ref();

        self.enter_stage(id, StageName::TopicDiscovery, WorkflowStatus::Initialized).await?;
        let topic = self
            .runner
            .run(id, StageName::TopicDiscovery, || {
                topic_stage::discover_topic(
                    store,
                    &self.selector,
                    self.settings.topic_history,
                    self.settings.stale_horizon,
                )
            })
            .await?;
        self.finish_stage(id, StageName::TopicDiscovery, FieldPatch::new().set("topic", &topic)?)
            .await?;

        self.enter_stage(id, StageName::Research, WorkflowStatus::TopicSelected).await?;
        let report = self
            .runner
            .run(id, StageName::Research, || {
                research::research_topic(self.generator.as_ref(), &topic)
            })
            .await?;
        self.finish_stage(id, StageName::Research, FieldPatch::new()).await?;

        self.enter_stage(id, StageName::Writing, WorkflowStatus::ResearchComplete).await?;
        let content = self
            .runner
            .run(id, StageName::Writing, || {
                writing::write_article(
                    self.generator.as_ref(),
                    self.media.as_ref(),
                    &report,
                    self.settings.media_limit,
                )
            })
            .await?;
        let patch = FieldPatch::new()
            .set("content", &content)?
            .set("media", &content.media)?;
        self.finish_stage(id, StageName::Writing, patch).await?;

        self.enter_stage(id, StageName::ContentCheck, WorkflowStatus::DraftComplete).await?;
        let verdict = self
            .runner
            .run(id, StageName::ContentCheck, || {
                check::check_draft(store, &self.gate, &content, &report)
            })
            .await?;
        best_effort(
            "quality_score",
            self.metrics
                .quality_scored(id, verdict.weighted_score, verdict.decision),
        );

        let decided = match verdict.decision {
            Decision::Approved => WorkflowStatus::Approved,
            Decision::NeedsRevision => WorkflowStatus::NeedsRevision,
            Decision::Rejected => WorkflowStatus::Rejected,
        };
        self.transition(
            id,
            WorkflowStatus::Checking,
            decided,
            FieldPatch::new().set("verdict", &verdict)?,
        )
        .await?;

        if decided == WorkflowStatus::Rejected {
            info!(workflow_id = id, score = verdict.weighted_score, "Draft rejected by quality gate");
            return Ok(WorkflowOutcome::Rejected {
                workflow_id: id.to_string(),
                verdict,
            });
        }

        let notified = self
            .request_approval(id, decided, &topic, &content, &verdict)
            .await?;
        Ok(WorkflowOutcome::AwaitingApproval {
            workflow_id: id.to_string(),
            title: content.title,
            verdict,
            notified,
        })
    }

    async fn enter_stage(
        &self,
        id: &str,
        stage: StageName,
        from: WorkflowStatus,
    ) -> Result<WorkflowRecord, PressroomError> {
        self.transition(id, from, stage.running_status(), FieldPatch::new())
            .await
    }

    async fn finish_stage(
        &self,
        id: &str,
        stage: StageName,
        patch: FieldPatch,
    ) -> Result<(), PressroomError> {
        if let Some(done) = stage.completed_status() {
            self.transition(id, stage.running_status(), done, patch).await?;
        }
        Ok(())
    }

    /// Conditional status write guarded by the expected current status.
    async fn transition(
        &self,
        id: &str,
        from: WorkflowStatus,
        to: WorkflowStatus,
        patch: FieldPatch,
    ) -> Result<WorkflowRecord, PressroomError> {
        let invalid = || PressroomError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        };
        if StateMachine::check(from, to).is_none() {
            return Err(invalid());
        }

        let patch = patch.set("status", to)?.touch();
        match self
            .store
            .update_fields(id, patch, &[Condition::status_is(from)])
            .await
        {
            Ok(record) => {
                info!(workflow_id = id, %from, %to, "Status changed");
                Ok(record)
            }
            Err(StoreError::ConditionFailed { detail, .. }) => {
                warn!(workflow_id = id, %from, %to, %detail, "Status changed underneath us");
                Err(invalid())
            }
            Err(StoreError::NotFound(_)) => Err(PressroomError::WorkflowNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Archive the attempt's stage states and reset to INITIALIZED.
    async fn restart(
        &self,
        record: &WorkflowRecord,
        retry_count: u32,
        cause: &PressroomError,
    ) -> Result<(), PressroomError> {
        if StateMachine::retry_reset(record.status).is_none() {
            return Err(PressroomError::InvalidTransition {
                id: record.id.clone(),
                from: record.status,
                to: WorkflowStatus::Initialized,
            });
        }

        let mut archive = record.previous_attempts.clone();
        archive.push(ArchivedAttempt {
            attempt: record.retry_count,
            error: cause.to_string(),
            stage_states: record.stage_states.clone(),
        });
        let patch = FieldPatch::new()
            .set("status", WorkflowStatus::Initialized)?
            .set("retry_count", retry_count)?
            .set("stage_states", BTreeMap::<StageName, StageState>::new())?
            .set("previous_attempts", &archive)?
            .touch();
        let conditions = [
            Condition::status_is(record.status),
            Condition::equals("retry_count", record.retry_count)?,
        ];
        self.store.update_fields(&record.id, patch, &conditions).await?;

        warn!(
            workflow_id = %record.id,
            attempt = retry_count,
            max_retries = record.max_retries,
            error = %cause,
            "Restarting workflow"
        );
        Ok(())
    }

    /// Mark the workflow FAILED (best effort) and build the final error.
    async fn give_up(&self, record: &WorkflowRecord, cause: &PressroomError) -> PressroomError {
        let message = cause.to_string();
        if StateMachine::check(record.status, WorkflowStatus::Failed).is_some() {
            let result = match FieldPatch::new().set("error", &message) {
                Ok(patch) => {
                    self.transition(&record.id, record.status, WorkflowStatus::Failed, patch)
                        .await
                }
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                error!(workflow_id = %record.id, error = %e, "Failed to persist FAILED status");
            }
        }
        error!(
            workflow_id = %record.id,
            retries = record.retry_count,
            error = %message,
            "Workflow failed permanently"
        );
        PressroomError::WorkflowFailed {
            id: record.id.clone(),
            retries: record.retry_count,
            message,
        }
    }

    /// Mark the workflow FAILED without knowing its current status.
    /// Used when the record cannot be read back after a stage failure.
    async fn abandon(&self, id: &str, retries: u32, cause: &PressroomError) -> PressroomError {
        let message = cause.to_string();
        let result = match FieldPatch::new()
            .set("status", WorkflowStatus::Failed)
            .and_then(|patch| patch.set("error", &message))
        {
            Ok(patch) => self.store.update_fields(id, patch.touch(), &[]).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(workflow_id = id, error = %e, "Failed to persist FAILED status");
        }
        error!(workflow_id = id, retries, error = %message, "Workflow failed permanently");
        PressroomError::WorkflowFailed {
            id: id.to_string(),
            retries,
            message,
        }
    }

    /// Store the approval token, notify the approver and move to EMAIL_SENT.
    /// A failed notification is logged; the workflow still waits for a decision.
    async fn request_approval(
        &self,
        id: &str,
        from: WorkflowStatus,
        topic: &TopicCandidate,
        content: &ContentItem,
        verdict: &QualityVerdict,
    ) -> Result<bool, PressroomError> {
        let token = approval_token();
        let html = approval_email(id, &token, topic, content, verdict, self.settings.approval_url.as_deref());
        let subject = format!("New article: {}", truncate_chars(&content.title, 50));

        let notified = match self.notifier.send(&self.settings.approver, &subject, &html).await {
            Ok(()) => true,
            Err(e) => {
                warn!(workflow_id = id, error = %e, "Approval notification failed");
                false
            }
        };

        self.transition(
            id,
            from,
            WorkflowStatus::EmailSent,
            FieldPatch::new().set("approval_token", &token)?,
        )
        .await?;
        Ok(notified)
    }

    /// Apply a human decision to a workflow waiting for approval.
    ///
    /// When `token` is given it must match the one issued with the request.
    pub async fn resolve_approval(
        &self,
        id: &str,
        action: ApprovalAction,
        token: Option<&str>,
        publisher: &dyn PublishTarget,
    ) -> Result<WorkflowRecord, PressroomError> {
        let record = self.load(id).await?;
        let target = action.target();
        if !record.status.is_awaiting_approval() {
            return Err(PressroomError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to: target,
            });
        }
        if let Some(token) = token
            && record.approval_token.as_deref() != Some(token)
        {
            return Err(PressroomError::Validation("approval token does not match".into()));
        }

        let patch = match action {
            ApprovalAction::Approve => {
                let content = record.content.as_ref().ok_or_else(|| {
                    PressroomError::Validation(format!("workflow {id} has no content to publish"))
                })?;
                let receipt = publisher
                    .publish(content, &record.media)
                    .await
                    .map_err(|e| PressroomError::Publish(format!("{e:#}")))?;
                info!(workflow_id = id, url = %receipt.url, "Published");
                FieldPatch::new()
                    .set("published_url", &receipt.url)?
                    .set("published_at", Utc::now())?
            }
            ApprovalAction::Decline => {
                info!(workflow_id = id, "Declined");
                FieldPatch::new()
            }
        };

        let updated = self
            .transition(id, WorkflowStatus::EmailSent, target, patch)
            .await?;
        best_effort(
            "workflow_duration",
            self.metrics.workflow_finished(
                id,
                updated.age_at_last_update(),
                stages_run(&updated),
                updated.status,
            ),
        );
        Ok(updated)
    }

    /// Find the workflow waiting on `token`.
    pub async fn find_by_token(&self, token: &str) -> Result<Option<WorkflowRecord>, PressroomError> {
        let waiting = self
            .store
            .scan(&ScanFilter::with_statuses([WorkflowStatus::EmailSent]))
            .await?;
        Ok(waiting
            .into_iter()
            .find(|record| record.approval_token.as_deref() == Some(token)))
    }

    /// Most recent published workflows, newest first.
    pub async fn recent_published(&self, limit: usize) -> Result<Vec<WorkflowRecord>, PressroomError> {
        Ok(pipeline::recent_published(self.store(), limit).await?)
    }

    async fn load(&self, id: &str) -> Result<WorkflowRecord, PressroomError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| PressroomError::WorkflowNotFound(id.to_string()))
    }

    async fn record_finish(&self, id: &str, started: Instant) {
        match self.load(id).await {
            Ok(record) => best_effort(
                "workflow_duration",
                self.metrics.workflow_finished(
                    id,
                    started.elapsed().as_secs_f64(),
                    stages_run(&record),
                    record.status,
                ),
            ),
            Err(e) => warn!(workflow_id = id, error = %e, "Could not load workflow for metrics"),
        }
    }
}

/// Stage executions across every attempt of a workflow.
fn stages_run(record: &WorkflowRecord) -> usize {
    record.stage_states.len()
        + record
            .previous_attempts
            .iter()
            .map(|attempt| attempt.stage_states.len())
            .sum::<usize>()
}

fn approval_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(APPROVAL_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn approval_email(
    id: &str,
    token: &str,
    topic: &TopicCandidate,
    content: &ContentItem,
    verdict: &QualityVerdict,
    approval_url: Option<&str>,
) -> String {
    let keywords = content
        .seo
        .as_ref()
        .map(|seo| seo.keywords.join(", "))
        .unwrap_or_default();
    let images: String = content
        .media
        .iter()
        .take(3)
        .map(|m| {
            format!(
                "<img src=\"{}\" alt=\"{}\" width=\"200\">",
                escape_html(&m.url),
                escape_html(&m.alt_text)
            )
        })
        .collect();
    let revisions: String = verdict
        .feedback
        .revisions
        .iter()
        .map(|r| format!("<li>{}</li>", escape_html(r)))
        .collect();
    let actions = match approval_url {
        Some(base) => {
            let base = base.trim_end_matches('/');
            format!(
                "<p><a href=\"{base}/approve?token={token}&amp;action=approve\">Approve and publish</a> | \
                 <a href=\"{base}/approve?token={token}&amp;action=decline\">Decline</a></p>"
            )
        }
        None => format!(
            "<p>Approve: <code>pressroom approve {id} --token {token}</code><br>\
             Decline: <code>pressroom decline {id} --token {token}</code></p>"
        ),
    };

    format!(
        "<html><body>\n\
         <h1>New article ready for review</h1>\n\
         <h2>{title}</h2>\n\
         <p><strong>Category:</strong> {category}<br>\
         <strong>Word count:</strong> {words}<br>\
         <strong>Reading time:</strong> {minutes} min<br>\
         <strong>Keywords:</strong> {keywords}<br>\
         <strong>Quality:</strong> {score:.0}/100 ({decision})</p>\n\
         <p>{recommendation}</p>\n\
         <ul>{revisions}</ul>\n\
         <h3>Preview</h3>\n<p>{preview}</p>\n\
         <h3>Images ({image_count})</h3>\n<div>{images}</div>\n\
         {actions}\n\
         <p><small>Workflow {id}</small></p>\n\
         </body></html>\n",
        title = escape_html(&content.title),
        category = escape_html(&topic.category),
        words = content.word_count,
        minutes = content.reading_time_minutes,
        keywords = escape_html(&keywords),
        score = verdict.weighted_score * 100.0,
        decision = verdict.decision,
        recommendation = escape_html(&verdict.recommendation),
        preview = escape_html(&truncate_chars(&content.plain_text(), PREVIEW_CHARS)),
        image_count = content.media.len(),
    )
}
