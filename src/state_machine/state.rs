use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a content workflow.
///
/// INITIALIZED → DISCOVERING_TOPIC → TOPIC_SELECTED → RESEARCHING →
/// RESEARCH_COMPLETE → WRITING → DRAFT_COMPLETE → CHECKING →
/// {APPROVED | NEEDS_REVISION | REJECTED} → EMAIL_SENT → {PUBLISHED | DECLINED},
/// with FAILED reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Initialized,
    DiscoveringTopic,
    TopicSelected,
    Researching,
    ResearchComplete,
    Writing,
    DraftComplete,
    Checking,
    Approved,
    NeedsRevision,
    Rejected,
    EmailSent,
    Published,
    Declined,
    Failed,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStatus::Initialized => "INITIALIZED",
            WorkflowStatus::DiscoveringTopic => "DISCOVERING_TOPIC",
            WorkflowStatus::TopicSelected => "TOPIC_SELECTED",
            WorkflowStatus::Researching => "RESEARCHING",
            WorkflowStatus::ResearchComplete => "RESEARCH_COMPLETE",
            WorkflowStatus::Writing => "WRITING",
            WorkflowStatus::DraftComplete => "DRAFT_COMPLETE",
            WorkflowStatus::Checking => "CHECKING",
            WorkflowStatus::Approved => "APPROVED",
            WorkflowStatus::NeedsRevision => "NEEDS_REVISION",
            WorkflowStatus::Rejected => "REJECTED",
            WorkflowStatus::EmailSent => "EMAIL_SENT",
            WorkflowStatus::Published => "PUBLISHED",
            WorkflowStatus::Declined => "DECLINED",
            WorkflowStatus::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 15] = [
        WorkflowStatus::Initialized,
        WorkflowStatus::DiscoveringTopic,
        WorkflowStatus::TopicSelected,
        WorkflowStatus::Researching,
        WorkflowStatus::ResearchComplete,
        WorkflowStatus::Writing,
        WorkflowStatus::DraftComplete,
        WorkflowStatus::Checking,
        WorkflowStatus::Approved,
        WorkflowStatus::NeedsRevision,
        WorkflowStatus::Rejected,
        WorkflowStatus::EmailSent,
        WorkflowStatus::Published,
        WorkflowStatus::Declined,
        WorkflowStatus::Failed,
    ];

    /// Statuses reachable in one forward step (FAILED excluded).
    pub fn successors(self) -> &'static [WorkflowStatus] {
        use WorkflowStatus::*;
        match self {
            Initialized => &[DiscoveringTopic],
            DiscoveringTopic => &[TopicSelected],
            TopicSelected => &[Researching],
            Researching => &[ResearchComplete],
            ResearchComplete => &[Writing],
            Writing => &[DraftComplete],
            DraftComplete => &[Checking],
            Checking => &[Approved, NeedsRevision, Rejected],
            Approved | NeedsRevision => &[EmailSent],
            EmailSent => &[Published, Declined],
            Rejected | Published | Declined | Failed => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Rejected
                | WorkflowStatus::Published
                | WorkflowStatus::Declined
                | WorkflowStatus::Failed
        )
    }

    /// The pipeline is still executing stages or preparing the approval request.
    pub fn is_in_progress(self) -> bool {
        !self.is_terminal() && self != WorkflowStatus::EmailSent
    }

    /// A human decision has been requested and not yet received.
    pub fn is_awaiting_approval(self) -> bool {
        self == WorkflowStatus::EmailSent
    }

    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        if next == WorkflowStatus::Failed {
            return !self.is_terminal();
        }
        self.successors().contains(&next)
    }
}

/// Outcome of validating a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Forward move along the status graph.
    Advance {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
    /// Explicit reset to INITIALIZED before a whole-attempt restart.
    RetryReset { from: WorkflowStatus },
    /// Permanent failure.
    Fail { from: WorkflowStatus },
}

/// What to do after a stage failure has exhausted its own retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Restart the whole attempt; carries the new retry count.
    Restart { retry_count: u32 },
    /// Retries spent, the workflow is permanently failed.
    GiveUp,
}

/// Validates workflow status changes against the status graph.
pub struct StateMachine;

impl StateMachine {
    /// Validate a move from `from` to `to`.
    ///
    /// Returns `None` for anything the graph does not allow, including any
    /// backward move. Backward moves only happen through [`retry_reset`].
    ///
    /// [`retry_reset`]: StateMachine::retry_reset
    pub fn check(from: WorkflowStatus, to: WorkflowStatus) -> Option<Transition> {
        if !from.can_transition_to(to) {
            return None;
        }
        if to == WorkflowStatus::Failed {
            Some(Transition::Fail { from })
        } else {
            Some(Transition::Advance { from, to })
        }
    }

    /// Validate an explicit reset to INITIALIZED. Only non-terminal
    /// statuses before the approval request can be reset.
    pub fn retry_reset(from: WorkflowStatus) -> Option<Transition> {
        if from.is_in_progress() {
            Some(Transition::RetryReset { from })
        } else {
            None
        }
    }

    /// Decide between a whole-attempt restart and permanent failure.
    pub fn on_failure(retry_count: u32, max_retries: u32) -> FailureDecision {
        if retry_count < max_retries {
            FailureDecision::Restart {
                retry_count: retry_count + 1,
            }
        } else {
            FailureDecision::GiveUp
        }
    }
}
