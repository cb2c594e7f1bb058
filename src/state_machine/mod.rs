mod record;
mod state;

pub use record::{
    ArchivedAttempt, SCHEMA_VERSION, StageName, StageState, StageStatus, TriggerType,
    WorkflowRecord,
};
pub use state::{FailureDecision, StateMachine, Transition, WorkflowStatus};
