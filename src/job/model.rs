use crate::ai::LlmError;
use crate::export::ExportError;
use crate::job::archive::ArchiveError;
use crate::job::analytics::JobAnalytics;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Draft,
    Extracting,
    Extracted,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        JobState::Draft,
        JobState::Extracting,
        JobState::Extracted,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];
    pub const ACTIVE: [JobState; 2] = [JobState::Extracting, JobState::Processing];
    pub const RESETTABLE: [JobState; 4] = [
        JobState::Extracted,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Draft => "draft",
            JobState::Extracting => "extracting",
            JobState::Extracted => "extracted",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// The transition graph, reset included.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (from, to),
            (Draft, Extracting)
                | (Extracting, Extracted)
                | (Extracted, Processing)
                | (Processing, Completed)
                | (Extracting | Processing, Failed)
                | (Extracting | Processing, Cancelled)
                | (Extracted | Completed | Failed | Cancelled, Draft)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s.trim())
            .ok_or_else(|| JobError::CorruptState(s.to_string()))
    }
}

/// Operator-triggered operations of the job lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobAction {
    Extract,
    Evaluate,
    Cancel,
    Reset,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Extract => "extract",
            JobAction::Evaluate => "evaluate",
            JobAction::Cancel => "cancel",
            JobAction::Reset => "reset",
        }
    }

    pub fn allowed_from(&self) -> &'static [JobState] {
        match self {
            JobAction::Extract => &[JobState::Draft],
            JobAction::Evaluate => &[JobState::Extracted],
            JobAction::Cancel => &JobState::ACTIVE,
            JobAction::Reset => &JobState::RESETTABLE,
        }
    }

    pub fn check(&self, state: JobState) -> Result<(), JobError> {
        if self.allowed_from().contains(&state) {
            Ok(())
        } else {
            Err(JobError::InvalidTransition {
                action: self.as_str(),
                state,
            })
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(i32),
    #[error("cannot {action} a job in state '{state}'")]
    InvalidTransition { action: &'static str, state: JobState },
    #[error("job {0} still has background work running, retry shortly")]
    Busy(i32),
    #[error("job has unknown state '{0}'")]
    CorruptState(String),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("{0}")]
    Llm(#[from] LlmError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TenderSummary {
    pub tender_id: String,
    pub ref_no: String,
    pub title: String,
    pub department_name: String,
    pub estimated_value: String,
    pub bid_submission_end: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub criteria: u64,
    pub bidders: u64,
    pub checks: u64,
}

/// Everything a caller polls to follow a job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: i32,
    pub name: String,
    pub state: JobState,
    pub tender: Option<TenderSummary>,
    pub counts: JobCounts,
    pub error_message: Option<String>,
    pub analytics: JobAnalytics,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: i32,
    pub name: String,
    pub state: JobState,
    pub created_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}
