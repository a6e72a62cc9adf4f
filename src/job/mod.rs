pub mod analytics;
pub mod archive;
pub mod chat;
pub mod model;
pub mod retry;
pub mod service;

pub use analytics::JobAnalytics;
pub use archive::ArchiveError;
pub use model::{
    ChatRole, ChatTurn, JobAction, JobCounts, JobError, JobState, JobStatus, JobSummary,
    TenderSummary,
};
pub use retry::{safe_write, RetryPolicy};
pub use service::{JobService, JobSettings, INTERRUPTED_MESSAGE};
