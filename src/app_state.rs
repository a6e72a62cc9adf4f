use crate::job::{JobState, JobStatus, JobSummary};
use std::path::PathBuf;

/// Everything the background actor reports back to the front end.
#[derive(Debug)]
pub enum AppEvent {
    Log(String),
    Message(String),
    Error(String),
    JobState {
        job_id: i32,
        state: JobState,
        message: Option<String>,
    },
    Progress {
        job_id: i32,
        message: String,
    },
    Status(Box<JobStatus>),
    Jobs(Vec<JobSummary>),
    Answer {
        job_id: i32,
        text: String,
    },
    Exported {
        job_id: i32,
        path: PathBuf,
        sheets: usize,
    },
}

/// Lines printed for one event.
pub fn render_event(event: &AppEvent) -> Vec<String> {
    match event {
        AppEvent::Log(msg) | AppEvent::Message(msg) => vec![msg.clone()],
        AppEvent::Error(msg) => vec![format!("error: {}", msg)],
        AppEvent::JobState {
            job_id,
            state,
            message,
        } => match message {
            Some(m) => vec![format!("[job {}] {} ({})", job_id, state, m)],
            None => vec![format!("[job {}] {}", job_id, state)],
        },
        AppEvent::Progress { job_id, message } => vec![format!("[job {}] {}", job_id, message)],
        AppEvent::Status(status) => render_status(status),
        AppEvent::Jobs(jobs) => {
            if jobs.is_empty() {
                return vec!["no jobs".to_string()];
            }
            jobs.iter()
                .map(|j| {
                    let created = chrono::DateTime::from_timestamp(j.created_at, 0)
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    format!("{:>5}  {:<10}  {}  {}", j.id, j.state, created, j.name)
                })
                .collect()
        }
        AppEvent::Answer { job_id, text } => vec![format!("[job {}] {}", job_id, text)],
        AppEvent::Exported {
            job_id,
            path,
            sheets,
        } => vec![format!(
            "[job {}] exported {} sheets to {}",
            job_id,
            sheets,
            path.display()
        )],
    }
}

fn render_status(s: &JobStatus) -> Vec<String> {
    let mut lines = vec![format!("job {} '{}': {}", s.id, s.name, s.state)];
    if let Some(t) = &s.tender {
        lines.push(format!(
            "  tender {} / {}: {} ({})",
            t.tender_id, t.ref_no, t.title, t.department_name
        ));
        if !t.estimated_value.is_empty() || !t.bid_submission_end.is_empty() {
            lines.push(format!(
                "  value {}, bids close {}",
                t.estimated_value, t.bid_submission_end
            ));
        }
    }
    lines.push(format!(
        "  criteria {}, bidders {}, checks {}",
        s.counts.criteria, s.counts.bidders, s.counts.checks
    ));
    if let Some(err) = &s.error_message {
        lines.push(format!("  error: {}", err));
    }
    let totals = &s.analytics.totals;
    if totals.calls > 0 {
        lines.push(format!(
            "  ai calls {}, tokens {} (prompt {}, output {})",
            totals.calls,
            totals.usage.total_tokens,
            totals.usage.prompt_tokens,
            totals.usage.output_tokens
        ));
    }
    lines
}
