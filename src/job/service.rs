use crate::ai::{friendly_error_text, AiClient, ContentPart};
use crate::app_state::AppEvent;
use crate::evaluate::{evaluate_bidder, BidderEvidence, EvaluatorOptions, Verdict};
use crate::extract::model::{BidderFacts, CompanyExtraction, CriterionRow, PaymentRow, WorkExperienceRow};
use crate::extract::{aggregate_company, extract_tender};
use crate::job::analytics::{
    BidderEvaluationAnalytics, EvaluationAnalytics, ExtractionAnalytics, JobAnalytics,
};
use crate::job::archive::{discover_layout, safe_extract, validate_zip_bytes, CompanyFolder};
use crate::job::chat::{build_chat_prompt, build_fact_sheet, BidderSheet};
use crate::job::model::{
    ChatTurn, JobAction, JobCounts, JobError, JobState, JobStatus, JobSummary, TenderSummary,
};
use crate::job::retry::{safe_write, RetryPolicy};
use crate::storage::entity::job;
use crate::storage::repository::{
    BidderRepository, CheckRepository, JobRepository, NewCheck, PersistSummary, TenderRepository,
};
use log::{error, info, warn};
use sea_orm::{DatabaseConnection, DbErr};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const INTERRUPTED_MESSAGE: &str = "interrupted by service restart";
const CHAT_TEMPERATURE: f32 = 0.2;

#[derive(Clone, Debug)]
pub struct JobSettings {
    /// Uploads and per-run scratch directories live here.
    pub data_dir: PathBuf,
    pub extract_model: String,
    pub chat_model: String,
    pub company_workers: usize,
    pub document_workers: usize,
    pub evaluator: EvaluatorOptions,
    pub retry: RetryPolicy,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tender_ai_data"),
            extract_model: "gemini-2.0-flash".to_string(),
            chat_model: "gemini-2.0-flash".to_string(),
            company_workers: 4,
            document_workers: 5,
            evaluator: EvaluatorOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl JobSettings {
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn scratch_dir(&self, job_id: i32, run_id: &str) -> PathBuf {
        self.data_dir
            .join("scratch")
            .join(format!("job-{}-{}", job_id, run_id))
    }
}

enum PhaseEnd {
    Done,
    Cancelled,
}

/// Drops the job's cancellation token when its worker task ends, panics included.
struct RunningGuard {
    service: Arc<JobService>,
    job_id: i32,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.service.unregister(self.job_id);
    }
}

/// Owns the job lifecycle. Phases run on spawned tasks; callers poll `status`.
pub struct JobService {
    db: Arc<DatabaseConnection>,
    ai: Arc<AiClient>,
    settings: JobSettings,
    evt_tx: mpsc::UnboundedSender<AppEvent>,
    running: Mutex<HashMap<i32, CancellationToken>>,
}

impl JobService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ai: Arc<AiClient>,
        settings: JobSettings,
        evt_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            db,
            ai,
            settings,
            evt_tx,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    fn emit(&self, event: AppEvent) {
        let _ = self.evt_tx.send(event);
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<i32, CancellationToken>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, job_id: i32) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens().insert(job_id, token.clone());
        token
    }

    fn unregister(&self, job_id: i32) {
        self.tokens().remove(&job_id);
    }

    fn is_running(&self, job_id: i32) -> bool {
        self.tokens().contains_key(&job_id)
    }

    async fn load(&self, job_id: i32) -> Result<job::Model, JobError> {
        JobRepository::find(self.db.as_ref(), job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))
    }

    async fn current_state(&self, job_id: i32) -> Result<JobState, JobError> {
        self.load(job_id).await?.state.parse()
    }

    /// Stores the archive under the uploads directory and creates a `draft` job.
    pub async fn submit(&self, name: &str, archive: Vec<u8>) -> Result<i32, JobError> {
        let uploads = self.settings.uploads_dir();
        tokio::fs::create_dir_all(&uploads).await?;
        let path = uploads.join(format!("{}.zip", Uuid::new_v4().simple()));
        tokio::fs::write(&path, &archive).await?;

        let name = name.to_string();
        let path_str = path.display().to_string();
        let created = safe_write(&self.db, &self.settings.retry, "submit", |txn| {
            let (name, path_str) = (name.clone(), path_str.clone());
            Box::pin(async move { JobRepository::create(txn, &name, &path_str).await })
        })
        .await?;

        info!("job {} submitted: {} ({} bytes)", created.id, name, archive.len());
        self.emit(AppEvent::JobState {
            job_id: created.id,
            state: JobState::Draft,
            message: Some(format!("submitted {}", name)),
        });
        Ok(created.id)
    }

    pub async fn submit_path(&self, path: &Path) -> Result<i32, JobError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.submit(&name, bytes).await
    }

    /// `draft -> extracting`, then runs the extraction phase in the background.
    pub async fn extract(self: &Arc<Self>, job_id: i32) -> Result<JoinHandle<()>, JobError> {
        let state = self.current_state(job_id).await?;
        JobAction::Extract.check(state)?;
        if self.is_running(job_id) {
            return Err(JobError::Busy(job_id));
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let rid = run_id.clone();
        let moved = safe_write(&self.db, &self.settings.retry, "begin extraction", |txn| {
            let rid = rid.clone();
            Box::pin(async move { JobRepository::begin_extraction(txn, job_id, &rid).await })
        })
        .await?;
        if !moved {
            return Err(JobError::InvalidTransition {
                action: JobAction::Extract.as_str(),
                state: self.current_state(job_id).await?,
            });
        }

        let token = self.register(job_id);
        self.emit(AppEvent::JobState {
            job_id,
            state: JobState::Extracting,
            message: None,
        });
        let svc = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _running = RunningGuard {
                service: Arc::clone(&svc),
                job_id,
            };
            svc.run_extraction(job_id, run_id, token).await;
        }))
    }

    async fn run_extraction(self: &Arc<Self>, job_id: i32, run_id: String, token: CancellationToken) {
        info!("job {} extraction started (run {})", job_id, run_id);
        let started = Instant::now();
        let mut analytics = ExtractionAnalytics::default();
        let outcome = self
            .extraction_phase(job_id, &run_id, &token, &mut analytics)
            .await;
        analytics.duration_ms = started.elapsed().as_millis() as u64;
        let blob = JobAnalytics::default().with_extraction(analytics).to_json();

        match outcome {
            Ok(PhaseEnd::Done) => {
                let blob_ref = blob.clone();
                let res = safe_write(&self.db, &self.settings.retry, "finish extraction", |txn| {
                    let blob = blob_ref.clone();
                    Box::pin(async move { JobRepository::finish_extraction(txn, job_id, &blob).await })
                })
                .await;
                match res {
                    Ok(true) => {
                        info!("job {} extracted in {:?}", job_id, started.elapsed());
                        self.emit(AppEvent::JobState {
                            job_id,
                            state: JobState::Extracted,
                            message: None,
                        });
                    }
                    Ok(false) => self.finish_cancelled(job_id, &blob).await,
                    Err(e) => error!("job {} could not be finalized: {}", job_id, e),
                }
            }
            Ok(PhaseEnd::Cancelled) => self.finish_cancelled(job_id, &blob).await,
            Err(e) => self.finish_failed(job_id, &e, &blob).await,
        }
    }

    async fn extraction_phase(
        self: &Arc<Self>,
        job_id: i32,
        run_id: &str,
        token: &CancellationToken,
        analytics: &mut ExtractionAnalytics,
    ) -> Result<PhaseEnd, JobError> {
        if token.is_cancelled() {
            return Ok(PhaseEnd::Cancelled);
        }

        let job = self.load(job_id).await?;
        let archive_path = PathBuf::from(&job.archive_path);
        let bytes = tokio::fs::read(&archive_path).await?;
        validate_zip_bytes(&bytes)?;
        drop(bytes);

        let scratch = self.settings.scratch_dir(job_id, run_id);
        let (src, dest) = (archive_path.clone(), scratch.clone());
        tokio::task::spawn_blocking(move || safe_extract(&src, &dest))
            .await
            .map_err(|e| JobError::Task(e.to_string()))??;
        let layout = discover_layout(&scratch)?;
        analytics.companies_total = layout.companies.len() as u64;
        self.emit(AppEvent::Progress {
            job_id,
            message: format!(
                "archive ok: {} companies, {} files",
                layout.companies.len(),
                layout.total_files()
            ),
        });

        let tender = match extract_tender(&self.ai, &layout.tender_pdf, &self.settings.extract_model).await {
            Ok(tender) => tender,
            Err(failed) => {
                analytics.record_tender(failed.analytics);
                return Err(failed.source.into());
            }
        };
        analytics.record_tender(tender.analytics.clone());
        let (facts, criteria) = (tender.tender, tender.criteria);
        safe_write(&self.db, &self.settings.retry, "persist tender", |txn| {
            let (facts, criteria) = (facts.clone(), criteria.clone());
            Box::pin(async move {
                TenderRepository::replace_for_job(txn, job_id, &facts, &criteria).await
            })
        })
        .await?;
        info!("job {} tender stored with {} criteria", job_id, criteria.len());

        if token.is_cancelled() {
            return Ok(PhaseEnd::Cancelled);
        }

        let permits = Arc::new(Semaphore::new(self.settings.company_workers.max(1)));
        let mut join_set = JoinSet::new();
        for company in layout.companies {
            let svc = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let token = token.clone();
            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                svc.extract_company(job_id, company, token).await
            });
        }

        let mut first_err = None;
        while let Some(joined) = join_set.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(JobError::Task(e.to_string())));
            match result {
                Ok(Some(extraction)) => analytics.record_company(extraction.analytics),
                Ok(None) => {}
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        if token.is_cancelled() {
            return Ok(PhaseEnd::Cancelled);
        }
        Ok(PhaseEnd::Done)
    }

    /// One company unit: aggregate its PDFs, then persist the merged facts.
    async fn extract_company(
        &self,
        job_id: i32,
        company: CompanyFolder,
        token: CancellationToken,
    ) -> Result<Option<CompanyExtraction>, JobError> {
        if token.is_cancelled() {
            info!("job {} skipping {} (cancelled)", job_id, company.name);
            return Ok(None);
        }
        let extraction = aggregate_company(
            Arc::clone(&self.ai),
            company.name,
            company.files,
            self.settings.extract_model.clone(),
            self.settings.document_workers,
        )
        .await;
        let summary = self.persist_company(job_id, &extraction).await?;
        info!(
            "job {} company {} stored: payments +{} (skipped {}), work +{} (skipped {})",
            job_id,
            extraction.company_name,
            summary.payments_inserted,
            summary.payments_skipped,
            summary.work_inserted,
            summary.work_skipped
        );
        self.emit(AppEvent::Progress {
            job_id,
            message: format!("company {} extracted", extraction.company_name),
        });
        Ok(Some(extraction))
    }

    async fn persist_company(
        &self,
        job_id: i32,
        extraction: &CompanyExtraction,
    ) -> Result<PersistSummary, JobError> {
        let label = format!("persist {}", extraction.company_name);
        let summary = safe_write(&self.db, &self.settings.retry, &label, |txn| {
            let extraction = extraction.clone();
            Box::pin(async move {
                BidderRepository::persist_extraction(txn, job_id, &extraction).await
            })
        })
        .await?;
        Ok(summary)
    }

    /// `extracted -> processing`, then evaluates every bidder in the background.
    pub async fn evaluate(self: &Arc<Self>, job_id: i32) -> Result<JoinHandle<()>, JobError> {
        let state = self.current_state(job_id).await?;
        JobAction::Evaluate.check(state)?;
        if self.is_running(job_id) {
            return Err(JobError::Busy(job_id));
        }

        let moved = safe_write(&self.db, &self.settings.retry, "begin evaluation", |txn| {
            Box::pin(async move { JobRepository::begin_evaluation(txn, job_id).await })
        })
        .await?;
        if !moved {
            return Err(JobError::InvalidTransition {
                action: JobAction::Evaluate.as_str(),
                state: self.current_state(job_id).await?,
            });
        }

        let token = self.register(job_id);
        self.emit(AppEvent::JobState {
            job_id,
            state: JobState::Processing,
            message: None,
        });
        let svc = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _running = RunningGuard {
                service: Arc::clone(&svc),
                job_id,
            };
            svc.run_evaluation(job_id, token).await;
        }))
    }

    async fn run_evaluation(&self, job_id: i32, token: CancellationToken) {
        info!("job {} evaluation started", job_id);
        let started = Instant::now();
        let mut analytics = EvaluationAnalytics::default();
        let outcome = self.evaluation_phase(job_id, &token, &mut analytics).await;
        analytics.duration_ms = started.elapsed().as_millis() as u64;

        let stored = match self.load(job_id).await {
            Ok(job) => JobAnalytics::parse(job.analytics_json.as_deref()),
            Err(e) => {
                warn!("job {} analytics reload failed: {}", job_id, e);
                JobAnalytics::default()
            }
        };
        let blob = stored.with_evaluation(analytics).to_json();

        match outcome {
            Ok(PhaseEnd::Done) => {
                let blob_ref = blob.clone();
                let res = safe_write(&self.db, &self.settings.retry, "finish evaluation", |txn| {
                    let blob = blob_ref.clone();
                    Box::pin(async move { JobRepository::finish_evaluation(txn, job_id, &blob).await })
                })
                .await;
                match res {
                    Ok(true) => {
                        info!("job {} completed in {:?}", job_id, started.elapsed());
                        self.emit(AppEvent::JobState {
                            job_id,
                            state: JobState::Completed,
                            message: None,
                        });
                    }
                    Ok(false) => self.finish_cancelled(job_id, &blob).await,
                    Err(e) => error!("job {} could not be finalized: {}", job_id, e),
                }
            }
            Ok(PhaseEnd::Cancelled) => self.finish_cancelled(job_id, &blob).await,
            Err(e) => self.finish_failed(job_id, &e, &blob).await,
        }
    }

    async fn evaluation_phase(
        &self,
        job_id: i32,
        token: &CancellationToken,
        analytics: &mut EvaluationAnalytics,
    ) -> Result<PhaseEnd, JobError> {
        if token.is_cancelled() {
            return Ok(PhaseEnd::Cancelled);
        }
        let db = self.db.as_ref();

        safe_write(&self.db, &self.settings.retry, "clear checks", |txn| {
            Box::pin(async move { CheckRepository::delete_for_job(txn, job_id).await })
        })
        .await?;

        let criteria: Vec<CriterionRow> = TenderRepository::criteria_for_job(db, job_id)
            .await?
            .iter()
            .map(CriterionRow::from)
            .collect();
        let bidders = BidderRepository::list_for_job(db, job_id).await?;
        analytics.bidders_total = bidders.len() as u64;

        for bidder in bidders {
            if token.is_cancelled() {
                info!("job {} evaluation cancelled before {}", job_id, bidder.company_name);
                return Ok(PhaseEnd::Cancelled);
            }
            let started = Instant::now();
            let evidence = BidderEvidence {
                bidder: BidderFacts::from(&bidder),
                payments: BidderRepository::payments_for(db, bidder.id)
                    .await?
                    .iter()
                    .map(PaymentRow::from)
                    .collect(),
                work_experience: BidderRepository::work_for(db, bidder.id)
                    .await?
                    .iter()
                    .map(WorkExperienceRow::from)
                    .collect(),
            };
            let documents: Vec<PathBuf> = BidderRepository::documents_for(db, bidder.id)
                .await?
                .into_iter()
                .map(|d| PathBuf::from(d.path))
                .collect();

            let result = evaluate_bidder(
                &self.ai,
                &self.settings.evaluator,
                &bidder.company_name,
                &evidence,
                &criteria,
                &documents,
            )
            .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (check, bidder_analytics) = match result {
                Ok(outcome) => (
                    NewCheck {
                        job_id,
                        bidder_id: bidder.id,
                        overall_result: outcome.overall_result,
                        total_criteria: criteria.len() as i32,
                        duration_ms: duration_ms as i64,
                        error_message: None,
                        lines: outcome.lines,
                    },
                    BidderEvaluationAnalytics {
                        overall_result: outcome.overall_result.as_str().to_string(),
                        duration_ms,
                        calls: outcome.calls,
                        usage: outcome.usage,
                        error: None,
                    },
                ),
                Err(e) => {
                    let message = friendly_error_text(&e.to_string());
                    warn!("job {} bidder {} evaluation failed: {}", job_id, bidder.company_name, message);
                    (
                        NewCheck {
                            job_id,
                            bidder_id: bidder.id,
                            overall_result: Verdict::Unknown,
                            total_criteria: criteria.len() as i32,
                            duration_ms: duration_ms as i64,
                            error_message: Some(message.clone()),
                            lines: Vec::new(),
                        },
                        BidderEvaluationAnalytics {
                            overall_result: Verdict::Unknown.as_str().to_string(),
                            duration_ms,
                            calls: 1,
                            error: Some(message),
                            ..Default::default()
                        },
                    )
                }
            };

            let label = format!("store check {}", bidder.company_name);
            safe_write(&self.db, &self.settings.retry, &label, |txn| {
                let check = check.clone();
                Box::pin(async move { CheckRepository::insert(txn, &check).await })
            })
            .await?;

            info!(
                "job {} bidder {} -> {}",
                job_id, bidder.company_name, bidder_analytics.overall_result
            );
            self.emit(AppEvent::Progress {
                job_id,
                message: format!(
                    "bidder {} evaluated: {}",
                    bidder.company_name, bidder_analytics.overall_result
                ),
            });
            analytics.record_bidder(&bidder.company_name, bidder_analytics);
        }
        Ok(PhaseEnd::Done)
    }

    async fn finish_cancelled(&self, job_id: i32, blob: &str) {
        let blob_ref = blob.to_string();
        let res = safe_write(&self.db, &self.settings.retry, "mark cancelled", |txn| {
            let blob = blob_ref.clone();
            Box::pin(async move {
                let moved = JobRepository::mark_cancelled(txn, job_id, Some(&blob)).await?;
                if !moved {
                    // already cancelled by the trigger; keep the phase analytics
                    JobRepository::set_analytics(txn, job_id, &blob).await?;
                }
                Ok::<bool, DbErr>(moved)
            })
        })
        .await;
        match res {
            Ok(_) => {
                info!("job {} cancelled", job_id);
                self.emit(AppEvent::JobState {
                    job_id,
                    state: JobState::Cancelled,
                    message: None,
                });
            }
            Err(e) => error!("job {} cancel bookkeeping failed: {}", job_id, e),
        }
    }

    async fn finish_failed(&self, job_id: i32, err: &JobError, blob: &str) {
        let message = friendly_error_text(&err.to_string());
        error!("job {} failed: {}", job_id, message);
        let (msg_ref, blob_ref) = (message.clone(), blob.to_string());
        let res = safe_write(&self.db, &self.settings.retry, "mark failed", |txn| {
            let (msg, blob) = (msg_ref.clone(), blob_ref.clone());
            Box::pin(async move { JobRepository::mark_failed(txn, job_id, &msg, Some(&blob)).await })
        })
        .await;
        match res {
            Ok(true) => self.emit(AppEvent::JobState {
                job_id,
                state: JobState::Failed,
                message: Some(message),
            }),
            Ok(false) => warn!("job {} left active states before failure was recorded", job_id),
            Err(e) => error!("job {} failure bookkeeping failed: {}", job_id, e),
        }
    }

    /// Trips the job's token and records `cancelled` right away; in-flight units finish on
    /// their own.
    pub async fn cancel(&self, job_id: i32) -> Result<(), JobError> {
        let state = self.current_state(job_id).await?;
        JobAction::Cancel.check(state)?;

        if let Some(token) = self.tokens().get(&job_id) {
            token.cancel();
        }
        let moved = safe_write(&self.db, &self.settings.retry, "cancel", |txn| {
            Box::pin(async move { JobRepository::mark_cancelled(txn, job_id, None).await })
        })
        .await?;
        if !moved {
            return Err(JobError::InvalidTransition {
                action: JobAction::Cancel.as_str(),
                state: self.current_state(job_id).await?,
            });
        }
        info!("job {} cancellation requested", job_id);
        self.emit(AppEvent::JobState {
            job_id,
            state: JobState::Cancelled,
            message: Some("cancelled by operator".to_string()),
        });
        Ok(())
    }

    /// Back to `draft`: tender, criteria, bidders and checks are deleted with the scratch dir.
    pub async fn reset(&self, job_id: i32) -> Result<(), JobError> {
        let job = self.load(job_id).await?;
        JobAction::Reset.check(job.state.parse()?)?;
        if self.is_running(job_id) {
            return Err(JobError::Busy(job_id));
        }

        let moved = safe_write(&self.db, &self.settings.retry, "reset", |txn| {
            Box::pin(async move {
                let moved = JobRepository::reset_to_draft(txn, job_id).await?;
                if moved {
                    CheckRepository::delete_for_job(txn, job_id).await?;
                    BidderRepository::delete_for_job(txn, job_id).await?;
                    TenderRepository::delete_for_job(txn, job_id).await?;
                }
                Ok::<bool, DbErr>(moved)
            })
        })
        .await?;
        if !moved {
            return Err(JobError::InvalidTransition {
                action: JobAction::Reset.as_str(),
                state: self.current_state(job_id).await?,
            });
        }

        if let Some(run_id) = job.run_id.as_deref() {
            let scratch = self.settings.scratch_dir(job_id, run_id);
            match tokio::fs::remove_dir_all(&scratch).await {
                Ok(()) => info!("job {} scratch {} removed", job_id, scratch.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("job {} scratch cleanup failed: {}", job_id, e),
            }
        }
        info!("job {} reset to draft", job_id);
        self.emit(AppEvent::JobState {
            job_id,
            state: JobState::Draft,
            message: Some("reset".to_string()),
        });
        Ok(())
    }

    pub async fn status(&self, job_id: i32) -> Result<JobStatus, JobError> {
        let job = self.load(job_id).await?;
        let db = self.db.as_ref();
        let tender = TenderRepository::find_by_job(db, job_id)
            .await?
            .map(|t| TenderSummary {
                tender_id: t.tender_id,
                ref_no: t.ref_no,
                title: t.title,
                department_name: t.department_name,
                estimated_value: t.estimated_value,
                bid_submission_end: t.bid_submission_end,
            });
        let counts = JobCounts {
            criteria: TenderRepository::count_criteria(db, job_id).await?,
            bidders: BidderRepository::count_for_job(db, job_id).await?,
            checks: CheckRepository::count_for_job(db, job_id).await?,
        };
        Ok(JobStatus {
            id: job.id,
            name: job.name,
            state: job.state.parse()?,
            tender,
            counts,
            error_message: job.error_message,
            analytics: JobAnalytics::parse(job.analytics_json.as_deref()),
        })
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobError> {
        JobRepository::list(self.db.as_ref())
            .await?
            .into_iter()
            .map(|j| -> Result<JobSummary, JobError> {
                Ok(JobSummary {
                    id: j.id,
                    state: j.state.parse()?,
                    name: j.name,
                    created_at: j.created_at,
                })
            })
            .collect()
    }

    /// Answers a question from the job's stored facts, never from raw documents.
    pub async fn chat(
        &self,
        job_id: i32,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, JobError> {
        self.load(job_id).await?;
        let db = self.db.as_ref();
        let tender = TenderRepository::find_by_job(db, job_id).await?;
        let criteria = TenderRepository::criteria_for_job(db, job_id).await?;
        let checks: HashMap<i32, _> = CheckRepository::list_for_job(db, job_id)
            .await?
            .into_iter()
            .map(|c| (c.bidder_id, c))
            .collect();

        let mut rows = Vec::new();
        for bidder in BidderRepository::list_for_job(db, job_id).await? {
            let payments = BidderRepository::payments_for(db, bidder.id).await?;
            let work = BidderRepository::work_for(db, bidder.id).await?;
            rows.push((bidder, payments, work));
        }
        let sheets: Vec<BidderSheet<'_>> = rows
            .iter()
            .map(|(bidder, payments, work)| BidderSheet {
                bidder,
                payments,
                work,
                check: checks.get(&bidder.id),
            })
            .collect();

        let facts = build_fact_sheet(tender.as_ref(), &criteria, &sheets);
        let prompt = build_chat_prompt(&facts, question, history);
        let resp = self
            .ai
            .generate(
                vec![ContentPart::Text(prompt)],
                &self.settings.chat_model,
                CHAT_TEMPERATURE,
            )
            .await?;
        Ok(resp.text.trim().to_string())
    }

    pub async fn export(&self, job_id: i32, path: &Path) -> Result<usize, JobError> {
        self.load(job_id).await?;
        let sheets = crate::export::write_job_workbook(self.db.as_ref(), job_id, path).await?;
        info!("job {} exported to {}", job_id, path.display());
        Ok(sheets)
    }

    /// Fails jobs a previous process left in an active state.
    pub async fn recover(&self) -> Result<u64, JobError> {
        let n = safe_write(&self.db, &self.settings.retry, "recover", |txn| {
            Box::pin(async move { JobRepository::fail_interrupted(txn, INTERRUPTED_MESSAGE).await })
        })
        .await?;
        if n > 0 {
            warn!("{} interrupted job(s) marked failed", n);
        }
        Ok(n)
    }
}
