use async_trait::async_trait;
use base64::Engine;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use zip::write::SimpleFileOptions;

use tender_ai::ai::{
    AiClient, AiClientSettings, ContentPart, FileHandle, FileState, GenerateRequest, LlmError,
    LlmProvider,
};
use tender_ai::evaluate::evaluator::EVALUATION_PROMPT_HEADER;
use tender_ai::extract::prompt::{BIDDER_PROMPT_HEADER, TENDER_PROMPT_HEADER};
use tender_ai::job::chat::CHAT_PROMPT_HEADER;
use tender_ai::job::{JobError, JobService, JobSettings, JobState, INTERRUPTED_MESSAGE};
use tender_ai::storage::establish_connection;
use tender_ai::storage::repository::{BidderRepository, CheckRepository, JobRepository, TenderRepository};
use tender_ai::AppEvent;

/// Answers by prompt kind, the way the real model would be asked.
#[derive(Default)]
struct ScriptedProvider {
    tender_gate: Option<Arc<Notify>>,
    evaluation_gate: Option<Arc<Notify>>,
    fail_tender: bool,
    failing_bidder: Option<&'static str>,
    generate_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(tender_gate: Option<Arc<Notify>>) -> Self {
        Self {
            tender_gate,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn prompts_with(&self, header: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(header))
            .cloned()
            .collect()
    }
}

fn body(text: &str) -> Value {
    json!({
        "candidates": [{"content": {"parts": [{"text": text}]}}],
        "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
    })
}

fn tender_reply() -> Value {
    json!({
        "tender": {
            "department_name": "Public Works Department",
            "tender_id": "2024_PWD_77",
            "ref_no": "PWD/RD/77",
            "title": "Rural road maintenance",
            "estimated_value": "4500000",
            "currency": "INR",
            "bid_submission_end": "2024-03-01"
        },
        "eligibility_criteria": [
            {"sl_no": "1", "criteria": "EMD of Rs 45,000 paid online", "supporting_document": "EMD receipt"},
            {"sl_no": "2", "criteria": "One similar road work in last 5 years", "supporting_document": "Work order"}
        ]
    })
}

fn bidder_reply(company: &str, file: &str) -> Value {
    match (company, file) {
        ("AlphaCo", "bid.pdf") => json!({
            "bidder": {
                "company_name": "Alpha Constructions",
                "pan": "ABCDE1234F",
                "email_id": "ops@alpha.in",
                "place_of_registration": "Raipur"
            },
            "payments": [
                {"payment_mode": "NEFT", "transaction_id": "TXN123", "amount": "45000", "status": "success"}
            ],
            "work_experience": [
                {"name_of_work": "Road repair NH-30", "employer": "PWD", "location": "Durg",
                 "contract_amount": "30,00,000", "date_of_start": "2021-04-01", "completion_certificate": true}
            ]
        }),
        ("AlphaCo", "emd.pdf") => json!({
            "payments": [
                {"payment_mode": "NEFT", "transaction_id": " TXN123 ", "amount": "45000"},
                {"payment_mode": "DD", "transaction_id": "", "amount": "500"}
            ],
            "work_experience": [
                {"name_of_work": "road repair  NH-30", "employer": "pwd", "location": "Durg",
                 "contract_amount": "30,00,000", "date_of_start": "2021-04-01"}
            ]
        }),
        _ => json!({
            "bidder": {"company_name": company, "place_of_registration": "Bhilai"},
            "payments": [],
            "work_experience": []
        }),
    }
}

fn evaluation_reply(bidder: &str) -> Value {
    if bidder == "AlphaCo" {
        json!({
            "overall_result": "pass",
            "criteria_results": [
                {"sl_no": "1", "result": "pass", "reason": "EMD paid", "evidence": "NEFT 45000"},
                {"sl_no": "2", "result": "pass", "reason": "NH-30 repair", "evidence": "work order"}
            ]
        })
    } else {
        json!({
            "overall_result": "fail",
            "criteria_results": [
                {"sl_no": "1", "result": "fail", "reason": "no EMD", "missing_documents": "EMD receipt"},
                {"sl_no": "2", "result": "unknown", "reason": "no work listed"}
            ]
        })
    }
}

fn quoted_company(prompt: &str) -> String {
    prompt
        .split("bidding company \"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<FileHandle, LlmError> {
        Ok(FileHandle {
            name: format!("files/{}", path.display()),
            uri: path.display().to_string(),
            mime_type: mime_type.to_string(),
            state: FileState::Active,
        })
    }

    async fn get_file(&self, name: &str) -> Result<FileHandle, LlmError> {
        Ok(FileHandle {
            name: name.to_string(),
            uri: name.to_string(),
            mime_type: "application/pdf".to_string(),
            state: FileState::Active,
        })
    }

    async fn generate_content(&self, req: &GenerateRequest) -> Result<Value, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let mut prompt = String::new();
        let mut file = String::new();
        for part in &req.contents {
            match part {
                ContentPart::Text(t) => prompt.push_str(t),
                ContentPart::File(h) => {
                    file = Path::new(&h.uri)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                }
            }
        }
        self.prompts.lock().unwrap().push(prompt.clone());

        if prompt.contains(TENDER_PROMPT_HEADER) {
            if let Some(gate) = &self.tender_gate {
                gate.notified().await;
            }
            if self.fail_tender {
                return Err(LlmError::InvalidArgument("tender document rejected".to_string()));
            }
            return Ok(body(&tender_reply().to_string()));
        }
        if prompt.contains(BIDDER_PROMPT_HEADER) {
            let company = quoted_company(&prompt);
            return Ok(body(&bidder_reply(&company, &file).to_string()));
        }
        if prompt.contains(EVALUATION_PROMPT_HEADER) {
            let bidder = prompt
                .lines()
                .find_map(|l| l.strip_prefix("Bidder: "))
                .unwrap_or_default()
                .to_string();
            if let Some(gate) = &self.evaluation_gate {
                gate.notified().await;
            }
            if self.failing_bidder == Some(bidder.as_str()) {
                return Err(LlmError::InvalidArgument("request payload too large".to_string()));
            }
            return Ok(body(&format!("```json\n{}\n```", evaluation_reply(&bidder))));
        }
        if prompt.contains(CHAT_PROMPT_HEADER) {
            return Ok(body("AlphaCo passed every criterion."));
        }
        Err(LlmError::InvalidArgument("unexpected prompt".to_string()))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    root: PathBuf,
    db: Arc<DatabaseConnection>,
    provider: Arc<ScriptedProvider>,
    service: Arc<JobService>,
    _events: mpsc::UnboundedReceiver<AppEvent>,
}

async fn harness(tender_gate: Option<Arc<Notify>>) -> Harness {
    harness_with(ScriptedProvider::new(tender_gate)).await
}

async fn harness_with(provider: ScriptedProvider) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let url = format!("sqlite://{}?mode=rwc", root.join("jobs.db").display());
    let db = Arc::new(establish_connection(&url).await.unwrap());

    let provider = Arc::new(provider);
    let ai_settings = AiClientSettings {
        poll_interval: Duration::from_millis(5),
        ready_timeout: Duration::from_millis(200),
        default_retry_delay: Duration::from_millis(5),
        ..AiClientSettings::default()
    };
    let ai = Arc::new(AiClient::new(provider.clone(), ai_settings));
    let settings = JobSettings {
        data_dir: root.join("data"),
        ..JobSettings::default()
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let service = Arc::new(JobService::new(db.clone(), ai, settings, tx));
    Harness {
        _dir: dir,
        root,
        db,
        provider,
        service,
        _events: rx,
    }
}

fn pdf(tag: &str) -> Vec<u8> {
    let mut bytes = format!("%PDF-1.4\n% {}\n", tag).into_bytes();
    bytes.resize(400, b' ');
    bytes
}

fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

fn standard_bundle() -> Vec<u8> {
    zip_bytes(&[
        ("bundle/tender.pdf", pdf("tender")),
        ("bundle/AlphaCo/bid.pdf", pdf("alpha bid")),
        ("bundle/AlphaCo/emd.pdf", pdf("alpha emd")),
        ("bundle/BetaCo/bid.pdf", pdf("beta bid")),
        ("bundle/BetaCo/scan.pdf", b"%PDF tiny".to_vec()),
        ("__MACOSX/bundle/._tender.pdf", b"resource fork".to_vec()),
    ])
}

#[tokio::test]
async fn normal_run_extracts_evaluates_and_resets() {
    let h = harness(None).await;
    let id = h.service.submit("bundle.zip", standard_bundle()).await.unwrap();
    assert_eq!(h.service.status(id).await.unwrap().state, JobState::Draft);

    h.service.extract(id).await.unwrap().await.unwrap();
    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Extracted, "{:?}", status.error_message);
    assert_eq!(status.counts.criteria, 2);
    assert_eq!(status.counts.bidders, 2);
    let tender = status.tender.unwrap();
    assert_eq!(tender.tender_id, "2024_PWD_77");

    // folder name is the identity, duplicate TXN123 stored once, id-less payment kept
    let alpha = BidderRepository::find_by_name(h.db.as_ref(), id, "AlphaCo")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alpha.pan, "ABCDE1234F");
    let payments = BidderRepository::payments_for(h.db.as_ref(), alpha.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    let work = BidderRepository::work_for(h.db.as_ref(), alpha.id).await.unwrap();
    assert_eq!(work.len(), 1);
    let docs = BidderRepository::documents_for(h.db.as_ref(), alpha.id).await.unwrap();
    assert_eq!(docs.len(), 2);

    // the tiny scan never reaches the model
    assert_eq!(h.provider.prompts_with(BIDDER_PROMPT_HEADER).len(), 3);

    h.service.evaluate(id).await.unwrap().await.unwrap();
    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.counts.checks, 2);

    let checks = CheckRepository::list_for_job(h.db.as_ref(), id).await.unwrap();
    for check in &checks {
        assert_eq!(check.total_criteria, 2);
        if check.bidder_id == alpha.id {
            assert_eq!(check.overall_result, "pass");
            assert_eq!(check.passed_criteria, 2);
        } else {
            assert_eq!(check.overall_result, "fail");
            assert_eq!(check.failed_criteria, 1);
            assert_eq!(check.unknown_criteria, 1);
        }
    }

    let analytics = status.analytics;
    assert!(analytics.extraction.is_some());
    assert!(analytics.evaluation.is_some());
    assert_eq!(analytics.totals.calls, 6);
    assert_eq!(analytics.totals.usage.total_tokens, 90);

    let answer = h.service.chat(id, "Who passed?", &[]).await.unwrap();
    assert_eq!(answer, "AlphaCo passed every criterion.");
    let chat_prompt = h.provider.prompts_with(CHAT_PROMPT_HEADER).pop().unwrap();
    assert!(chat_prompt.contains("AlphaCo"));
    assert!(!chat_prompt.contains("ABCDE1234F"));
    assert!(!chat_prompt.contains("ops@alpha.in"));
    assert!(!chat_prompt.contains("TXN123"));

    let sheets = h.service.export(id, &h.root.join("job.xlsx")).await.unwrap();
    assert_eq!(sheets, 7);

    h.service.reset(id).await.unwrap();
    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Draft);
    assert_eq!(status.counts.criteria, 0);
    assert_eq!(status.counts.bidders, 0);
    assert_eq!(status.counts.checks, 0);
    assert!(status.tender.is_none());
}

#[tokio::test]
async fn base64_archive_fails_without_rows() {
    let h = harness(None).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(standard_bundle());
    let id = h.service.submit("bundle.b64", encoded.into_bytes()).await.unwrap();

    h.service.extract(id).await.unwrap().await.unwrap();
    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    let message = status.error_message.unwrap();
    assert!(message.contains("invalid ZIP signature"), "{}", message);
    assert!(message.contains("base64"));
    assert_eq!(status.counts.bidders, 0);
    assert_eq!(status.counts.criteria, 0);
    assert!(TenderRepository::find_by_job(h.db.as_ref(), id).await.unwrap().is_none());
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn missing_tender_pdf_fails() {
    let h = harness(None).await;
    let bytes = zip_bytes(&[("AlphaCo/bid.pdf", pdf("alpha"))]);
    let id = h.service.submit("no-tender.zip", bytes).await.unwrap();

    h.service.extract(id).await.unwrap().await.unwrap();
    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.error_message.unwrap().contains("tender.pdf not found"));
    assert_eq!(status.counts.bidders, 0);
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn cancel_during_extraction_stops_company_work() {
    let gate = Arc::new(Notify::new());
    let h = harness(Some(gate.clone())).await;
    let id = h.service.submit("bundle.zip", standard_bundle()).await.unwrap();

    let handle = h.service.extract(id).await.unwrap();
    assert_eq!(h.service.status(id).await.unwrap().state, JobState::Extracting);

    h.service.cancel(id).await.unwrap();
    assert_eq!(h.service.status(id).await.unwrap().state, JobState::Cancelled);

    gate.notify_one();
    handle.await.unwrap();

    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Cancelled);
    assert_eq!(status.counts.bidders, 0);
    assert!(h.provider.prompts_with(BIDDER_PROMPT_HEADER).is_empty());

    // a cancelled job cannot be cancelled again, only reset
    let err = h.service.cancel(id).await.unwrap_err();
    assert_eq!(err.to_string(), "cannot cancel a job in state 'cancelled'");
    h.service.reset(id).await.unwrap();
    assert_eq!(h.service.status(id).await.unwrap().state, JobState::Draft);
}

#[tokio::test]
async fn illegal_transitions_are_rejected() {
    let h = harness(None).await;
    let id = h.service.submit("bundle.zip", standard_bundle()).await.unwrap();

    let err = h.service.evaluate(id).await.unwrap_err();
    assert_eq!(err.to_string(), "cannot evaluate a job in state 'draft'");
    assert!(matches!(
        h.service.cancel(id).await,
        Err(JobError::InvalidTransition { .. })
    ));
    assert!(matches!(
        h.service.reset(id).await,
        Err(JobError::InvalidTransition { .. })
    ));
    assert!(matches!(h.service.extract(999).await, Err(JobError::NotFound(999))));

    h.service.extract(id).await.unwrap().await.unwrap();
    let err = h.service.extract(id).await.unwrap_err();
    assert_eq!(err.to_string(), "cannot extract a job in state 'extracted'");
    assert_eq!(h.service.status(id).await.unwrap().state, JobState::Extracted);
}

#[tokio::test]
async fn recover_fails_interrupted_jobs() {
    let h = harness(None).await;
    let id = h.service.submit("bundle.zip", standard_bundle()).await.unwrap();
    assert!(JobRepository::begin_extraction(h.db.as_ref(), id, "stale-run").await.unwrap());

    assert_eq!(h.service.recover().await.unwrap(), 1);
    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(h.service.recover().await.unwrap(), 0);
}

#[tokio::test]
async fn extraction_can_be_started_from_a_spawned_task() {
    let h = harness(None).await;
    let id = h.service.submit("bundle.zip", standard_bundle()).await.unwrap();

    let svc = Arc::clone(&h.service);
    let worker = tokio::spawn(async move { svc.extract(id).await })
        .await
        .unwrap()
        .unwrap();
    worker.await.unwrap();

    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Extracted, "{:?}", status.error_message);
    assert_eq!(status.counts.bidders, 2);

    let svc = Arc::clone(&h.service);
    let worker = tokio::spawn(async move { svc.evaluate(id).await })
        .await
        .unwrap()
        .unwrap();
    worker.await.unwrap();
    assert_eq!(h.service.status(id).await.unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn failed_tender_call_is_counted() {
    let h = harness_with(ScriptedProvider {
        fail_tender: true,
        ..Default::default()
    })
    .await;
    let id = h.service.submit("bundle.zip", standard_bundle()).await.unwrap();

    h.service.extract(id).await.unwrap().await.unwrap();
    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.error_message.unwrap().contains("tender document rejected"));

    let extraction = status.analytics.extraction.unwrap();
    assert_eq!(extraction.calls, 1);
    assert_eq!(extraction.failed, 1);
    let tender = extraction.tender.unwrap();
    assert_eq!(tender.file_name, "tender.pdf");
    assert!(!tender.success);
    assert!(tender.error.unwrap().contains("tender document rejected"));
    assert_eq!(status.analytics.totals.calls, 1);
    assert!(h.provider.prompts_with(BIDDER_PROMPT_HEADER).is_empty());
}

#[tokio::test]
async fn one_failing_bidder_does_not_stop_the_others() {
    let h = harness_with(ScriptedProvider {
        failing_bidder: Some("BetaCo"),
        ..Default::default()
    })
    .await;
    let id = h.service.submit("bundle.zip", standard_bundle()).await.unwrap();
    h.service.extract(id).await.unwrap().await.unwrap();
    h.service.evaluate(id).await.unwrap().await.unwrap();

    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.counts.checks, 2);

    let alpha = BidderRepository::find_by_name(h.db.as_ref(), id, "AlphaCo")
        .await
        .unwrap()
        .unwrap();
    let beta = BidderRepository::find_by_name(h.db.as_ref(), id, "BetaCo")
        .await
        .unwrap()
        .unwrap();
    let checks = CheckRepository::list_for_job(h.db.as_ref(), id).await.unwrap();
    let alpha_check = checks.iter().find(|c| c.bidder_id == alpha.id).unwrap();
    let beta_check = checks.iter().find(|c| c.bidder_id == beta.id).unwrap();

    assert_eq!(alpha_check.overall_result, "pass");
    assert!(alpha_check.error_message.is_none());
    assert_eq!(beta_check.overall_result, "unknown");
    assert_eq!(beta_check.unknown_criteria, 2);
    assert!(beta_check
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("request payload too large"));
    assert!(CheckRepository::lines_for(h.db.as_ref(), beta_check.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn cancel_during_processing_keeps_finished_checks() {
    let gate = Arc::new(Notify::new());
    let h = harness_with(ScriptedProvider {
        evaluation_gate: Some(gate.clone()),
        ..Default::default()
    })
    .await;
    let id = h.service.submit("bundle.zip", standard_bundle()).await.unwrap();
    h.service.extract(id).await.unwrap().await.unwrap();

    let handle = h.service.evaluate(id).await.unwrap();
    for _ in 0..200 {
        if !h.provider.prompts_with(EVALUATION_PROMPT_HEADER).is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.provider.prompts_with(EVALUATION_PROMPT_HEADER).len(), 1);

    h.service.cancel(id).await.unwrap();
    assert_eq!(h.service.status(id).await.unwrap().state, JobState::Cancelled);
    assert!(matches!(h.service.reset(id).await, Err(JobError::Busy(_))));

    gate.notify_one();
    handle.await.unwrap();

    let status = h.service.status(id).await.unwrap();
    assert_eq!(status.state, JobState::Cancelled);
    // the in-flight bidder finished, the next one never started
    assert_eq!(status.counts.checks, 1);
    assert_eq!(h.provider.prompts_with(EVALUATION_PROMPT_HEADER).len(), 1);
    assert!(status.analytics.evaluation.is_some());

    h.service.reset(id).await.unwrap();
    assert_eq!(h.service.status(id).await.unwrap().state, JobState::Draft);
}
