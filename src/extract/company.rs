use crate::ai::AiClient;
use crate::extract::document::extract_document;
use crate::extract::model::{
    BidderFacts, CompanyAnalytics, CompanyExtraction, DocumentExtraction, WorkExperienceRow,
    WorkKey,
};
use log::{info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Smallest file still treated as a real PDF. Scanned one-pagers are well above this.
pub const MIN_PDF_BYTES: u64 = 200;

pub fn is_valid_pdf(path: &Path) -> bool {
    let is_pdf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return false;
    }
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(true);
    let resource_fork = path.components().any(|c| c.as_os_str() == "__MACOSX");
    if hidden || resource_fork {
        return false;
    }
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() >= MIN_PDF_BYTES,
        Err(_) => false,
    }
}

/// Runs the per-document extractor over every valid PDF of one company and merges the results.
///
/// At most `max_workers` documents of the company are in flight at once.
pub async fn aggregate_company(
    ai: Arc<AiClient>,
    company_name: String,
    pdf_paths: Vec<PathBuf>,
    model: String,
    max_workers: usize,
) -> CompanyExtraction {
    let started = Instant::now();
    let mut valid: Vec<PathBuf> = pdf_paths.iter().filter(|p| is_valid_pdf(p)).cloned().collect();
    valid.sort();

    if valid.is_empty() {
        info!("[{}] no valid PDFs among {} files", company_name, pdf_paths.len());
    }

    let permits = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut join_set = JoinSet::new();
    for path in valid.iter().cloned() {
        let ai = Arc::clone(&ai);
        let permits = Arc::clone(&permits);
        let (name, model) = (company_name.clone(), model.clone());
        join_set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            extract_document(&ai, &name, &path, &model).await
        });
    }

    let mut results: Vec<DocumentExtraction> = Vec::with_capacity(valid.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(doc) => results.push(doc),
            Err(e) => warn!("[{}] document task aborted: {}", company_name, e),
        }
    }

    let mut merged = merge_documents(&company_name, results);
    merged.documents = valid;
    merged.analytics.pdfs_received = pdf_paths.len() as u64;
    merged.analytics.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "[{}] aggregated {} docs: payments={} work={} tokens={}",
        company_name,
        merged.analytics.calls,
        merged.payments.len(),
        merged.work_experience.len(),
        merged.analytics.usage.total_tokens
    );
    merged
}

/// Merges per-document results independently of completion order.
///
/// Results are ordered by source path first, so "first non-empty wins" always means the
/// lexicographically first document that carries the field.
pub fn merge_documents(company_name: &str, mut results: Vec<DocumentExtraction>) -> CompanyExtraction {
    results.sort_by(|a, b| a.source.cmp(&b.source));

    let mut bidder = BidderFacts::default();
    let mut payments = Vec::new();
    let mut work_experience = Vec::new();
    let mut seen_work = HashSet::new();
    let mut analytics = CompanyAnalytics {
        company_name: company_name.to_string(),
        ..Default::default()
    };

    for doc in results {
        bidder.fill_missing_from(&doc.bidder);
        payments.extend(doc.payments);
        for row in doc.work_experience {
            push_unique_work(&mut work_experience, &mut seen_work, row);
        }

        analytics.calls += 1;
        analytics.pdfs_valid += 1;
        if doc.analytics.success {
            analytics.succeeded += 1;
        } else {
            analytics.failed += 1;
        }
        analytics.usage += doc.analytics.usage;
        analytics.documents.push(doc.analytics);
    }

    // bidder identity is the folder name, whatever the documents print
    bidder.company_name = company_name.to_string();

    CompanyExtraction {
        company_name: company_name.to_string(),
        bidder,
        payments,
        work_experience,
        documents: Vec::new(),
        analytics,
    }
}

fn push_unique_work(
    out: &mut Vec<WorkExperienceRow>,
    seen: &mut HashSet<WorkKey>,
    row: WorkExperienceRow,
) {
    if seen.insert(row.dedup_key()) {
        out.push(row);
    }
}
