use crate::ai::{AiClient, ContentPart, GenerateResponse, LlmError};
use crate::extract::json::parse_json_loose;
use crate::extract::model::{normalize_bidder_payload, BidderFacts, DocumentAnalytics, DocumentExtraction};
use crate::extract::prompt::bidder_prompt;
use log::{info, warn};
use std::path::Path;
use std::time::Instant;

pub const EXTRACTION_TEMPERATURE: f32 = 0.0;

/// Extracts bidder facts, payments and work experience from one PDF.
///
/// Never fails: provider and parse errors land in the returned analytics with empty facts.
pub async fn extract_document(
    ai: &AiClient,
    company_name: &str,
    pdf_path: &Path,
    model: &str,
) -> DocumentExtraction {
    let started = Instant::now();
    let mut analytics = DocumentAnalytics::new(pdf_path, model);
    let mut out = DocumentExtraction {
        source: pdf_path.to_path_buf(),
        bidder: BidderFacts::default(),
        payments: Vec::new(),
        work_experience: Vec::new(),
        analytics: DocumentAnalytics::default(),
    };

    match call_model(ai, company_name, pdf_path, model).await {
        Ok(resp) => {
            analytics.usage = resp.usage;
            analytics.model = resp.model;
            match parse_json_loose(&resp.text) {
                Some(v) => {
                    let (bidder, payments, work) = normalize_bidder_payload(&v);
                    out.bidder = bidder;
                    out.payments = payments;
                    out.work_experience = work;
                    analytics.success = true;
                }
                None => {
                    warn!(
                        "[{}] unparseable extraction response for {}",
                        company_name,
                        pdf_path.display()
                    );
                    analytics.error = Some("response is not valid JSON".to_string());
                }
            }
        }
        Err(e) => {
            warn!("[{}] extraction failed for {}: {}", company_name, pdf_path.display(), e);
            analytics.error = Some(e.to_string());
        }
    }

    analytics.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "[{}] {} done success={} payments={} work={} {}ms",
        company_name,
        analytics.file_name,
        analytics.success,
        out.payments.len(),
        out.work_experience.len(),
        analytics.duration_ms
    );
    out.analytics = analytics;
    out
}

async fn call_model(
    ai: &AiClient,
    company_name: &str,
    pdf_path: &Path,
    model: &str,
) -> Result<GenerateResponse, LlmError> {
    let handle = ai.upload(pdf_path, true).await?;
    let contents = vec![
        ContentPart::Text(bidder_prompt(company_name)),
        ContentPart::File(handle),
    ];
    ai.generate(contents, model, EXTRACTION_TEMPERATURE).await
}
