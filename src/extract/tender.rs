use crate::ai::{AiClient, ContentPart, GenerateResponse, LlmError};
use crate::extract::document::EXTRACTION_TEMPERATURE;
use crate::extract::json::{lookup, object_rows, parse_json_loose, scalar_text};
use crate::extract::model::{CriterionRow, DocumentAnalytics, TenderExtraction, TenderFacts};
use crate::extract::prompt::tender_prompt;
use log::{info, warn};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

/// A failed tender call together with what it cost.
#[derive(thiserror::Error, Debug)]
#[error("{source}")]
pub struct TenderCallError {
    pub source: LlmError,
    pub analytics: DocumentAnalytics,
}

/// Extracts tender metadata and the eligibility-criteria table from `tender.pdf`.
///
/// Provider failures propagate: without a tender the job cannot be evaluated. An unparseable
/// reply degrades to empty facts with `analytics.success == false`.
pub async fn extract_tender(
    ai: &AiClient,
    pdf_path: &Path,
    model: &str,
) -> Result<TenderExtraction, TenderCallError> {
    let started = Instant::now();
    let mut analytics = DocumentAnalytics::new(pdf_path, model);

    let resp = match call_model(ai, pdf_path, model).await {
        Ok(resp) => resp,
        Err(source) => {
            warn!("tender extraction failed for {}: {}", pdf_path.display(), source);
            analytics.duration_ms = started.elapsed().as_millis() as u64;
            analytics.error = Some(source.to_string());
            return Err(TenderCallError { source, analytics });
        }
    };
    analytics.usage = resp.usage;
    analytics.model = resp.model;

    let (tender, criteria) = match parse_json_loose(&resp.text) {
        Some(v) => {
            analytics.success = true;
            normalize_tender_payload(&v)
        }
        None => {
            warn!("unparseable tender response for {}", pdf_path.display());
            analytics.error = Some("response is not valid JSON".to_string());
            (TenderFacts::default(), Vec::new())
        }
    };
    analytics.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "tender extracted: id={} criteria={} {}ms",
        tender.tender_id,
        criteria.len(),
        analytics.duration_ms
    );

    Ok(TenderExtraction {
        tender,
        criteria,
        analytics,
    })
}

async fn call_model(
    ai: &AiClient,
    pdf_path: &Path,
    model: &str,
) -> Result<GenerateResponse, LlmError> {
    let handle = ai.upload(pdf_path, true).await?;
    ai.generate(
        vec![ContentPart::Text(tender_prompt()), ContentPart::File(handle)],
        model,
        EXTRACTION_TEMPERATURE,
    )
    .await
}

pub fn normalize_tender_payload(v: &Value) -> (TenderFacts, Vec<CriterionRow>) {
    let tender_src = match v.get("tender") {
        Some(t) if t.is_object() => t,
        _ => v,
    };
    let tender = TenderFacts::from_value(tender_src);

    let keys = ["eligibility_criteria", "criteria", "eligibility"];
    let mut rows = object_rows(v, &keys);
    if rows.is_empty() {
        rows = object_rows(tender_src, &keys);
    }
    (tender, normalize_criteria(&rows))
}

/// Drops non-object rows (already done by the caller), coerces the three fields to strings and
/// discards rows empty across all of them.
pub fn normalize_criteria(rows: &[&Value]) -> Vec<CriterionRow> {
    rows.iter()
        .map(|row| CriterionRow {
            sl_no: scalar_text(lookup(row, &["sl_no", "s_no", "serial", "sr_no"])),
            criteria: scalar_text(lookup(row, &["criteria", "criterion", "description"])),
            supporting_document: scalar_text(lookup(
                row,
                &["supporting_document", "supporting_documents", "document_required"],
            )),
        })
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{fn_client, reply};
    use serde_json::json;

    #[test]
    fn test_normalize_criteria_coerces_and_drops() {
        let v = json!({
            "tender": {"tender_id": "2024_PWD_1", "department_name": "PWD"},
            "eligibility_criteria": [
                {"sl_no": 1, "criteria": "Turnover >= 50L", "supporting_document": "CA certificate"},
                "not a row",
                {"sl_no": "", "criteria": null, "supporting_document": ""},
                {"slNo": "2", "criterion": "Similar work", "supportingDocuments": "Work orders"}
            ]
        });
        let (tender, criteria) = normalize_tender_payload(&v);
        assert_eq!(tender.tender_id, "2024_PWD_1");
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].sl_no, "1");
        assert_eq!(criteria[1].criteria, "Similar work");
        assert_eq!(criteria[1].supporting_document, "Work orders");
    }

    #[test]
    fn test_normalize_flat_payload() {
        let v = json!({"tender_id": "T-9", "criteria": [{"sl_no": "A", "criteria": "x"}]});
        let (tender, criteria) = normalize_tender_payload(&v);
        assert_eq!(tender.tender_id, "T-9");
        assert_eq!(criteria.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_tender_degrades_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("tender.pdf");
        std::fs::write(&pdf, vec![b'x'; 300]).unwrap();
        let (ai, _) = fn_client(|_| Ok(reply("no json here", 4)));
        let out = extract_tender(&ai, &pdf, "m").await.unwrap();
        assert!(!out.analytics.success);
        assert_eq!(out.analytics.usage.total_tokens, 4);
        assert!(out.criteria.is_empty());
    }

    #[tokio::test]
    async fn test_extract_tender_propagates_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("tender.pdf");
        std::fs::write(&pdf, vec![b'x'; 300]).unwrap();
        let (ai, _) = fn_client(|_| Err(LlmError::Unauthorized("API key expired".to_string())));
        let err = extract_tender(&ai, &pdf, "m").await.unwrap_err();
        assert!(matches!(err.source, LlmError::Unauthorized(_)));
        assert!(!err.analytics.success);
        assert_eq!(err.analytics.file_name, "tender.pdf");
        assert!(err.analytics.error.as_deref().unwrap_or("").contains("API key expired"));
    }
}
