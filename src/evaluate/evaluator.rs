use crate::ai::{AiClient, ContentPart, LlmError, TokenUsage};
use crate::evaluate::model::{derive_overall, serial_key, CheckLine, EvaluationOutcome, Verdict};
use crate::extract::json::{lookup, object_rows, parse_json_loose, scalar_text, text_field};
use crate::extract::model::{BidderFacts, CriterionRow, PaymentRow, WorkExperienceRow};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const EVALUATION_PROMPT_HEADER: &str =
    "You are evaluating bidder eligibility against the criteria of a tender.";

#[derive(Clone, Debug)]
pub struct EvaluatorOptions {
    pub model: String,
    pub temperature: f32,
    /// Attach the bidder's most relevant PDFs to the call.
    pub attach_pdfs: bool,
    pub pdf_limit: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.0,
            attach_pdfs: false,
            pdf_limit: 10,
        }
    }
}

/// Structured facts of one bidder as previously extracted and stored.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BidderEvidence {
    pub bidder: BidderFacts,
    pub payments: Vec<PaymentRow>,
    pub work_experience: Vec<WorkExperienceRow>,
}

/// Classifies every criterion for one bidder in a single AI call.
///
/// Provider errors propagate so the caller can record them on the check. A reply that does not
/// parse yields `unknown` with no lines.
pub async fn evaluate_bidder(
    ai: &AiClient,
    opts: &EvaluatorOptions,
    bidder_name: &str,
    evidence: &BidderEvidence,
    criteria: &[CriterionRow],
    pdf_paths: &[PathBuf],
) -> Result<EvaluationOutcome, LlmError> {
    let started = Instant::now();
    if criteria.is_empty() {
        info!("[{}] no criteria to evaluate", bidder_name);
        return Ok(EvaluationOutcome {
            overall_result: Verdict::Unknown,
            lines: Vec::new(),
            usage: TokenUsage::default(),
            model: opts.model.clone(),
            duration_ms: 0,
            calls: 0,
            parsed: true,
        });
    }

    let mut contents = vec![ContentPart::Text(build_prompt(bidder_name, evidence, criteria))];
    if opts.attach_pdfs {
        for path in rank_pdfs(criteria, pdf_paths, opts.pdf_limit) {
            match ai.upload(&path, true).await {
                Ok(handle) => contents.push(ContentPart::File(handle)),
                Err(e) => warn!("[{}] skip attachment {}: {}", bidder_name, path.display(), e),
            }
        }
    }

    let resp = ai.generate(contents, &opts.model, opts.temperature).await?;
    let (overall_result, lines, parsed) = match parse_json_loose(&resp.text) {
        Some(v) => {
            let lines = parse_lines(&v, criteria);
            let stated = text_field(&v, &["overall_result", "overall", "result"]);
            let derived = derive_overall(&lines, criteria);
            let overall = match Verdict::parse(&stated) {
                // a stated pass still needs a pass line for every criterion
                Verdict::Pass if derived != Verdict::Pass => derived,
                Verdict::Unknown if stated.is_empty() => derived,
                other => other,
            };
            (overall, lines, true)
        }
        None => {
            warn!("[{}] unparseable evaluation response", bidder_name);
            (Verdict::Unknown, Vec::new(), false)
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "[{}] evaluated: {} ({} lines, {} tokens, {}ms)",
        bidder_name,
        overall_result,
        lines.len(),
        resp.usage.total_tokens,
        duration_ms
    );
    Ok(EvaluationOutcome {
        overall_result,
        lines,
        usage: resp.usage,
        model: resp.model,
        duration_ms,
        calls: 1,
        parsed,
    })
}

pub fn build_prompt(bidder_name: &str, evidence: &BidderEvidence, criteria: &[CriterionRow]) -> String {
    let facts = serde_json::to_string_pretty(evidence).unwrap_or_else(|_| "{}".to_string());
    let mut lines = Vec::new();
    lines.push(EVALUATION_PROMPT_HEADER.to_string());
    lines.push(format!("Bidder: {bidder_name}"));
    lines.push(
        "Be conservative. Use \"pass\" only when the facts below clearly prove the criterion. \
         Missing or unclear evidence is \"unknown\"; contradicting evidence is \"fail\"."
            .to_string(),
    );
    lines.push("Return ONLY one JSON object, no markdown.".to_string());
    lines.push("".to_string());
    lines.push("Bidder facts (JSON):".to_string());
    lines.push(facts);
    lines.push("".to_string());
    lines.push("Criteria:".to_string());
    for c in criteria {
        let mut line = format!("- [{}] {}", c.sl_no, compact(&c.criteria));
        if !c.supporting_document.is_empty() {
            line.push_str(" | Docs: ");
            line.push_str(&compact(&c.supporting_document));
        }
        lines.push(line);
    }
    lines.push("".to_string());
    lines.push("Schema:".to_string());
    lines.push(
        "{\"overall_result\": \"pass|fail|unknown\", \"criteria_results\": [{\"sl_no\": \"\", \
         \"result\": \"pass|fail|unknown\", \"reason\": \"\", \"evidence\": \"\", \
         \"missing_documents\": \"\"}]}"
            .to_string(),
    );
    lines.push("Give one criteria_results row per criterion, using its sl_no as listed.".to_string());
    lines.join("\n")
}

fn compact(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// At most one line per criterion, in criteria order; criterion fields are copied from the
/// matching `sl_no`. Rows naming an unlisted serial, and repeats of a serial, are dropped.
fn parse_lines(v: &Value, criteria: &[CriterionRow]) -> Vec<CheckLine> {
    let mut by_sl: HashMap<String, CheckLine> = HashMap::new();
    let mut dropped = 0usize;
    for row in object_rows(v, &["criteria_results", "lines", "results"]) {
        let key = serial_key(&scalar_text(lookup(row, &["sl_no", "s_no", "serial"])));
        let Some(criterion) = criteria.iter().find(|c| serial_key(&c.sl_no) == key) else {
            dropped += 1;
            continue;
        };
        if by_sl.contains_key(&key) {
            dropped += 1;
            continue;
        }
        by_sl.insert(
            key,
            CheckLine {
                sl_no: criterion.sl_no.clone(),
                criteria: criterion.criteria.clone(),
                supporting_document: criterion.supporting_document.clone(),
                result: Verdict::parse(&scalar_text(lookup(row, &["result", "verdict", "status"]))),
                reason: text_field(row, &["reason", "reasoning"]),
                evidence: text_field(row, &["evidence"]),
                missing_documents: missing_text(lookup(row, &["missing_documents", "missing"])),
            },
        );
    }
    if dropped > 0 {
        warn!("dropped {} evaluation rows with unlisted or repeated serials", dropped);
    }
    criteria
        .iter()
        .filter_map(|c| by_sl.remove(&serial_key(&c.sl_no)))
        .collect()
}

fn missing_text(v: Option<&Value>) -> String {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| scalar_text(Some(i)))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => scalar_text(other),
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "any", "all", "shall", "should", "must",
    "have", "has", "are", "per", "its", "not", "copy", "last", "years", "year", "bidder", "document",
    "documents", "pdf",
];

fn tokens(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Orders PDFs by how many criteria keywords their file name shares, keeping at most `limit`.
pub fn rank_pdfs(criteria: &[CriterionRow], paths: &[PathBuf], limit: usize) -> Vec<PathBuf> {
    let keywords: HashSet<String> = criteria
        .iter()
        .flat_map(|c| tokens(&format!("{} {}", c.criteria, c.supporting_document)))
        .collect();

    let mut scored: Vec<(usize, &PathBuf)> = paths
        .iter()
        .map(|p| (score_path(p, &keywords), p))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(limit).map(|(_, p)| p.clone()).collect()
}

fn score_path(path: &Path, keywords: &HashSet<String>) -> usize {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    tokens(&stem).intersection(keywords).count()
}
