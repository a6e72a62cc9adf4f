use crate::ai::TokenUsage;
use crate::extract::model::{CompanyAnalytics, DocumentAnalytics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTotals {
    pub calls: u64,
    pub usage: TokenUsage,
}

impl CallTotals {
    pub fn add(&mut self, calls: u64, usage: TokenUsage) {
        self.calls += calls;
        self.usage += usage;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionAnalytics {
    pub duration_ms: u64,
    pub pdfs_received: u64,
    pub pdfs_processed: u64,
    pub companies_total: u64,
    pub companies_processed: u64,
    pub calls: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tender: Option<DocumentAnalytics>,
    #[serde(default)]
    pub companies: BTreeMap<String, CompanyAnalytics>,
}

impl ExtractionAnalytics {
    pub fn record_tender(&mut self, doc: DocumentAnalytics) {
        self.pdfs_received += 1;
        self.pdfs_processed += 1;
        self.calls += 1;
        if doc.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.usage += doc.usage;
        self.tender = Some(doc);
    }

    /// Folds one company in. Order of calls does not change the result.
    pub fn record_company(&mut self, company: CompanyAnalytics) {
        self.pdfs_received += company.pdfs_received;
        self.pdfs_processed += company.pdfs_valid;
        self.companies_processed += 1;
        self.calls += company.calls;
        self.succeeded += company.succeeded;
        self.failed += company.failed;
        self.usage += company.usage;
        self.companies.insert(company.company_name.clone(), company);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidderEvaluationAnalytics {
    pub overall_result: String,
    pub duration_ms: u64,
    pub calls: u64,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationAnalytics {
    pub duration_ms: u64,
    pub bidders_total: u64,
    pub bidders_evaluated: u64,
    pub bidders_failed: u64,
    pub calls: u64,
    pub usage: TokenUsage,
    #[serde(default)]
    pub bidders: BTreeMap<String, BidderEvaluationAnalytics>,
}

impl EvaluationAnalytics {
    pub fn record_bidder(&mut self, name: &str, bidder: BidderEvaluationAnalytics) {
        self.bidders_evaluated += 1;
        if bidder.error.is_some() {
            self.bidders_failed += 1;
        }
        self.calls += bidder.calls;
        self.usage += bidder.usage;
        self.bidders.insert(name.to_string(), bidder);
    }
}

/// Analytics blob stored on the job. Evaluation is merged into extraction, never replacing it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAnalytics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionAnalytics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationAnalytics>,
    #[serde(default)]
    pub totals: CallTotals,
}

impl JobAnalytics {
    /// Lenient load: a missing or unreadable blob starts empty.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    pub fn with_extraction(mut self, extraction: ExtractionAnalytics) -> Self {
        self.extraction = Some(extraction);
        self.recompute_totals();
        self
    }

    pub fn with_evaluation(mut self, evaluation: EvaluationAnalytics) -> Self {
        self.evaluation = Some(evaluation);
        self.recompute_totals();
        self
    }

    fn recompute_totals(&mut self) {
        let mut totals = CallTotals::default();
        if let Some(x) = &self.extraction {
            totals.add(x.calls, x.usage);
        }
        if let Some(e) = &self.evaluation {
            totals.add(e.calls, e.usage);
        }
        self.totals = totals;
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
