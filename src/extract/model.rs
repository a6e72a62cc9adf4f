use crate::ai::TokenUsage;
use crate::extract::json::{flag_field, object_rows, text_field};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Identity, contact and tax fields of one bidder. Empty string means "not found".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidderFacts {
    pub company_name: String,
    pub company_address: String,
    pub email_id: String,
    pub contact_person: String,
    pub contact_no: String,
    pub pan: String,
    pub gstin: String,
    pub place_of_registration: String,
    pub offer_validity_days: String,
}

impl BidderFacts {
    pub fn from_value(v: &Value) -> Self {
        Self {
            company_name: text_field(v, &["company_name", "bidder_name", "name"]),
            company_address: text_field(v, &["company_address", "address"]),
            email_id: text_field(v, &["email_id", "email"]),
            contact_person: text_field(v, &["contact_person"]),
            contact_no: text_field(v, &["contact_no", "phone", "contact_number"]),
            pan: text_field(v, &["pan", "pan_no", "pan_number"]),
            gstin: text_field(v, &["gstin", "gst_no", "gst_number"]),
            place_of_registration: text_field(v, &["place_of_registration"]),
            offer_validity_days: text_field(v, &["offer_validity_days", "offer_validity"]),
        }
    }

    fn fields_mut(&mut self) -> [&mut String; 9] {
        [
            &mut self.company_name,
            &mut self.company_address,
            &mut self.email_id,
            &mut self.contact_person,
            &mut self.contact_no,
            &mut self.pan,
            &mut self.gstin,
            &mut self.place_of_registration,
            &mut self.offer_validity_days,
        ]
    }

    fn fields(&self) -> [&String; 9] {
        [
            &self.company_name,
            &self.company_address,
            &self.email_id,
            &self.contact_person,
            &self.contact_no,
            &self.pan,
            &self.gstin,
            &self.place_of_registration,
            &self.offer_validity_days,
        ]
    }

    /// Fills every empty field from `other`; populated fields are never overwritten.
    pub fn fill_missing_from(&mut self, other: &BidderFacts) {
        for (mine, theirs) in self.fields_mut().into_iter().zip(other.fields()) {
            if mine.is_empty() && !theirs.is_empty() {
                *mine = theirs.clone();
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRow {
    pub vendor: String,
    pub payment_mode: String,
    pub bank_name: String,
    pub transaction_id: String,
    pub amount: String,
    pub transaction_date: String,
    pub status: String,
}

impl PaymentRow {
    pub fn from_value(v: &Value) -> Self {
        Self {
            vendor: text_field(v, &["vendor", "vendor_name", "payer"]),
            payment_mode: text_field(v, &["payment_mode", "mode"]),
            bank_name: text_field(v, &["bank_name", "bank"]),
            transaction_id: text_field(v, &["transaction_id", "txn_id", "utr", "reference_no"]),
            amount: text_field(v, &["amount"]),
            transaction_date: text_field(v, &["transaction_date", "date"]),
            status: text_field(v, &["status"]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vendor.is_empty()
            && self.payment_mode.is_empty()
            && self.bank_name.is_empty()
            && self.transaction_id.is_empty()
            && self.amount.is_empty()
            && self.transaction_date.is_empty()
            && self.status.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkExperienceRow {
    pub vendor_name: String,
    pub name_of_work: String,
    pub employer: String,
    pub location: String,
    pub contract_amount: String,
    pub date_of_start: String,
    pub date_of_completion: String,
    pub completion_certificate: bool,
    pub attachment: String,
}

impl WorkExperienceRow {
    pub fn from_value(v: &Value) -> Self {
        Self {
            vendor_name: text_field(v, &["vendor_name", "company_name", "vendor"]),
            name_of_work: text_field(v, &["name_of_work", "work_name", "work"]),
            employer: text_field(v, &["employer", "client"]),
            location: text_field(v, &["location", "place"]),
            contract_amount: text_field(v, &["contract_amount", "amount", "value"]),
            date_of_start: text_field(v, &["date_of_start", "start_date"]),
            date_of_completion: text_field(v, &["date_of_completion", "completion_date"]),
            completion_certificate: flag_field(
                v,
                &["completion_certificate", "has_completion_certificate"],
            ),
            attachment: text_field(v, &["attachment", "attachment_name"]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name_of_work.is_empty()
            && self.employer.is_empty()
            && self.location.is_empty()
            && self.contract_amount.is_empty()
            && self.date_of_start.is_empty()
            && self.date_of_completion.is_empty()
    }

    /// Canonical identity of a work-experience row, shared by in-pass and persisted de-dup.
    pub fn dedup_key(&self) -> WorkKey {
        work_key(
            &self.name_of_work,
            &self.employer,
            &self.location,
            &self.date_of_start,
            &self.contract_amount,
        )
    }
}

pub type WorkKey = (String, String, String, String, String);

pub fn work_key(
    name_of_work: &str,
    employer: &str,
    location: &str,
    date_of_start: &str,
    contract_amount: &str,
) -> WorkKey {
    (
        normalize_key_part(name_of_work),
        normalize_key_part(employer),
        normalize_key_part(location),
        normalize_key_part(date_of_start),
        normalize_key_part(contract_amount),
    )
}

fn normalize_key_part(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderFacts {
    pub department_name: String,
    pub tender_id: String,
    pub ref_no: String,
    pub title: String,
    pub procurement_category: String,
    pub tender_type: String,
    pub organisation_chain: String,
    pub estimated_value: String,
    pub currency: String,
    pub validity_from: String,
    pub validity_to: String,
    pub published_on: String,
    pub bid_submission_start: String,
    pub bid_submission_end: String,
    pub description: String,
    pub notice: String,
}

impl TenderFacts {
    pub fn from_value(v: &Value) -> Self {
        Self {
            department_name: text_field(v, &["department_name", "department"]),
            tender_id: text_field(v, &["tender_id"]),
            ref_no: text_field(v, &["ref_no", "tender_reference_number", "reference_no"]),
            title: text_field(v, &["title", "tender_title", "name_of_work"]),
            procurement_category: text_field(v, &["procurement_category", "product_category"]),
            tender_type: text_field(v, &["tender_type"]),
            organisation_chain: text_field(v, &["organisation_chain", "organization_chain"]),
            estimated_value: text_field(
                v,
                &["estimated_value", "tender_value", "tender_value_in_rs"],
            ),
            currency: text_field(v, &["currency"]),
            validity_from: text_field(v, &["validity_from", "bid_validity_from"]),
            validity_to: text_field(v, &["validity_to", "bid_validity_to", "bid_validity"]),
            published_on: text_field(v, &["published_on", "published_date"]),
            bid_submission_start: text_field(
                v,
                &["bid_submission_start", "bid_submission_start_date"],
            ),
            bid_submission_end: text_field(v, &["bid_submission_end", "bid_submission_end_date"]),
            description: text_field(v, &["description", "work_description"]),
            notice: text_field(v, &["notice", "nit", "notice_text"]),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionRow {
    pub sl_no: String,
    pub criteria: String,
    pub supporting_document: String,
}

impl CriterionRow {
    pub fn is_empty(&self) -> bool {
        self.sl_no.is_empty() && self.criteria.is_empty() && self.supporting_document.is_empty()
    }
}

/// Outcome of one AI call over one document. Success or failure, cost is always attributed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnalytics {
    pub file_name: String,
    pub path: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub usage: TokenUsage,
    pub model: String,
}

impl DocumentAnalytics {
    pub fn new(path: &Path, model: &str) -> Self {
        Self {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: path.display().to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAnalytics {
    pub company_name: String,
    pub pdfs_received: u64,
    pub pdfs_valid: u64,
    pub calls: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub usage: TokenUsage,
    pub duration_ms: u64,
    pub documents: Vec<DocumentAnalytics>,
}

#[derive(Clone, Debug)]
pub struct DocumentExtraction {
    pub source: PathBuf,
    pub bidder: BidderFacts,
    pub payments: Vec<PaymentRow>,
    pub work_experience: Vec<WorkExperienceRow>,
    pub analytics: DocumentAnalytics,
}

#[derive(Clone, Debug)]
pub struct CompanyExtraction {
    pub company_name: String,
    pub bidder: BidderFacts,
    pub payments: Vec<PaymentRow>,
    pub work_experience: Vec<WorkExperienceRow>,
    /// Valid PDFs that were sent to the extractor, in path order.
    pub documents: Vec<PathBuf>,
    pub analytics: CompanyAnalytics,
}

#[derive(Clone, Debug)]
pub struct TenderExtraction {
    pub tender: TenderFacts,
    pub criteria: Vec<CriterionRow>,
    pub analytics: DocumentAnalytics,
}

/// Normalizes a bidder-extraction payload whether bidder fields are nested under `bidder`
/// or sit at the top level next to the row arrays.
pub fn normalize_bidder_payload(v: &Value) -> (BidderFacts, Vec<PaymentRow>, Vec<WorkExperienceRow>) {
    let bidder_src = match v.get("bidder") {
        Some(b) if b.is_object() => b,
        _ => v,
    };
    let bidder = BidderFacts::from_value(bidder_src);

    let payment_keys = ["payments", "payment_details", "emd_payments"];
    let mut payment_rows = object_rows(v, &payment_keys);
    if payment_rows.is_empty() {
        payment_rows = object_rows(bidder_src, &payment_keys);
    }
    let payments = payment_rows
        .into_iter()
        .map(PaymentRow::from_value)
        .filter(|p| !p.is_empty())
        .collect();

    let work_keys = ["work_experience", "work_experiences", "experience"];
    let mut work_rows = object_rows(v, &work_keys);
    if work_rows.is_empty() {
        work_rows = object_rows(bidder_src, &work_keys);
    }
    let work = work_rows
        .into_iter()
        .map(WorkExperienceRow::from_value)
        .filter(|w| !w.is_empty())
        .collect();

    (bidder, payments, work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_nested_payload() {
        let v = json!({
            "bidder": {"company_name": "Alpha", "pan": "ABCDE1234F"},
            "payments": [{"transaction_id": "TXN1", "amount": 5000}, {}],
            "work_experience": [{"name_of_work": "Road", "employer": "PWD"}, "junk"]
        });
        let (bidder, payments, work) = normalize_bidder_payload(&v);
        assert_eq!(bidder.company_name, "Alpha");
        assert_eq!(bidder.pan, "ABCDE1234F");
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, "5000");
        assert_eq!(work.len(), 1);
    }

    #[test]
    fn test_normalize_top_level_payload() {
        let v = json!({
            "companyName": "Beta",
            "gstin": "22AAAAA0000A1Z5",
            "bidder": "not an object",
            "payments": [{"txn_id": "T9"}]
        });
        let (bidder, payments, work) = normalize_bidder_payload(&v);
        assert_eq!(bidder.company_name, "Beta");
        assert_eq!(bidder.gstin, "22AAAAA0000A1Z5");
        assert_eq!(payments[0].transaction_id, "T9");
        assert!(work.is_empty());
    }

    #[test]
    fn test_fill_missing_keeps_first_value() {
        let mut a = BidderFacts {
            email_id: "a@x.in".to_string(),
            ..Default::default()
        };
        let b = BidderFacts {
            email_id: "b@x.in".to_string(),
            pan: "PAN1".to_string(),
            ..Default::default()
        };
        a.fill_missing_from(&b);
        assert_eq!(a.email_id, "a@x.in");
        assert_eq!(a.pan, "PAN1");
    }

    #[test]
    fn test_work_key_is_case_and_space_insensitive() {
        let a = WorkExperienceRow {
            name_of_work: "Road  Repair".to_string(),
            employer: "PWD".to_string(),
            contract_amount: "10 L".to_string(),
            ..Default::default()
        };
        let b = WorkExperienceRow {
            name_of_work: " road repair ".to_string(),
            employer: "pwd".to_string(),
            contract_amount: "10 l".to_string(),
            attachment: "other.pdf".to_string(),
            ..Default::default()
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
