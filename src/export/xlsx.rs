use crate::storage::entity::{bidder, job};
use crate::storage::repository::{BidderRepository, CheckRepository, JobRepository, TenderRepository};
use log::info;
use rust_xlsxwriter::{Format, Workbook};
use sea_orm::{ConnectionTrait, DbErr};
use std::collections::HashMap;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("job {0} not found")]
    NotFound(i32),
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// One worksheet worth of rows, header first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sheet {
    pub name: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    fn new(name: &'static str, headers: &[&'static str]) -> Self {
        Self {
            name,
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }
}

/// Loads everything stored for the job into sheet rows.
pub async fn collect_sheets<C: ConnectionTrait>(db: &C, job_id: i32) -> Result<Vec<Sheet>, ExportError> {
    let job: job::Model = JobRepository::find(db, job_id)
        .await?
        .ok_or(ExportError::NotFound(job_id))?;

    let mut tender_sheet = Sheet::new("Tender", &["Field", "Value"]);
    tender_sheet.rows.push(vec!["Job".to_string(), job.name.clone()]);
    tender_sheet.rows.push(vec!["State".to_string(), job.state.clone()]);
    if let Some(t) = TenderRepository::find_by_job(db, job_id).await? {
        for (label, value) in [
            ("Tender ID", &t.tender_id),
            ("Reference", &t.ref_no),
            ("Title", &t.title),
            ("Department", &t.department_name),
            ("Organisation", &t.organisation_chain),
            ("Procurement category", &t.procurement_category),
            ("Tender type", &t.tender_type),
            ("Estimated value", &t.estimated_value),
            ("Currency", &t.currency),
            ("Validity from", &t.validity_from),
            ("Validity to", &t.validity_to),
            ("Published on", &t.published_on),
            ("Bid submission start", &t.bid_submission_start),
            ("Bid submission end", &t.bid_submission_end),
            ("Description", &t.description),
            ("Notice", &t.notice),
        ] {
            tender_sheet.rows.push(vec![label.to_string(), value.clone()]);
        }
    }

    let mut criteria_sheet = Sheet::new("Criteria", &["Sl No", "Criteria", "Supporting Document"]);
    for c in TenderRepository::criteria_for_job(db, job_id).await? {
        criteria_sheet
            .rows
            .push(vec![c.sl_no, c.criteria, c.supporting_document]);
    }

    let bidders = BidderRepository::list_for_job(db, job_id).await?;
    let names: HashMap<i32, String> = bidders.iter().map(|b| (b.id, b.company_name.clone())).collect();

    let mut bidder_sheet = Sheet::new(
        "Bidders",
        &[
            "Company", "Address", "Email", "Contact Person", "Contact No", "PAN", "GSTIN",
            "Place of Registration", "Offer Validity (days)", "Documents",
        ],
    );
    let mut payment_sheet = Sheet::new(
        "Payments",
        &["Company", "Vendor", "Mode", "Bank", "Transaction ID", "Amount", "Date", "Status"],
    );
    let mut work_sheet = Sheet::new(
        "Work Experience",
        &[
            "Company", "Vendor", "Name of Work", "Employer", "Location", "Contract Amount",
            "Start", "Completion", "Completion Certificate", "Attachment",
        ],
    );
    for b in &bidders {
        let docs = BidderRepository::documents_for(db, b.id).await?;
        bidder_sheet.rows.push(bidder_row(b, docs.len()));

        for p in BidderRepository::payments_for(db, b.id).await? {
            payment_sheet.rows.push(vec![
                b.company_name.clone(),
                p.vendor,
                p.payment_mode,
                p.bank_name,
                p.transaction_id.unwrap_or_default(),
                p.amount,
                p.transaction_date,
                p.status,
            ]);
        }
        for w in BidderRepository::work_for(db, b.id).await? {
            work_sheet.rows.push(vec![
                b.company_name.clone(),
                w.vendor_name,
                w.name_of_work,
                w.employer,
                w.location,
                w.contract_amount,
                w.date_of_start,
                w.date_of_completion,
                if w.has_completion_certificate { "yes" } else { "no" }.to_string(),
                w.attachment,
            ]);
        }
    }

    let mut eval_sheet = Sheet::new(
        "Evaluation",
        &["Company", "Overall", "Total", "Passed", "Failed", "Unknown", "Duration (ms)", "Error"],
    );
    let mut line_sheet = Sheet::new(
        "Evaluation Lines",
        &[
            "Company", "Sl No", "Criteria", "Supporting Document", "Result", "Reason", "Evidence",
            "Missing Documents",
        ],
    );
    for check in CheckRepository::list_for_job(db, job_id).await? {
        let company = names.get(&check.bidder_id).cloned().unwrap_or_default();
        eval_sheet.rows.push(vec![
            company.clone(),
            check.overall_result.clone(),
            check.total_criteria.to_string(),
            check.passed_criteria.to_string(),
            check.failed_criteria.to_string(),
            check.unknown_criteria.to_string(),
            check.duration_ms.to_string(),
            check.error_message.clone().unwrap_or_default(),
        ]);
        for line in CheckRepository::lines_for(db, check.id).await? {
            line_sheet.rows.push(vec![
                company.clone(),
                line.sl_no,
                line.criteria,
                line.supporting_document,
                line.result,
                line.reason,
                line.evidence,
                line.missing_documents,
            ]);
        }
    }

    Ok(vec![
        tender_sheet,
        criteria_sheet,
        bidder_sheet,
        payment_sheet,
        work_sheet,
        eval_sheet,
        line_sheet,
    ])
}

fn bidder_row(b: &bidder::Model, documents: usize) -> Vec<String> {
    vec![
        b.company_name.clone(),
        b.company_address.clone(),
        b.email_id.clone(),
        b.contact_person.clone(),
        b.contact_no.clone(),
        b.pan.clone(),
        b.gstin.clone(),
        b.place_of_registration.clone(),
        b.offer_validity_days.clone(),
        documents.to_string(),
    ]
}

pub fn render_workbook(sheets: &[Sheet]) -> Result<Workbook, ExportError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for sheet in sheets {
        let ws = workbook.add_worksheet();
        ws.set_name(sheet.name)?;
        for (col, header) in sheet.headers.iter().enumerate() {
            ws.write_string_with_format(0, col as u16, *header, &header_format)?;
        }
        for (row_index, row) in sheet.rows.iter().enumerate() {
            let row_no = (row_index + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                ws.write_string(row_no, col as u16, value)?;
            }
        }
    }
    Ok(workbook)
}

/// Writes the job workbook to `path` and returns the number of sheets.
pub async fn write_job_workbook<C: ConnectionTrait>(
    db: &C,
    job_id: i32,
    path: &Path,
) -> Result<usize, ExportError> {
    let sheets = collect_sheets(db, job_id).await?;
    let mut workbook = render_workbook(&sheets)?;
    workbook.save(path)?;
    info!(
        "job {} workbook written to {} ({} sheets)",
        job_id,
        path.display(),
        sheets.len()
    );
    Ok(sheets.len())
}
