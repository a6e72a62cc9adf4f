use crate::job::model::{ChatRole, ChatTurn};
use crate::storage::entity::{bidder, bidder_check, eligibility_criterion, payment, tender, work_experience};

pub const CHAT_PROMPT_HEADER: &str = "You answer questions about a tender evaluation job.";
pub const MAX_HISTORY_TURNS: usize = 10;

/// Facts of one bidder that may be shown through chat.
pub struct BidderSheet<'a> {
    pub bidder: &'a bidder::Model,
    pub payments: &'a [payment::Model],
    pub work: &'a [work_experience::Model],
    pub check: Option<&'a bidder_check::Model>,
}

/// Plain-text fact sheet of a job. Contact details, tax ids and transaction ids stay out.
pub fn build_fact_sheet(
    tender: Option<&tender::Model>,
    criteria: &[eligibility_criterion::Model],
    bidders: &[BidderSheet<'_>],
) -> String {
    let mut lines = Vec::new();
    match tender {
        Some(t) => {
            lines.push("Tender:".to_string());
            push_field(&mut lines, "Tender ID", &t.tender_id);
            push_field(&mut lines, "Reference", &t.ref_no);
            push_field(&mut lines, "Title", &t.title);
            push_field(&mut lines, "Department", &t.department_name);
            push_field(&mut lines, "Organisation", &t.organisation_chain);
            push_field(&mut lines, "Category", &t.procurement_category);
            push_field(&mut lines, "Type", &t.tender_type);
            push_field(&mut lines, "Estimated value", &format!("{} {}", t.estimated_value, t.currency));
            push_field(&mut lines, "Published", &t.published_on);
            push_field(&mut lines, "Bid submission end", &t.bid_submission_end);
            push_field(&mut lines, "Description", &t.description);
        }
        None => lines.push("Tender: not extracted yet".to_string()),
    }

    lines.push("".to_string());
    lines.push(format!("Eligibility criteria ({}):", criteria.len()));
    for c in criteria {
        let mut line = format!("- [{}] {}", c.sl_no, c.criteria);
        if !c.supporting_document.is_empty() {
            line.push_str(&format!(" (documents: {})", c.supporting_document));
        }
        lines.push(line);
    }

    lines.push("".to_string());
    lines.push(format!("Bidders ({}):", bidders.len()));
    for sheet in bidders {
        let b = sheet.bidder;
        lines.push(format!("* {}", b.company_name));
        push_field(&mut lines, "  Place of registration", &b.place_of_registration);
        push_field(&mut lines, "  Offer validity (days)", &b.offer_validity_days);
        if !sheet.payments.is_empty() {
            let paid: Vec<String> = sheet
                .payments
                .iter()
                .map(|p| {
                    [p.payment_mode.as_str(), p.amount.as_str(), p.status.as_str()]
                        .iter()
                        .filter(|s| !s.is_empty())
                        .copied()
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect();
            lines.push(format!("  Payments: {}", paid.join("; ")));
        }
        for w in sheet.work {
            lines.push(format!(
                "  Work: {} for {} at {} ({} to {}, amount {}, certificate: {})",
                w.name_of_work,
                w.employer,
                w.location,
                w.date_of_start,
                w.date_of_completion,
                w.contract_amount,
                if w.has_completion_certificate { "yes" } else { "no" }
            ));
        }
        if let Some(check) = sheet.check {
            lines.push(format!(
                "  Evaluation: {} (passed {}, failed {}, unknown {} of {})",
                check.overall_result,
                check.passed_criteria,
                check.failed_criteria,
                check.unknown_criteria,
                check.total_criteria
            ));
        }
    }
    lines.join("\n")
}

fn push_field(lines: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        lines.push(format!("{label}: {value}"));
    }
}

pub fn build_chat_prompt(fact_sheet: &str, question: &str, history: &[ChatTurn]) -> String {
    let mut lines = Vec::new();
    lines.push(CHAT_PROMPT_HEADER.to_string());
    lines.push(
        "Answer only from the facts below. If the facts do not contain the answer, say so. \
         Never reveal email addresses, phone numbers, contact persons, PAN, GSTIN or \
         transaction ids."
            .to_string(),
    );
    lines.push("".to_string());
    lines.push("Facts:".to_string());
    lines.push(fact_sheet.to_string());

    let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    if start < history.len() {
        lines.push("".to_string());
        lines.push("Conversation so far:".to_string());
        for turn in &history[start..] {
            let who = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            lines.push(format!("{who}: {}", turn.text.trim()));
        }
    }
    lines.push("".to_string());
    lines.push(format!("Question: {}", question.trim()));
    lines.join("\n")
}
