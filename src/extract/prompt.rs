pub const BIDDER_PROMPT_HEADER: &str = "You are extracting bidder facts from one tender bid document.";
pub const TENDER_PROMPT_HEADER: &str = "You are extracting tender metadata from a tender notice document.";

pub fn bidder_prompt(company_name: &str) -> String {
    let mut lines = Vec::new();
    lines.push(BIDDER_PROMPT_HEADER.to_string());
    lines.push(format!("The document was submitted by the bidding company \"{company_name}\"."));
    lines.push("Return ONLY one JSON object, no markdown, no explanations.".to_string());
    lines.push(
        "Fill a field ONLY when its value is explicitly present in the document. Never guess; \
         use an empty string for anything not found."
            .to_string(),
    );
    lines.push("".to_string());
    lines.push("Schema:".to_string());
    lines.push("{".to_string());
    lines.push("  \"bidder\": {".to_string());
    lines.push("    \"company_name\": \"\", \"company_address\": \"\", \"email_id\": \"\",".to_string());
    lines.push("    \"contact_person\": \"\", \"contact_no\": \"\", \"pan\": \"\", \"gstin\": \"\",".to_string());
    lines.push("    \"place_of_registration\": \"\", \"offer_validity_days\": \"\"".to_string());
    lines.push("  },".to_string());
    lines.push("  \"payments\": [".to_string());
    lines.push(
        "    {\"vendor\": \"\", \"payment_mode\": \"\", \"bank_name\": \"\", \"transaction_id\": \"\", \
         \"amount\": \"\", \"transaction_date\": \"\", \"status\": \"\"}"
            .to_string(),
    );
    lines.push("  ],".to_string());
    lines.push("  \"work_experience\": [".to_string());
    lines.push(
        "    {\"vendor_name\": \"\", \"name_of_work\": \"\", \"employer\": \"\", \"location\": \"\", \
         \"contract_amount\": \"\", \"date_of_start\": \"\", \"date_of_completion\": \"\", \
         \"completion_certificate\": false, \"attachment\": \"\"}"
            .to_string(),
    );
    lines.push("  ]".to_string());
    lines.push("}".to_string());
    lines.push("".to_string());
    lines.push("Rules:".to_string());
    lines.push("- payments: one row per fee/EMD/transaction receipt shown in the document.".to_string());
    lines.push("- work_experience: one row per completed or ongoing contract listed.".to_string());
    lines.push("- completion_certificate is true only if a completion certificate is attached.".to_string());
    lines.push("- Keep amounts and dates exactly as printed.".to_string());
    lines.join("\n")
}

pub fn tender_prompt() -> String {
    let mut lines = Vec::new();
    lines.push(TENDER_PROMPT_HEADER.to_string());
    lines.push("Return ONLY one JSON object, no markdown, no explanations.".to_string());
    lines.push(
        "Fill a field ONLY when its value is explicitly present; use an empty string otherwise."
            .to_string(),
    );
    lines.push("".to_string());
    lines.push("Schema:".to_string());
    lines.push("{".to_string());
    lines.push("  \"tender\": {".to_string());
    lines.push("    \"department_name\": \"\", \"tender_id\": \"\", \"ref_no\": \"\", \"title\": \"\",".to_string());
    lines.push("    \"procurement_category\": \"\", \"tender_type\": \"\", \"organisation_chain\": \"\",".to_string());
    lines.push("    \"estimated_value\": \"\", \"currency\": \"\", \"validity_from\": \"\", \"validity_to\": \"\",".to_string());
    lines.push("    \"published_on\": \"\", \"bid_submission_start\": \"\", \"bid_submission_end\": \"\",".to_string());
    lines.push("    \"description\": \"\", \"notice\": \"\"".to_string());
    lines.push("  },".to_string());
    lines.push("  \"eligibility_criteria\": [".to_string());
    lines.push("    {\"sl_no\": \"\", \"criteria\": \"\", \"supporting_document\": \"\"}".to_string());
    lines.push("  ]".to_string());
    lines.push("}".to_string());
    lines.push("".to_string());
    lines.push("Rules:".to_string());
    lines.push(
        "- eligibility_criteria: copy the eligibility / pre-qualification table row by row, in \
         document order, keeping serial numbers as printed."
            .to_string(),
    );
    lines.push("- supporting_document: the proof the bidder must submit for that row.".to_string());
    lines.join("\n")
}
