pub mod company;
pub mod document;
pub mod json;
pub mod model;
pub mod prompt;
pub mod tender;

pub use company::{aggregate_company, is_valid_pdf, merge_documents};
pub use document::extract_document;
pub use json::parse_json_loose;
pub use model::{
    BidderFacts, CompanyAnalytics, CompanyExtraction, CriterionRow, DocumentAnalytics,
    DocumentExtraction, PaymentRow, TenderExtraction, TenderFacts, WorkExperienceRow,
};
pub use tender::{extract_tender, TenderCallError};
