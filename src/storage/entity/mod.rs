pub mod app_setting;
pub mod bidder;
pub mod bidder_check;
pub mod bidder_check_line;
pub mod bidder_document;
pub mod eligibility_criterion;
pub mod job;
pub mod payment;
pub mod tender;
pub mod work_experience;

pub use app_setting::Entity as AppSetting;
pub use bidder::Entity as Bidder;
pub use bidder_check::Entity as BidderCheck;
pub use bidder_check_line::Entity as BidderCheckLine;
pub use bidder_document::Entity as BidderDocument;
pub use eligibility_criterion::Entity as EligibilityCriterion;
pub use job::Entity as Job;
pub use payment::Entity as Payment;
pub use tender::Entity as Tender;
pub use work_experience::Entity as WorkExperience;
