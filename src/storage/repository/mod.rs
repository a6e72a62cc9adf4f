pub mod bidder_repo;
pub mod check_repo;
pub mod job_repo;
pub mod setting_repo;
pub mod tender_repo;

pub use bidder_repo::{BidderRepository, PersistSummary};
pub use check_repo::{CheckRepository, NewCheck};
pub use job_repo::JobRepository;
pub use setting_repo::SettingRepository;
pub use tender_repo::TenderRepository;
