pub mod evaluator;
pub mod model;

pub use evaluator::{evaluate_bidder, rank_pdfs, BidderEvidence, EvaluatorOptions};
pub use model::{derive_overall, serial_key, CheckLine, EvaluationOutcome, Verdict};
