//! JSON API for reviewing enrichment results.

mod reviewer;
mod server;
mod state;

pub use reviewer::{Reviewer, ReviewerExtractionError, HEADER_REVIEWER};
pub use server::{make_app, run_server, serve};
pub use state::{GuardedReviewStore, ReviewState};
