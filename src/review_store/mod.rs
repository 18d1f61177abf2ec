mod csv_store;
mod models;
mod schema;
mod sqlite_store;

pub use csv_store::CsvReviewStore;
pub use models::*;
pub use schema::REVIEW_VERSIONED_SCHEMAS;
pub use sqlite_store::SqliteReviewStore;

use crate::config::{ReviewBackend, ReviewSettings};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Where human approve/reject decisions are kept.
///
/// One decision per identifier: the first reviewer to decide wins.
pub trait ReviewStore: Send + Sync {
    /// Stores `decision`. Returns `false` without writing when the
    /// identifier already has a decision.
    fn record_decision(&self, decision: &ReviewDecision) -> Result<bool>;
    /// Decisions made by `reviewer`, oldest first.
    fn list_decisions(&self, reviewer: &str) -> Result<Vec<ReviewDecision>>;
    fn is_reviewed(&self, identifier: &str) -> Result<bool>;
    fn reviewed_identifiers(&self) -> Result<HashSet<String>>;
    fn counts(&self) -> Result<ReviewCounts>;
}

pub fn open_review_store(settings: &ReviewSettings) -> Result<Arc<dyn ReviewStore>> {
    let store: Arc<dyn ReviewStore> = match settings.backend {
        ReviewBackend::Sqlite => Arc::new(SqliteReviewStore::new(&settings.db_path)?),
        ReviewBackend::Csv => Arc::new(CsvReviewStore::new(
            &settings.approved_path,
            &settings.rejected_path,
        )?),
    };
    Ok(store)
}
