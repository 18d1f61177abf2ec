mod csv_sink;
mod lock;
mod models;

pub use csv_sink::CsvResultSink;
pub use lock::RunLock;
pub use models::{EnrichmentResult, TIMESTAMP_FORMAT};

use anyhow::Result;

/// Durable, append-only record of enrichment outcomes.
pub trait ResultSink {
    /// Appends `results`, creating the store when absent. Returns the
    /// number of rows written.
    fn append(&self, results: &[EnrichmentResult]) -> Result<usize>;

    /// Loads every readable result. Malformed rows are skipped.
    fn load(&self) -> Result<Vec<EnrichmentResult>>;
}
