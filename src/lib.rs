//! Pattern Curator Library
//!
//! Finds catalog rugs without a pattern label, asks a vision model to name
//! the pattern and serves the guesses for human review.

pub mod catalog;
pub mod config;
pub mod csv_io;
pub mod enrichment;
pub mod pipeline;
pub mod reconcile;
pub mod result_sink;
pub mod review_server;
pub mod review_store;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig};
pub use enrichment::{DetectedLabel, PatternLabel, PatternOracle};
pub use pipeline::{run, run_enrich, run_scan, Collaborators};
pub use result_sink::{CsvResultSink, EnrichmentResult, ResultSink};
pub use review_store::{ReviewStore, SqliteReviewStore};
