//! Stage orchestration: catalog → work queue → enrichment → result file.

use crate::catalog::{scan_catalog_file, CategoryFilter, ScanOptions};
use crate::config::AppConfig;
use crate::enrichment::{
    build_oracle, image_budget_for, EnrichmentWorker, HttpImageFetcher, ImageFetcher,
    PatternOracle, RunSummary, Sleeper, StopReason, ThreadSleeper,
};
use crate::reconcile::{load_processed, read_work_queue, reconcile, write_work_queue, WorkItem};
use crate::result_sink::{CsvResultSink, ResultSink};
use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The external services an enrichment run talks to.
pub struct Collaborators {
    pub oracle: Arc<dyn PatternOracle>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Collaborators {
    /// Builds the configured oracle and HTTP fetcher. Fails on a missing
    /// credential before anything else is touched.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let oracle = build_oracle(&config.oracle)?;
        let fetcher = HttpImageFetcher::new(Duration::from_secs(
            config.enrichment.fetch_timeout_secs,
        ))?;
        Ok(Self {
            oracle,
            fetcher: Arc::new(fetcher),
            sleeper: Arc::new(ThreadSleeper),
        })
    }
}

/// Scans the catalog and writes the work-queue file.
pub fn run_scan(config: &AppConfig) -> Result<Vec<WorkItem>> {
    let catalog_path = config
        .catalog_path
        .as_ref()
        .context("No catalog file configured (use --catalog or set catalog_path)")?;
    let options = ScanOptions {
        columns: config.columns.clone(),
        filter: CategoryFilter::new(&config.filter.category_substring),
        chunk_size: config.filter.chunk_size,
    };
    info!("Scanning catalog {:?}", catalog_path);
    let scan = scan_catalog_file(catalog_path, &options)?;
    if scan.skipped_records > 0 {
        warn!("Skipped {} undecodable catalog records", scan.skipped_records);
    }

    let items: Vec<WorkItem> = scan
        .rows
        .iter()
        .map(|row| WorkItem::from_catalog_row(row, &config.filter.image_role))
        .collect();
    let with_image = items.iter().filter(|i| i.image_url.is_some()).count();
    info!(
        "{} rows need a pattern, {} have a '{}' image",
        items.len(),
        with_image,
        config.filter.image_role
    );

    write_work_queue(&config.work_queue_path, &config.columns, &items)?;
    Ok(items)
}

fn sample_cap(sample_size: usize) -> Option<usize> {
    (sample_size > 0).then_some(sample_size)
}

/// How many more items today's budget allows, or `None` without a cap.
fn daily_allowance(config: &AppConfig, sink: &CsvResultSink) -> Option<usize> {
    let cap = config.enrichment.daily_request_cap?;
    let today = chrono::Local::now().date_naive();
    let used = sink.count_processed_on(today).unwrap_or_else(|e| {
        warn!("Could not count today's results, assuming none: {:#}", e);
        0
    });
    let remaining = cap.saturating_sub(used);
    info!(
        "Daily cap {}: {} used today, {} remaining",
        cap, used, remaining
    );
    Some(remaining)
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Enriched {} of {} items ({} failed)",
        summary.results.len(),
        summary.queued,
        summary.failures()
    );
    for (label, count) in summary.label_counts() {
        info!("  {}: {}", label, count);
    }
    match summary.stop_reason {
        Some(StopReason::QuotaExhausted) => {
            warn!("Run stopped early: oracle quota exhausted, try again after it resets")
        }
        Some(StopReason::Cancelled) => warn!("Run stopped early: interrupted"),
        None => {}
    }
}

/// Reconciles the work queue against earlier results, enriches what is
/// left and appends the outcome to the result file.
///
/// Results gathered before an early stop are still written.
pub fn run_enrich(
    config: &AppConfig,
    collaborators: &Collaborators,
    cancelled: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let sink = CsvResultSink::new(&config.results_path, config.columns.clone());
    let _lock = sink.lock()?;

    let mut cap = sample_cap(config.enrichment.sample_size);
    if let Some(allowance) = daily_allowance(config, &sink) {
        if allowance == 0 {
            info!("Daily request cap reached, nothing to do");
            return Ok(RunSummary::default());
        }
        cap = Some(cap.map_or(allowance, |c| c.min(allowance)));
    }

    let candidates = read_work_queue(&config.work_queue_path, &config.columns)?;
    let processed = load_processed(&sink);
    let (queue, _report) = reconcile(candidates, &processed, cap);
    if queue.is_empty() {
        info!("Nothing left to enrich");
        return Ok(RunSummary::default());
    }

    let worker = EnrichmentWorker::new(
        collaborators.oracle.clone(),
        collaborators.fetcher.clone(),
        collaborators.sleeper.clone(),
        &config.enrichment,
    )
    .with_image_budget(image_budget_for(&config.oracle))
    .with_cancel_flag(cancelled);

    let summary = worker.run(&queue);
    sink.append(&summary.results)?;
    log_summary(&summary);
    Ok(summary)
}

/// Scans the catalog, then enriches.
pub fn run(
    config: &AppConfig,
    collaborators: &Collaborators,
    cancelled: Arc<AtomicBool>,
) -> Result<RunSummary> {
    run_scan(config)?;
    run_enrich(config, collaborators, cancelled)
}
