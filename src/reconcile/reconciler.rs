//! Turns candidate work into the queue for one run.
//!
//! Prior-run detection is keyed on image URL and identifier only: an image
//! replaced behind an unchanged URL is never enriched again.

use super::work_queue::WorkItem;
use crate::result_sink::{EnrichmentResult, ResultSink};
use std::collections::HashSet;
use tracing::{info, warn};

/// Items already recorded by earlier runs.
#[derive(Debug, Default, Clone)]
pub struct ProcessedSet {
    identifiers: HashSet<String>,
    urls: HashSet<String>,
}

impl ProcessedSet {
    /// Builds the set from stored results. Rows labelled `QuotaExceeded`
    /// are left out so those items are retried.
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a EnrichmentResult>,
    {
        let mut set = ProcessedSet::default();
        for result in results.into_iter().filter(|r| r.counts_as_processed()) {
            set.identifiers.insert(result.identifier.clone());
            if !result.image_url.is_empty() {
                set.urls.insert(result.image_url.clone());
            }
        }
        set
    }

    pub fn contains(&self, item: &WorkItem) -> bool {
        self.identifiers.contains(&item.identifier)
            || item
                .image_url
                .as_ref()
                .is_some_and(|url| self.urls.contains(url))
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

/// Reads the processed set from `sink`. A sink that cannot be read is
/// logged and treated as empty.
pub fn load_processed(sink: &dyn ResultSink) -> ProcessedSet {
    match sink.load() {
        Ok(results) => {
            let set = ProcessedSet::from_results(&results);
            info!(
                "{} items already processed in {} stored results",
                set.len(),
                results.len()
            );
            set
        }
        Err(e) => {
            warn!("Could not read prior results, treating as none: {:#}", e);
            ProcessedSet::default()
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub candidates: usize,
    pub without_url: usize,
    pub duplicate_urls: usize,
    pub already_processed: usize,
    pub remaining: usize,
    pub queued: usize,
}

/// Builds the run's queue from `candidates` (in order): drops items without
/// an image URL, keeps the first item for each URL, removes items already
/// processed and caps the result at `cap`.
pub fn reconcile(
    candidates: Vec<WorkItem>,
    processed: &ProcessedSet,
    cap: Option<usize>,
) -> (Vec<WorkItem>, ReconcileReport) {
    let mut report = ReconcileReport {
        candidates: candidates.len(),
        ..ReconcileReport::default()
    };
    let mut seen_urls = HashSet::new();
    let mut queue = Vec::new();

    for item in candidates {
        let Some(url) = item.image_url.as_deref() else {
            report.without_url += 1;
            continue;
        };
        if !seen_urls.insert(url.to_string()) {
            report.duplicate_urls += 1;
            continue;
        }
        if processed.contains(&item) {
            report.already_processed += 1;
            continue;
        }
        queue.push(item);
    }

    report.remaining = queue.len();
    if let Some(cap) = cap {
        queue.truncate(cap);
    }
    report.queued = queue.len();

    info!(
        "Reconciled {} candidates: {} without image, {} duplicate URLs, {} already processed, {} remaining, {} queued",
        report.candidates,
        report.without_url,
        report.duplicate_urls,
        report.already_processed,
        report.remaining,
        report.queued
    );
    (queue, report)
}
