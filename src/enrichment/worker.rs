//! Enrichment worker.
//!
//! Resolves each queued item to exactly one label: fetch the image, fit it
//! to the oracle's payload budget, classify, normalize. Failures go through
//! the [`RetryPolicy`]; a run only stops early on zero remaining quota or
//! on cancellation, and in both cases the results gathered so far are
//! returned to the caller.

use super::error::OracleError;
use super::image_budget::ImageBudget;
use super::image_fetch::ImageFetcher;
use super::label::{DetectedLabel, LabelNormalizer};
use super::oracle::{OracleRequest, PatternOracle};
use super::prompt::build_instruction;
use super::retry_policy::{RetryDecision, RetryPolicy};
use super::sleeper::Sleeper;
use crate::config::EnrichmentSettings;
use crate::reconcile::WorkItem;
use crate::result_sink::EnrichmentResult;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Why a run ended before the queue was drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuotaExhausted,
    Cancelled,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<EnrichmentResult>,
    pub queued: usize,
    pub stop_reason: Option<StopReason>,
}

impl RunSummary {
    /// Number of results per detected label, sorted by label.
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts
                .entry(result.detected_label.as_str().to_string())
                .or_insert(0) += 1;
        }
        counts
    }

    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.detected_label.is_failure())
            .count()
    }
}

pub struct EnrichmentWorker {
    oracle: Arc<dyn PatternOracle>,
    fetcher: Arc<dyn ImageFetcher>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    normalizer: LabelNormalizer,
    instruction: String,
    budget: Option<ImageBudget>,
    inter_item_delay: Duration,
    stop_on_quota_exhausted: bool,
    cancelled: Arc<AtomicBool>,
}

impl EnrichmentWorker {
    pub fn new(
        oracle: Arc<dyn PatternOracle>,
        fetcher: Arc<dyn ImageFetcher>,
        sleeper: Arc<dyn Sleeper>,
        settings: &EnrichmentSettings,
    ) -> Self {
        Self {
            oracle,
            fetcher,
            sleeper,
            policy: RetryPolicy::new(settings),
            normalizer: LabelNormalizer::new(settings.long_response_threshold),
            instruction: build_instruction(),
            budget: None,
            inter_item_delay: settings.inter_item_delay(),
            stop_on_quota_exhausted: settings.stop_on_quota_exhausted,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_image_budget(mut self, budget: Option<ImageBudget>) -> Self {
        self.budget = budget;
        self
    }

    /// Shares a flag that, once set, stops the run before the next item.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// One fetch + classify round trip.
    fn attempt(&self, url: &str) -> Result<String, OracleError> {
        let payload = self.fetcher.fetch(url)?;
        let payload = match &self.budget {
            Some(budget) => budget
                .fit(payload)
                .map_err(|e| OracleError::Other(format!("Failed to adapt image: {}", e)))?,
            None => payload,
        };
        let request = OracleRequest {
            instruction: &self.instruction,
            image: &payload,
        };
        self.oracle.classify(&request)
    }

    /// Resolves one item to a label, retrying per the policy.
    ///
    /// Returns [`DetectedLabel::QuotaExceeded`] when the oracle reports zero
    /// remaining quota and [`DetectedLabel::Error`] once attempts run out.
    pub fn enrich_item(&self, item: &WorkItem) -> DetectedLabel {
        let Some(url) = item.image_url.as_deref() else {
            warn!("{} has no image URL", item.identifier);
            return DetectedLabel::Error;
        };

        let mut attempt = 0u32;
        loop {
            let error = match self.attempt(url) {
                Ok(text) => return self.normalizer.normalize(&text),
                Err(e) => e,
            };
            match self.policy.decide(&error, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "  attempt {}/{} failed: {}; retrying in {}s",
                        attempt + 1,
                        self.policy.max_attempts,
                        error,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay);
                }
                RetryDecision::Abort => {
                    error!("  {}", error);
                    return DetectedLabel::QuotaExceeded;
                }
                RetryDecision::Exhausted => {
                    warn!(
                        "  giving up after {} attempts: {}",
                        self.policy.max_attempts, error
                    );
                    return DetectedLabel::Error;
                }
            }
            attempt += 1;
        }
    }

    /// Enriches `items` in order, one at a time.
    pub fn run(&self, items: &[WorkItem]) -> RunSummary {
        let total = items.len();
        let mut summary = RunSummary {
            queued: total,
            ..RunSummary::default()
        };
        info!(
            "Enriching {} items with {} ({}s between items)",
            total,
            self.oracle.name(),
            self.inter_item_delay.as_secs_f64()
        );

        for (index, item) in items.iter().enumerate() {
            if self.is_cancelled() {
                warn!("Run cancelled after {} of {} items", index, total);
                summary.stop_reason = Some(StopReason::Cancelled);
                break;
            }

            info!("[{}/{}] {}", index + 1, total, item.identifier);
            let label = self.enrich_item(item);
            let quota_hit = label == DetectedLabel::QuotaExceeded;
            if label.is_failure() {
                warn!("[{}/{}] {} -> {}", index + 1, total, item.identifier, label);
            } else {
                info!("[{}/{}] {} -> {}", index + 1, total, item.identifier, label);
            }

            summary.results.push(EnrichmentResult {
                identifier: item.identifier.clone(),
                secondary_identifier: item.secondary_identifier.clone(),
                existing_label: item.existing_label.clone(),
                detected_label: label,
                image_url: item.image_url.clone().unwrap_or_default(),
                processed_at: Some(chrono::Local::now().naive_local()),
            });

            if quota_hit && self.stop_on_quota_exhausted {
                error!("Quota exhausted, stopping run after {} of {} items", index + 1, total);
                summary.stop_reason = Some(StopReason::QuotaExhausted);
                break;
            }
            if index + 1 < total && !self.inter_item_delay.is_zero() {
                self.sleeper.sleep(self.inter_item_delay);
            }
        }

        summary
    }
}
