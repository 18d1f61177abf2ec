use crate::result_sink::EnrichmentResult;
use crate::review_store::ReviewStore;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub type GuardedReviewStore = Arc<dyn ReviewStore>;

/// Shared state of the review API.
///
/// The result list is loaded once and never mutated; each reviewer only
/// owns a cursor into the still-pending part of it.
#[derive(Clone)]
pub struct ReviewState {
    items: Arc<Vec<EnrichmentResult>>,
    pub store: GuardedReviewStore,
    cursors: Arc<Mutex<HashMap<String, usize>>>,
}

pub struct QueuePosition {
    pub current: Option<EnrichmentResult>,
    pub total: usize,
    pub reviewed: usize,
    pub remaining: usize,
}

impl ReviewState {
    /// Builds the state from stored results. Failed enrichments (`Error`,
    /// `QuotaExceeded`) are left out of the review queue.
    pub fn new(results: Vec<EnrichmentResult>, store: GuardedReviewStore) -> Self {
        let items = results
            .into_iter()
            .filter(|r| !r.detected_label.is_failure())
            .collect();
        Self {
            items: Arc::new(items),
            store,
            cursors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn find(&self, identifier: &str) -> Option<&EnrichmentResult> {
        self.items.iter().find(|r| r.identifier == identifier)
    }

    fn pending(&self, reviewed: &HashSet<String>) -> Vec<&EnrichmentResult> {
        self.items
            .iter()
            .filter(|r| !reviewed.contains(&r.identifier))
            .collect()
    }

    /// Where `reviewer` currently stands in the pending queue.
    pub fn position(&self, reviewer: &str) -> Result<QueuePosition> {
        let reviewed = self.store.reviewed_identifiers()?;
        let pending = self.pending(&reviewed);
        let mut cursors = self.cursors.lock().unwrap();
        let cursor = cursors.entry(reviewer.to_string()).or_insert(0);
        if *cursor >= pending.len() {
            *cursor = 0;
        }
        Ok(QueuePosition {
            current: pending.get(*cursor).map(|r| (*r).clone()),
            total: self.items.len(),
            reviewed: self.items.len() - pending.len(),
            remaining: pending.len(),
        })
    }

    /// Moves `reviewer` past the current item without deciding on it.
    pub fn skip(&self, reviewer: &str) {
        let mut cursors = self.cursors.lock().unwrap();
        *cursors.entry(reviewer.to_string()).or_insert(0) += 1;
    }
}
