//! Review decisions kept in two flat files, one per verdict.

use super::models::{Decision, ReviewCounts, ReviewDecision};
use super::ReviewStore;
use crate::csv_io::{append_table, cell, column_index, flexible_reader, normalized_headers};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

const HEADER: [&str; 7] = [
    "Variant SKU",
    "Product SKU",
    "AI Detected Pattern",
    "Design Image URL",
    "Status",
    "Reviewed By",
    "Timestamp",
];

fn parse_decided_at(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()))
        .ok()
}

/// One row of a decision file: its identifier, and the decision when the
/// row could be read in full.
type DecisionRow = (String, Option<ReviewDecision>);

/// Reads a decision file. A file without a status column takes its verdict
/// from `default_decision`.
fn read_decisions(path: &Path, default_decision: Decision) -> Result<Vec<DecisionRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut reader = flexible_reader(file);
    let headers = normalized_headers(&mut reader)?;
    let [id, secondary, label, url, status, reviewer, timestamp] =
        HEADER.map(|name| column_index(&headers, name));
    if id.is_none() {
        warn!("{:?} has no '{}' column, ignoring it", path, HEADER[0]);
        return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable review row in {:?}: {}", path, e);
                continue;
            }
        };
        let identifier = cell(&record, id).unwrap_or("").trim().to_string();
        if identifier.is_empty() {
            continue;
        }
        let text = |index| cell(&record, index).unwrap_or("").trim().to_string();

        let decision = match status {
            Some(_) => Decision::parse(&text(status)),
            None => Some(default_decision),
        };
        let Some(decision) = decision else {
            warn!(
                "Skipping review of {} in {:?} with unknown status '{}'",
                identifier,
                path,
                text(status)
            );
            rows.push((identifier, None));
            continue;
        };
        let Some(decided_at) = parse_decided_at(&text(timestamp)) else {
            warn!(
                "Skipping review of {} in {:?} with bad timestamp '{}'",
                identifier,
                path,
                text(timestamp)
            );
            rows.push((identifier, None));
            continue;
        };

        let parsed = ReviewDecision {
            identifier: identifier.clone(),
            secondary_identifier: text(secondary),
            detected_label: text(label),
            image_url: text(url),
            decision,
            reviewer: text(reviewer),
            decided_at,
        };
        rows.push((identifier, Some(parsed)));
    }
    Ok(rows)
}

/// Appends approvals and rejections to separate CSV files, with the same
/// columns the spreadsheet-based review flow used.
pub struct CsvReviewStore {
    approved_path: PathBuf,
    rejected_path: PathBuf,
    reviewed: Mutex<HashSet<String>>,
}

impl CsvReviewStore {
    pub fn new<P: AsRef<Path>>(approved_path: P, rejected_path: P) -> Result<Self> {
        let store = Self {
            approved_path: approved_path.as_ref().to_path_buf(),
            rejected_path: rejected_path.as_ref().to_path_buf(),
            reviewed: Mutex::new(HashSet::new()),
        };
        let reviewed: HashSet<String> = store
            .all_rows()?
            .into_iter()
            .map(|(identifier, _)| identifier)
            .collect();
        info!("Loaded {} reviewed identifiers", reviewed.len());
        *store.reviewed.lock().unwrap() = reviewed;
        Ok(store)
    }

    fn path_for(&self, decision: Decision) -> &Path {
        match decision {
            Decision::Approved => &self.approved_path,
            Decision::Rejected => &self.rejected_path,
        }
    }

    fn all_rows(&self) -> Result<Vec<DecisionRow>> {
        let mut all = read_decisions(&self.approved_path, Decision::Approved)?;
        all.extend(read_decisions(&self.rejected_path, Decision::Rejected)?);
        Ok(all)
    }

    fn all_decisions(&self) -> Result<Vec<ReviewDecision>> {
        let mut all: Vec<ReviewDecision> = self
            .all_rows()?
            .into_iter()
            .filter_map(|(_, decision)| decision)
            .collect();
        all.sort_by_key(|d| d.decided_at);
        Ok(all)
    }
}

impl ReviewStore for CsvReviewStore {
    fn record_decision(&self, decision: &ReviewDecision) -> Result<bool> {
        let mut reviewed = self.reviewed.lock().unwrap();
        if reviewed.contains(&decision.identifier) {
            return Ok(false);
        }
        let row = vec![
            decision.identifier.clone(),
            decision.secondary_identifier.clone(),
            decision.detected_label.clone(),
            decision.image_url.clone(),
            decision.decision.as_str().to_string(),
            decision.reviewer.clone(),
            decision.decided_at.to_rfc3339(),
        ];
        let path = self.path_for(decision.decision);
        append_table(path, &HEADER, &[row])
            .with_context(|| format!("Failed to record review decision in {:?}", path))?;
        reviewed.insert(decision.identifier.clone());
        Ok(true)
    }

    fn list_decisions(&self, reviewer: &str) -> Result<Vec<ReviewDecision>> {
        Ok(self
            .all_decisions()?
            .into_iter()
            .filter(|d| d.reviewer == reviewer)
            .collect())
    }

    fn is_reviewed(&self, identifier: &str) -> Result<bool> {
        Ok(self.reviewed.lock().unwrap().contains(identifier))
    }

    fn reviewed_identifiers(&self) -> Result<HashSet<String>> {
        Ok(self.reviewed.lock().unwrap().clone())
    }

    fn counts(&self) -> Result<ReviewCounts> {
        let mut counts = ReviewCounts::default();
        for decision in self.all_decisions()? {
            counts.add(decision.decision);
        }
        Ok(counts)
    }
}
