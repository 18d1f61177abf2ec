use super::models::{Decision, ReviewCounts, ReviewDecision};
use super::schema::REVIEW_VERSIONED_SCHEMAS;
use super::ReviewStore;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub struct SqliteReviewStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReviewStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), REVIEW_VERSIONED_SCHEMAS, "review")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Maps a stored row, or `None` (with a warning) when its decision or
    /// timestamp cannot be read back.
    fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Option<ReviewDecision>> {
        let identifier: String = row.get("identifier")?;
        let decision_str: String = row.get("decision")?;
        let decided_at_str: String = row.get("decided_at")?;
        let Some(decision) = Decision::parse(&decision_str) else {
            warn!("Skipping review of {} with unknown decision '{}'", identifier, decision_str);
            return Ok(None);
        };
        let decided_at = match DateTime::parse_from_rfc3339(&decided_at_str) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                warn!(
                    "Skipping review of {} with bad timestamp '{}': {}",
                    identifier, decided_at_str, e
                );
                return Ok(None);
            }
        };
        Ok(Some(ReviewDecision {
            identifier,
            secondary_identifier: row.get("secondary_identifier")?,
            detected_label: row.get("detected_label")?,
            image_url: row.get("image_url")?,
            decision,
            reviewer: row.get("reviewer")?,
            decided_at,
        }))
    }
}

impl ReviewStore for SqliteReviewStore {
    fn record_decision(&self, decision: &ReviewDecision) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO review_decisions
                    (identifier, secondary_identifier, detected_label, image_url, decision, reviewer, decided_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    decision.identifier,
                    decision.secondary_identifier,
                    decision.detected_label,
                    decision.image_url,
                    decision.decision.as_str(),
                    decision.reviewer,
                    decision.decided_at.to_rfc3339(),
                ],
            )
            .context("Failed to record review decision")?;
        if inserted == 0 {
            debug!("{} already reviewed, ignoring decision", decision.identifier);
        }
        Ok(inserted == 1)
    }

    fn list_decisions(&self, reviewer: &str) -> Result<Vec<ReviewDecision>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM review_decisions WHERE reviewer = ?1 ORDER BY decided_at, rowid",
        )?;
        let decisions = stmt
            .query_map(params![reviewer], Self::row_to_decision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decisions.into_iter().flatten().collect())
    }

    fn is_reviewed(&self, identifier: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM review_decisions WHERE identifier = ?1",
            params![identifier],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn reviewed_identifiers(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT identifier FROM review_decisions")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    fn counts(&self) -> Result<ReviewCounts> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT decision, COUNT(*) FROM review_decisions GROUP BY decision")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = ReviewCounts::default();
        for row in rows {
            let (decision, n) = row?;
            match Decision::parse(&decision) {
                Some(Decision::Approved) => counts.approved += n as usize,
                Some(Decision::Rejected) => counts.rejected += n as usize,
                None => {}
            }
        }
        Ok(counts)
    }
}
