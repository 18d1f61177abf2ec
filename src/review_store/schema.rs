//! SQLite schema for the review database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Review decisions
// =============================================================================

/// One row per reviewed identifier.
const REVIEW_DECISIONS_TABLE_V1: Table = Table {
    name: "review_decisions",
    columns: &[
        sqlite_column!("identifier", &SqlType::Text, is_primary_key = true),
        sqlite_column!("secondary_identifier", &SqlType::Text, non_null = true),
        sqlite_column!("detected_label", &SqlType::Text, non_null = true),
        sqlite_column!("image_url", &SqlType::Text, non_null = true),
        sqlite_column!("decision", &SqlType::Text, non_null = true),
        sqlite_column!("reviewer", &SqlType::Text, non_null = true),
        sqlite_column!("decided_at", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_review_decisions_reviewer", "reviewer, decided_at"),
        ("idx_review_decisions_decision", "decision"),
    ],
};

pub const REVIEW_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[REVIEW_DECISIONS_TABLE_V1],
}];
