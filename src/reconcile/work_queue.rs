//! The derived work-queue file: one row per qualifying catalog row.

use crate::catalog::{extract_role_url, CatalogRow, ColumnLayout};
use crate::csv_io::{cell, column_index, flexible_reader, normalized_headers, write_table};
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub identifier: String,
    pub secondary_identifier: String,
    /// Empty when the catalog had no label.
    pub existing_label: String,
    /// Absent when the row has no image for the configured role.
    pub image_url: Option<String>,
}

impl WorkItem {
    pub fn from_catalog_row(row: &CatalogRow, role: &str) -> Self {
        Self {
            identifier: row.identifier.clone(),
            secondary_identifier: row.secondary_identifier.clone(),
            existing_label: row.existing_label.clone().unwrap_or_default(),
            image_url: extract_role_url(row.image_references.as_deref(), role),
        }
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.identifier.clone(),
            self.secondary_identifier.clone(),
            self.existing_label.clone(),
            self.image_url.clone().unwrap_or_default(),
        ]
    }
}

/// Writes `items` as the work-queue file, replacing any previous one.
/// Items without an image URL are kept with an empty URL cell.
pub fn write_work_queue(path: &Path, columns: &ColumnLayout, items: &[WorkItem]) -> Result<()> {
    let rows: Vec<Vec<String>> = items.iter().map(WorkItem::to_record).collect();
    write_table(path, &columns.work_queue_header(), &rows)
        .with_context(|| format!("Failed to write work queue {:?}", path))?;
    let with_url = items.iter().filter(|i| i.image_url.is_some()).count();
    info!(
        "Wrote {} work items ({} with an image URL) to {:?}",
        items.len(),
        with_url,
        path
    );
    Ok(())
}

/// Reads a work-queue file back in file order.
pub fn read_work_queue(path: &Path, columns: &ColumnLayout) -> Result<Vec<WorkItem>> {
    let file = File::open(path).with_context(|| format!("Failed to open work queue {:?}", path))?;
    let mut reader = flexible_reader(file);
    let headers = normalized_headers(&mut reader)?;
    if headers.iter().all(|h| h.is_empty()) {
        return Ok(Vec::new());
    }

    let Some(identifier) = column_index(&headers, &columns.identifier) else {
        bail!("Work queue {:?} has no '{}' column", path, columns.identifier);
    };
    let secondary = column_index(&headers, &columns.secondary_identifier);
    let label = column_index(&headers, &columns.label);
    let image_url = column_index(&headers, &columns.image_url);

    let mut items = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read work queue {:?}", path))?;
        let id = cell(&record, Some(identifier)).unwrap_or("").trim();
        if id.is_empty() {
            debug!("Skipping work-queue row without identifier");
            continue;
        }
        let text = |column| cell(&record, column).unwrap_or("").trim().to_string();
        let url = text(image_url);
        items.push(WorkItem {
            identifier: id.to_string(),
            secondary_identifier: text(secondary),
            existing_label: text(label),
            image_url: if url.is_empty() { None } else { Some(url) },
        });
    }
    Ok(items)
}
