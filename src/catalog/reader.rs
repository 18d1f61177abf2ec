//! Chunked catalog scanning.
//!
//! The catalog export can be far larger than memory is comfortable with, so
//! records are pulled in fixed-size chunks and only qualifying rows (reduced
//! to the handful of fields the pipeline needs) are kept. Output order is
//! the file order; chunk size only bounds how many raw records are held at
//! once.

use super::columns::ColumnLayout;
use super::filter::{is_blank_label, CategoryFilter};
use crate::csv_io::{cell, column_index, flexible_reader, normalized_headers};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// How often (in chunks) progress is logged.
const PROGRESS_EVERY_CHUNKS: usize = 10;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub columns: ColumnLayout,
    pub filter: CategoryFilter,
    pub chunk_size: usize,
}

/// A catalog row that qualified for enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub identifier: String,
    pub secondary_identifier: String,
    pub category: String,
    /// `None` when the label cell is blank.
    pub existing_label: Option<String>,
    /// Raw embedded image metadata, if the cell had any text.
    pub image_references: Option<String>,
}

#[derive(Debug, Default)]
pub struct CatalogScan {
    pub rows: Vec<CatalogRow>,
    pub total_rows: usize,
    pub category_matches: usize,
    pub skipped_records: usize,
    pub chunks: usize,
}

struct ResolvedColumns {
    category: Option<usize>,
    label: Option<usize>,
    identifier: Option<usize>,
    secondary_identifier: Option<usize>,
    image_references: Option<usize>,
}

impl ResolvedColumns {
    fn resolve(headers: &[String], layout: &ColumnLayout) -> Self {
        let find = |name: &str| {
            let index = column_index(headers, name);
            if index.is_none() && !headers.is_empty() {
                warn!("Catalog has no '{}' column; treating it as empty", name);
            }
            index
        };
        Self {
            category: find(&layout.category),
            label: find(&layout.label),
            identifier: find(&layout.identifier),
            secondary_identifier: find(&layout.secondary_identifier),
            image_references: find(&layout.image_references),
        }
    }
}

fn owned_trimmed(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn qualify(
    record: &csv::StringRecord,
    columns: &ResolvedColumns,
    filter: &CategoryFilter,
    scan: &mut CatalogScan,
) -> Option<CatalogRow> {
    let category = cell(record, columns.category);
    if !filter.matches(category) {
        return None;
    }
    scan.category_matches += 1;

    let label = cell(record, columns.label);
    if !is_blank_label(label) {
        return None;
    }

    let image_references = cell(record, columns.image_references)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    Some(CatalogRow {
        identifier: owned_trimmed(cell(record, columns.identifier)),
        secondary_identifier: owned_trimmed(cell(record, columns.secondary_identifier)),
        category: owned_trimmed(category),
        existing_label: None,
        image_references,
    })
}

/// Pulls up to `chunk_size` records. Undecodable records are counted and
/// skipped; I/O errors abort the scan.
fn read_chunk<R: Read>(
    reader: &mut csv::Reader<R>,
    chunk_size: usize,
    skipped: &mut usize,
) -> Result<Vec<csv::StringRecord>> {
    let mut chunk = Vec::with_capacity(chunk_size);
    while chunk.len() < chunk_size {
        let mut record = csv::StringRecord::new();
        match reader.read_record(&mut record) {
            Ok(true) => chunk.push(record),
            Ok(false) => break,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Utf8 { .. }) => {
                debug!("Skipping undecodable catalog record: {}", e);
                *skipped += 1;
            }
            Err(e) => return Err(e).context("Failed to read catalog record"),
        }
    }
    Ok(chunk)
}

/// Streams `source` and returns the rows whose category matches and whose
/// label is blank, in file order.
pub fn scan_catalog<R: Read>(source: R, options: &ScanOptions) -> Result<CatalogScan> {
    let chunk_size = options.chunk_size.max(1);
    let mut reader = flexible_reader(source);
    let mut scan = CatalogScan::default();

    let headers = normalized_headers(&mut reader)?;
    if headers.iter().all(|h| h.is_empty()) {
        info!("Catalog is empty, nothing to scan");
        return Ok(scan);
    }
    let columns = ResolvedColumns::resolve(&headers, &options.columns);

    loop {
        let chunk = read_chunk(&mut reader, chunk_size, &mut scan.skipped_records)?;
        if chunk.is_empty() {
            break;
        }
        scan.chunks += 1;
        scan.total_rows += chunk.len();

        let before = scan.rows.len();
        for record in &chunk {
            if let Some(row) = qualify(record, &columns, &options.filter, &mut scan) {
                scan.rows.push(row);
            }
        }
        if scan.rows.len() == before {
            debug!("Chunk {} had no qualifying rows", scan.chunks);
        }

        if scan.chunks % PROGRESS_EVERY_CHUNKS == 0 {
            info!(
                "Processed {} rows... {} category matches so far",
                scan.total_rows, scan.category_matches
            );
        }
    }

    info!(
        "Catalog scan complete: {} rows, {} matching '{}', {} with blank label",
        scan.total_rows,
        scan.category_matches,
        options.filter.needle(),
        scan.rows.len()
    );
    Ok(scan)
}

pub fn scan_catalog_file(path: &Path, options: &ScanOptions) -> Result<CatalogScan> {
    let file = File::open(path).with_context(|| format!("Failed to open catalog {:?}", path))?;
    scan_catalog(file, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(chunk_size: usize) -> ScanOptions {
        ScanOptions {
            columns: ColumnLayout::default(),
            filter: CategoryFilter::new("rug"),
            chunk_size,
        }
    }

    fn fixture_25_rows() -> String {
        let mut csv = String::from(" Variant SKU ,Product SKU,Type,Patterns,Images\n");
        for i in 0..25 {
            let kind = match i % 3 {
                0 => "Rugs",
                1 => "Chair",
                _ => "Rug Accessories",
            };
            let pattern = match i % 4 {
                0 => "",
                1 => "nan",
                2 => "Floral",
                _ => "  ",
            };
            csv.push_str(&format!(
                "V{i},P{i},{kind},{pattern},\"[{{\"\"role\"\":\"\"design\"\",\"\"url\"\":\"\"u{i}\"\"}}]\"\n"
            ));
        }
        csv
    }

    #[test]
    fn chunk_size_does_not_change_output() {
        let data = fixture_25_rows();
        let small = scan_catalog(data.as_bytes(), &options(1)).unwrap();
        let large = scan_catalog(data.as_bytes(), &options(10_000)).unwrap();
        let odd = scan_catalog(data.as_bytes(), &options(7)).unwrap();

        assert_eq!(small.rows, large.rows);
        assert_eq!(odd.rows, large.rows);
        assert_eq!(small.total_rows, 25);
        assert_eq!(small.chunks, 25);
        assert_eq!(large.chunks, 1);
        assert_eq!(odd.chunks, 4);
        assert!(!large.rows.is_empty());
    }

    #[test]
    fn filters_category_and_blank_label() {
        let data = "Variant SKU,Product SKU,Type,Patterns,Images\n\
                    A,PA,Rug,,\n\
                    B,PB,Rug,Floral,\n\
                    C,PC,Chair,,\n\
                    D,PD,Outdoor Rugs,nan,\n";
        let scan = scan_catalog(data.as_bytes(), &options(2)).unwrap();

        let ids: Vec<_> = scan.rows.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A", "D"]);
        assert_eq!(scan.category_matches, 3);
        assert_eq!(scan.rows[0].image_references, None);
        assert_eq!(scan.rows[0].existing_label, None);
    }

    #[test]
    fn empty_source_yields_empty_scan() {
        let scan = scan_catalog("".as_bytes(), &options(10)).unwrap();
        assert!(scan.rows.is_empty());
        assert_eq!(scan.total_rows, 0);

        let header_only = scan_catalog("Type,Patterns\n".as_bytes(), &options(10)).unwrap();
        assert!(header_only.rows.is_empty());
    }

    #[test]
    fn missing_label_column_treats_labels_as_blank() {
        let data = "Variant SKU,Type\nA,Rug\nB,Lamp\n";
        let scan = scan_catalog(data.as_bytes(), &options(10)).unwrap();
        assert_eq!(scan.rows.len(), 1);
        assert_eq!(scan.rows[0].identifier, "A");
        assert_eq!(scan.rows[0].secondary_identifier, "");
    }

    #[test]
    fn missing_category_column_matches_nothing() {
        let data = "Variant SKU,Patterns\nA,\n";
        let scan = scan_catalog(data.as_bytes(), &options(10)).unwrap();
        assert!(scan.rows.is_empty());
    }

    #[test]
    fn short_rows_are_tolerated() {
        let data = "Variant SKU,Product SKU,Type,Patterns,Images\nA,PA,Rug\n";
        let scan = scan_catalog(data.as_bytes(), &options(10)).unwrap();
        assert_eq!(scan.rows.len(), 1);
        assert_eq!(scan.rows[0].image_references, None);
    }
}
