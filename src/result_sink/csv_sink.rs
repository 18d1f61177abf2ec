use super::lock::RunLock;
use super::models::{parse_timestamp, EnrichmentResult};
use super::ResultSink;
use crate::catalog::ColumnLayout;
use crate::csv_io::{append_table, cell, column_index, flexible_reader, normalized_headers};
use crate::enrichment::DetectedLabel;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result sink backed by a single CSV file.
pub struct CsvResultSink {
    path: PathBuf,
    columns: ColumnLayout,
}

impl CsvResultSink {
    pub fn new<P: AsRef<Path>>(path: P, columns: ColumnLayout) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            columns,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the single-writer lock for this file.
    pub fn lock(&self) -> Result<RunLock> {
        RunLock::acquire(&self.path)
    }

    /// Moves an existing file that cannot be read as a result table out of
    /// the way, so the next append starts a fresh one.
    fn set_aside_if_unreadable(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let Err(e) = self.load() else {
            return Ok(());
        };
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(
            ".unreadable-{}",
            chrono::Local::now().format("%Y%m%d%H%M%S")
        ));
        let aside = self.path.with_file_name(name);
        fs::rename(&self.path, &aside)
            .with_context(|| format!("Failed to move {:?} to {:?}", self.path, aside))?;
        warn!(
            "Result file {:?} is unreadable ({:#}); moved it to {:?} and starting a new one",
            self.path, e, aside
        );
        Ok(())
    }

    /// Number of stored rows whose processed-at date is `date`.
    pub fn count_processed_on(&self, date: NaiveDate) -> Result<usize> {
        Ok(self
            .load()?
            .iter()
            .filter(|r| r.processed_at.map(|ts| ts.date()) == Some(date))
            .count())
    }
}

impl ResultSink for CsvResultSink {
    fn append(&self, results: &[EnrichmentResult]) -> Result<usize> {
        if results.is_empty() {
            return Ok(0);
        }
        self.set_aside_if_unreadable()?;
        let rows: Vec<Vec<String>> = results.iter().map(EnrichmentResult::to_record).collect();
        let written = append_table(&self.path, &self.columns.result_header(), &rows)
            .with_context(|| format!("Failed to append results to {:?}", self.path))?;
        info!("Appended {} results to {:?}", written, self.path);
        Ok(written)
    }

    fn load(&self) -> Result<Vec<EnrichmentResult>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file =
            File::open(&self.path).with_context(|| format!("Failed to open {:?}", self.path))?;
        let mut reader = flexible_reader(file);
        let headers = normalized_headers(&mut reader)?;
        if headers.iter().all(|h| h.is_empty()) {
            return Ok(Vec::new());
        }

        let Some(identifier) = column_index(&headers, &self.columns.identifier) else {
            bail!(
                "Result file {:?} has no '{}' column",
                self.path,
                self.columns.identifier
            );
        };
        let secondary = column_index(&headers, &self.columns.secondary_identifier);
        let original = column_index(&headers, &self.columns.original_label);
        let detected = column_index(&headers, &self.columns.detected_label);
        let image_url = column_index(&headers, &self.columns.image_url);
        let processed_at = column_index(&headers, &self.columns.processed_at);

        let mut results = Vec::new();
        let mut skipped = 0usize;
        for (index, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    debug!("Skipping unreadable result row {}: {}", index + 1, e);
                    skipped += 1;
                    continue;
                }
            };
            if record.len() != headers.len() {
                debug!(
                    "Skipping result row {} with {} fields (expected {})",
                    index + 1,
                    record.len(),
                    headers.len()
                );
                skipped += 1;
                continue;
            }
            let id = cell(&record, Some(identifier)).unwrap_or("").trim();
            if id.is_empty() {
                skipped += 1;
                continue;
            }
            let text = |column: Option<usize>| cell(&record, column).unwrap_or("").trim().to_string();

            results.push(EnrichmentResult {
                identifier: id.to_string(),
                secondary_identifier: text(secondary),
                existing_label: text(original),
                detected_label: DetectedLabel::parse(&text(detected)),
                image_url: text(image_url),
                processed_at: parse_timestamp(&text(processed_at)),
            });
        }

        if skipped > 0 {
            warn!("Skipped {} malformed rows in {:?}", skipped, self.path);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::PatternLabel;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    fn result(id: &str, label: DetectedLabel, at: &str) -> EnrichmentResult {
        EnrichmentResult {
            identifier: id.to_string(),
            secondary_identifier: format!("P-{}", id),
            existing_label: String::new(),
            detected_label: label,
            image_url: format!("https://cdn/{}.jpg", id),
            processed_at: NaiveDateTime::parse_from_str(at, "%Y-%m-%d %H:%M:%S").ok(),
        }
    }

    #[test]
    fn test_append_then_load() {
        let dir = TempDir::new().unwrap();
        let sink = CsvResultSink::new(dir.path().join("results.csv"), ColumnLayout::default());

        let first = vec![result(
            "A",
            DetectedLabel::Pattern(PatternLabel::Floral),
            "2024-01-01 10:00:00",
        )];
        let second = vec![result("B", DetectedLabel::Error, "2024-01-02 10:00:00")];
        assert_eq!(sink.append(&first).unwrap(), 1);
        assert_eq!(sink.append(&second).unwrap(), 1);

        let loaded = sink.load().unwrap();
        assert_eq!(loaded, vec![first[0].clone(), second[0].clone()]);

        let content = fs::read_to_string(sink.path()).unwrap();
        assert!(content.starts_with(
            "Variant SKU,Product SKU,Original Patterns,AI Detected Pattern,Design Image URL,Processed Date\n"
        ));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let sink = CsvResultSink::new(dir.path().join("none.csv"), ColumnLayout::default());
        assert!(sink.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_skips_partial_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(
            &path,
            "Variant SKU,Product SKU,Original Patterns,AI Detected Pattern,Design Image URL,Processed Date\n\
             A,PA,,Floral,u1,2024-01-01 10:00:00\n\
             B,PB,,Geo\n\
             ,PC,,Solid,u3,\n\
             D,PD,,Solid,u4,\n",
        )
        .unwrap();
        let sink = CsvResultSink::new(&path, ColumnLayout::default());

        let ids: Vec<_> = sink
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(ids, vec!["A", "D"]);
    }

    #[test]
    fn test_load_without_identifier_column_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "foo,bar\n1,2\n").unwrap();
        let sink = CsvResultSink::new(&path, ColumnLayout::default());
        assert!(sink.load().is_err());
    }

    #[test]
    fn test_append_sets_aside_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "this,is\nnot,ok\n").unwrap();
        let sink = CsvResultSink::new(&path, ColumnLayout::default());

        let rows = vec![result("A", DetectedLabel::Unknown, "2024-01-01 10:00:00")];
        sink.append(&rows).unwrap();

        assert_eq!(sink.load().unwrap(), rows);
        let aside: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("results.csv.unreadable-"))
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join(&aside[0])).unwrap(),
            "this,is\nnot,ok\n"
        );
    }

    #[test]
    fn test_append_after_cut_quoted_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(
            &path,
            "Variant SKU,Product SKU,Original Patterns,AI Detected Pattern,Design Image URL,Processed Date\n\
             X0,P,,Solid,https://cdn/x0,\n\
             X1,P,,Floral,\"https://cdn/x",
        )
        .unwrap();
        let sink = CsvResultSink::new(&path, ColumnLayout::default());

        sink.append(&[result("R1", DetectedLabel::Unknown, "2024-01-01 10:00:00")])
            .unwrap();

        let ids: Vec<_> = sink
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(ids, vec!["X0", "R1"]);
    }

    #[test]
    fn test_count_processed_on() {
        let dir = TempDir::new().unwrap();
        let sink = CsvResultSink::new(dir.path().join("results.csv"), ColumnLayout::default());
        sink.append(&[
            result("A", DetectedLabel::Unknown, "2024-01-01 10:00:00"),
            result("B", DetectedLabel::QuotaExceeded, "2024-01-01 23:59:59"),
            result("C", DetectedLabel::Unknown, "2024-01-02 00:00:00"),
        ])
        .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(sink.count_processed_on(day).unwrap(), 2);
    }
}
