//! Shared CSV plumbing.
//!
//! Every table this crate touches is a delimited file that may have been
//! produced by a spreadsheet export, so headers are trimmed and a leading
//! UTF-8 BOM is ignored. Writes always go through a temp file in the target
//! directory which is then renamed over the destination.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::warn;

/// Trims whitespace and a leading byte-order mark from a header cell.
pub fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_string()
}

/// Returns the normalized header row of a CSV reader.
pub fn normalized_headers<R: std::io::Read>(reader: &mut csv::Reader<R>) -> Result<Vec<String>> {
    let headers = reader.headers().context("Failed to read CSV header row")?;
    Ok(headers.iter().map(normalize_header).collect())
}

/// Position of `name` in `headers`, compared after normalization.
pub fn column_index(headers: &[String], name: &str) -> Option<usize> {
    let wanted = normalize_header(name);
    headers.iter().position(|h| *h == wanted)
}

/// Builds a reader that tolerates rows with a different field count.
pub fn flexible_reader<R: std::io::Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(source)
}

/// Reads a cell, treating a missing column or missing field as absent.
pub fn cell<'r>(record: &'r csv::StringRecord, index: Option<usize>) -> Option<&'r str> {
    index.and_then(|i| record.get(i))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = parent_dir(path);
    NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))
}

fn persist(temp: NamedTempFile, path: &Path) -> Result<()> {
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move temp file over {:?}", path))?;
    Ok(())
}

/// Replaces `path` with a fresh table made of `header` and `rows`.
pub fn write_table(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let mut temp = temp_file_beside(path)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }
    persist(temp, path)
}

fn existing_header(bytes: &[u8]) -> Option<Vec<String>> {
    let mut reader = flexible_reader(bytes);
    let headers = normalized_headers(&mut reader).ok()?;
    if headers.iter().all(|h| h.is_empty()) {
        return None;
    }
    Some(headers)
}

/// Length of the prefix of `bytes` made of whole records. Only differs from
/// `bytes.len()` when the data ends inside an open quoted field, in which
/// case the prefix stops after the last record terminator outside quotes.
fn complete_len(bytes: &[u8]) -> usize {
    let mut in_quotes = false;
    let mut boundary = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => boundary = i + 1,
            _ => {}
        }
    }
    if in_quotes {
        boundary
    } else {
        bytes.len()
    }
}

/// Appends `rows` (aligned to `header`) to the table at `path`.
///
/// The file is created with `header` when absent or empty. When it already
/// has a header, each row is written in that header's column order; columns
/// the existing file lacks are dropped and columns it has that `header`
/// lacks are left empty. A trailing record cut off inside a quoted field is
/// dropped so new rows never land inside it.
pub fn append_table(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<usize> {
    let existing = if path.exists() {
        let mut bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
        let keep = complete_len(&bytes);
        if keep < bytes.len() {
            warn!(
                "Dropping {} bytes of an unterminated record at the end of {:?}",
                bytes.len() - keep,
                path
            );
            bytes.truncate(keep);
        }
        Some(bytes)
    } else {
        None
    };

    let mut temp = temp_file_beside(path)?;

    let target_header = match existing.as_deref().and_then(existing_header) {
        Some(file_header) => {
            let bytes = existing.as_deref().unwrap_or_default();
            temp.write_all(bytes)?;
            if !bytes.ends_with(b"\n") {
                temp.write_all(b"\n")?;
            }
            if file_header.iter().map(String::as_str).ne(header.iter().copied()) {
                warn!(
                    "Column layout of {:?} differs from the expected one ({} vs {} columns); writing in the file's order",
                    path,
                    file_header.len(),
                    header.len()
                );
            }
            Some(file_header)
        }
        None => None,
    };

    let mapping: Vec<Option<usize>> = match &target_header {
        Some(file_header) => file_header
            .iter()
            .map(|name| header.iter().position(|h| *h == name.as_str()))
            .collect(),
        None => (0..header.len()).map(Some).collect(),
    };

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(temp.as_file_mut());
        if target_header.is_none() {
            writer.write_record(header)?;
        }
        for row in rows {
            let aligned = mapping
                .iter()
                .map(|slot| slot.and_then(|i| row.get(i)).map(String::as_str).unwrap_or(""));
            writer.write_record(aligned)?;
        }
        writer.flush()?;
    }

    persist(temp, path)?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn normalize_header_strips_bom_and_spaces() {
        assert_eq!(normalize_header("\u{feff} Variant SKU "), "Variant SKU");
        assert_eq!(normalize_header("Type"), "Type");
    }

    #[test]
    fn append_creates_file_with_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        append_table(&path, &["a", "b"], &[row(&["1", "2"])]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,b\n1,2\n");
    }

    #[test]
    fn append_keeps_existing_rows_and_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        append_table(&path, &["a", "b"], &[row(&["1", "2"])]).unwrap();
        append_table(&path, &["a", "b"], &[row(&["3", "4"])]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,b\n1,2\n3,4\n");
    }

    #[test]
    fn append_follows_existing_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "b,a,extra\nx,y,z").unwrap();

        append_table(&path, &["a", "b", "c"], &[row(&["1", "2", "3"])]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "b,a,extra\nx,y,z\n2,1,\n");
    }

    #[test]
    fn append_to_empty_file_writes_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "").unwrap();

        append_table(&path, &["a"], &[row(&["1"])]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n1\n");
    }

    #[test]
    fn append_drops_record_cut_inside_quotes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "a,b\n1,\"x\"\"y\"\n2,\"https://cdn/x").unwrap();

        append_table(&path, &["a", "b"], &[row(&["3", "4"])]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,\"x\"\"y\"\n3,4\n");
    }

    #[test]
    fn complete_len_ignores_quoted_newlines() {
        assert_eq!(complete_len(b"a\n\"x\ny\"\n"), 8);
        assert_eq!(complete_len(b"a\nb"), 3);
        assert_eq!(complete_len(b"a\n\"x\ny"), 2);
        assert_eq!(complete_len(b"\"open"), 0);
    }

    #[test]
    fn write_table_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.csv");
        fs::write(&path, "old\nstuff\n").unwrap();

        write_table(&path, &["x"], &[row(&["has,comma"])]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n\"has,comma\"\n");
    }
}
