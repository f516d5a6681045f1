//! Raw-to-cleaned CSV pass run by `refresh-data`.
//!
//! Header names are normalized to lowercase snake case, fully empty and exactly
//! duplicated rows are dropped, numeric gaps take the column mean and text gaps
//! take [`UNKNOWN_CATEGORY`]. Rows the reader cannot decode are skipped and
//! counted. The cleaned table is written to a temporary file in the target
//! directory and persisted over the old one, so readers never see a half-written
//! table.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::scores::{mean, UNKNOWN_CATEGORY};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_read: usize,
    pub rows_written: usize,
    pub duplicates_dropped: usize,
    pub empty_dropped: usize,
    pub unreadable_dropped: usize,
}

pub fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

pub fn clean_dataset(raw_path: &Path, cleaned_path: &Path) -> Result<CleanReport> {
    if !raw_path.exists() {
        return Err(Error::UpstreamUnavailable(format!(
            "raw dataset not found at {}",
            raw_path.display()
        )));
    }

    let mut rdr = ReaderBuilder::new().flexible(true).from_path(raw_path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(normalize_header).collect();
    let width = headers.len();

    let mut report = CleanReport::default();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        report.rows_read += 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                report.unreadable_dropped += 1;
                debug!("skipping unreadable raw row: {}", e);
                continue;
            }
        };

        let mut row: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        row.resize(width, String::new());

        if row.iter().all(String::is_empty) {
            report.empty_dropped += 1;
            continue;
        }
        if !seen.insert(row.clone()) {
            report.duplicates_dropped += 1;
            continue;
        }
        rows.push(row);
    }

    let fills: Vec<String> = (0..width).map(|c| column_fill(&rows, c)).collect();
    for row in &mut rows {
        for (cell, fill) in row.iter_mut().zip(&fills) {
            if cell.is_empty() {
                cell.clone_from(fill);
            }
        }
    }

    if report.unreadable_dropped > 0 {
        warn!(
            "skipped {} unreadable rows in {}",
            report.unreadable_dropped,
            raw_path.display()
        );
    }

    write_atomically(cleaned_path, &headers, &rows)?;

    report.rows_written = rows.len();
    info!(
        "cleaned {} -> {}: {} rows written, {} duplicates and {} empty rows dropped",
        raw_path.display(),
        cleaned_path.display(),
        report.rows_written,
        report.duplicates_dropped,
        report.empty_dropped
    );
    Ok(report)
}

/// The temporary file is removed on drop if any step before `persist` fails.
fn write_atomically(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut wtr = WriterBuilder::new().from_writer(tmp.as_file_mut());
        wtr.write_record(headers)?;
        for row in rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Mean of a numeric column, or the unknown placeholder for text columns.
fn column_fill(rows: &[Vec<String>], column: usize) -> String {
    let present: Vec<&str> = rows
        .iter()
        .map(|r| r[column].as_str())
        .filter(|c| !c.is_empty())
        .collect();
    let numbers: Vec<f64> = present.iter().filter_map(|c| c.parse::<f64>().ok()).collect();

    if !present.is_empty() && numbers.len() == present.len() {
        let fill = mean(numbers.into_iter());
        debug!("numeric column {} filled with mean {}", column, fill);
        fill.to_string()
    } else {
        UNKNOWN_CATEGORY.to_string()
    }
}
