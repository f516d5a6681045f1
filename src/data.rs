use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use log::{debug, warn};

use crate::error::{Error, Result};

/// In-memory copy of the cleaned table. Never mutated after load.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<StringRecord>,
    skipped_rows: usize,
}

impl Dataset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<StringRecord>) -> Self {
        Self {
            columns,
            rows,
            skipped_rows: 0,
        }
    }

    /// Builds a dataset from literal rows; handy for fixtures.
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter().map(|r| StringRecord::from(r.to_vec())).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    /// Rows dropped during load because the CSV reader could not decode them.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Raw cell, trimmed. `None` for short rows or unknown columns.
    pub fn value<'a>(&'a self, row: &'a StringRecord, column: &str) -> Option<&'a str> {
        self.column_index(column)
            .and_then(|idx| row.get(idx))
            .map(str::trim)
    }
}

/// Reads the cleaned table, falling back to an empty dataset on any failure.
pub fn load(path: impl AsRef<Path>) -> Dataset {
    let path = path.as_ref();
    match try_load(path) {
        Ok(dataset) => {
            debug!("loaded {} rows from {}", dataset.len(), path.display());
            dataset
        }
        Err(e) => {
            warn!("{} ({}), serving empty dataset", e, path.display());
            Dataset::empty()
        }
    }
}

pub fn try_load(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::DataUnavailable(format!(
            "cleaned data file not found at {}",
            path.display()
        )));
    }

    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    let mut skipped_rows = 0;
    for result in rdr.records() {
        match result {
            Ok(record) => rows.push(record),
            Err(e) => {
                skipped_rows += 1;
                debug!("skipping unreadable row: {}", e);
            }
        }
    }
    if skipped_rows > 0 {
        warn!("skipped {} unreadable rows in {}", skipped_rows, path.display());
    }

    Ok(Dataset {
        columns,
        rows,
        skipped_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_empty_dataset() {
        let dataset = load("/definitely/not/here.csv");
        assert!(dataset.is_empty());
        assert!(dataset.columns().is_empty());
    }

    #[test]
    fn try_load_reports_data_unavailable() {
        let err = try_load("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
    }

    #[test]
    fn loads_header_and_rows_in_order() {
        let file = write_csv("gender, math_score\nfemale,72\nmale,69\n");
        let dataset = load(file.path());
        assert_eq!(dataset.columns(), ["gender", "math_score"]);
        assert_eq!(dataset.len(), 2);
        let first = &dataset.rows()[0];
        assert_eq!(dataset.value(first, "gender"), Some("female"));
        assert_eq!(dataset.value(first, "math_score"), Some("72"));
    }

    #[test]
    fn short_rows_read_as_missing_cells() {
        let file = write_csv("gender,math_score\nfemale\n");
        let dataset = load(file.path());
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.value(&dataset.rows()[0], "math_score"), None);
    }

    #[test]
    fn invalid_utf8_row_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"gender,math_score\nfemale,72\n\xff\xfe,10\nmale,50\n")
            .unwrap();
        let dataset = load(file.path());
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.skipped_rows(), 1);
    }
}
