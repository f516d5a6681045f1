//! Overall-score derivation.
//!
//! The overall score of a record is the arithmetic mean of its subject score
//! cells. It is never written back into the [`Dataset`]; every computation works
//! on a [`ScoredView`] borrowed from the loaded table.

use csv::StringRecord;
use log::debug;

use crate::config::ScoreSchema;
use crate::data::Dataset;
use crate::error::{Error, Result};

/// Placeholder group for empty or missing categorical cells.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Clone, Copy)]
pub struct ScoredRecord<'a> {
    pub row: &'a StringRecord,
    pub overall_score: f64,
}

/// Records that carry at least one parseable score, in dataset order.
#[derive(Debug, Clone)]
pub struct ScoredView<'a> {
    dataset: &'a Dataset,
    score_fields: Vec<String>,
    records: Vec<ScoredRecord<'a>>,
    excluded: usize,
}

impl<'a> ScoredView<'a> {
    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn score_fields(&self) -> &[String] {
        &self.score_fields
    }

    pub fn records(&self) -> &[ScoredRecord<'a>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows left out because none of their score cells parsed.
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    pub fn average_score(&self) -> f64 {
        mean(self.records.iter().map(|r| r.overall_score))
    }

    /// Mean of a single subject column over the parseable cells of the view.
    pub fn field_average(&self, field: &str) -> f64 {
        mean(
            self.records
                .iter()
                .filter_map(|r| parse_score(self.dataset.value(r.row, field))),
        )
    }

    /// Numeric cell of an arbitrary column, if it parses.
    pub fn numeric(&self, record: &ScoredRecord<'a>, field: &str) -> Option<f64> {
        parse_score(self.dataset.value(record.row, field))
    }

    /// Categorical value used as a grouping key.
    pub fn category(&self, record: &ScoredRecord<'a>, field: &str) -> &'a str {
        match self.dataset.value(record.row, field) {
            Some(value) if !value.is_empty() => value,
            _ => UNKNOWN_CATEGORY,
        }
    }

    /// Same view restricted to the records accepted by `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&ScoredRecord<'a>) -> bool) -> ScoredView<'a> {
        let records: Vec<ScoredRecord<'a>> =
            self.records.iter().copied().filter(|r| keep(r)).collect();
        ScoredView {
            dataset: self.dataset,
            score_fields: self.score_fields.clone(),
            excluded: self.excluded,
            records,
        }
    }
}

pub fn resolve_score_fields(dataset: &Dataset, schema: &ScoreSchema) -> Result<Vec<String>> {
    let fields: Vec<String> = match schema {
        ScoreSchema::Explicit(wanted) => wanted
            .iter()
            .filter(|f| dataset.has_column(f))
            .cloned()
            .collect(),
        ScoreSchema::Discover => dataset
            .columns()
            .iter()
            .filter(|c| c.contains("score"))
            .cloned()
            .collect(),
    };

    if fields.is_empty() {
        return Err(Error::NoScoreData);
    }
    Ok(fields)
}

pub fn derive_overall_score<'a>(dataset: &'a Dataset, schema: &ScoreSchema) -> Result<ScoredView<'a>> {
    let score_fields = resolve_score_fields(dataset, schema)?;

    let mut records = Vec::with_capacity(dataset.len());
    let mut excluded = 0;
    for row in dataset.rows() {
        let values: Vec<f64> = score_fields
            .iter()
            .filter_map(|f| parse_score(dataset.value(row, f)))
            .collect();
        if values.is_empty() {
            excluded += 1;
            continue;
        }
        let overall_score = values.iter().sum::<f64>() / values.len() as f64;
        records.push(ScoredRecord { row, overall_score });
    }

    if excluded > 0 {
        debug!("{} rows carry no parseable score in {:?}", excluded, score_fields);
    }

    Ok(ScoredView {
        dataset,
        score_fields,
        records,
        excluded,
    })
}

pub fn parse_score(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|c| c.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Mean with the empty case defined as 0.
pub fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
