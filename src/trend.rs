//! Chronological trend windows.
//!
//! The scored records are cut, in their existing order, into a fixed number of
//! contiguous windows. All windows have `len / window_count` records except the
//! last, which absorbs the remainder, so every record lands in exactly one window
//! and the window count never depends on the data size.

use std::ops::Range;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metrics::round2;
use crate::scores::{mean, ScoredRecord, ScoredView};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendWindow {
    pub week: usize,
    pub avg_score: f64,
}

pub fn window_ranges(len: usize, window_count: usize) -> Vec<Range<usize>> {
    if window_count == 0 {
        return Vec::new();
    }
    let size = len / window_count;
    (0..window_count)
        .map(|w| {
            let start = w * size;
            let end = if w == window_count - 1 { len } else { (w + 1) * size };
            start..end
        })
        .collect()
}

pub fn trend_chunks(records: &[ScoredRecord<'_>], window_count: usize) -> Vec<TrendWindow> {
    window_ranges(records.len(), window_count)
        .into_iter()
        .enumerate()
        .map(|(w, range)| TrendWindow {
            week: w + 1,
            avg_score: round2(mean(records[range].iter().map(|r| r.overall_score))),
        })
        .collect()
}

/// Inclusive date bounds for the optional pre-filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Ok(Self {
            start: parse_bound("start_date", start)?,
            end: parse_bound("end_date", end)?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_date(v)
            .map(Some)
            .ok_or_else(|| Error::InvalidInput(format!("{} is not a date: {}", name, v))),
    }
}

/// Accepts plain dates, RFC 3339 timestamps and a couple of common layouts.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.date());
    }
    NaiveDate::parse_from_str(value, "%Y/%m/%d").ok()
}

/// Restricts the view to records dated within `range`.
///
/// Without the timestamp column, or without any bound, the view is returned as
/// is. Records whose timestamp does not parse are dropped once filtering applies.
pub fn filter_by_date<'a>(view: &ScoredView<'a>, field: &str, range: DateRange) -> ScoredView<'a> {
    if range.is_unbounded() {
        return view.clone();
    }
    if !view.dataset().has_column(field) {
        debug!("no '{}' column, date filter not applied", field);
        return view.clone();
    }

    let dataset = view.dataset();
    view.retain(|record| {
        dataset
            .value(record.row, field)
            .and_then(parse_date)
            .is_some_and(|date| range.contains(date))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoreSchema;
    use crate::data::Dataset;
    use crate::scores::derive_overall_score;

    fn sizes(len: usize, windows: usize) -> Vec<usize> {
        window_ranges(len, windows).iter().map(|r| r.len()).collect()
    }

    #[test]
    fn last_window_absorbs_remainder() {
        assert_eq!(sizes(10, 4), [2, 2, 2, 4]);
        assert_eq!(sizes(8, 4), [2, 2, 2, 2]);
        assert_eq!(sizes(3, 4), [0, 0, 0, 3]);
        assert_eq!(sizes(0, 4), [0, 0, 0, 0]);
        assert!(window_ranges(5, 0).is_empty());
    }

    #[test]
    fn windows_are_disjoint_ordered_and_cover_everything() {
        for len in 0..40 {
            for windows in 1..9 {
                let ranges = window_ranges(len, windows);
                assert_eq!(ranges.len(), windows);
                let mut next = 0;
                for range in &ranges {
                    assert_eq!(range.start, next);
                    assert!(range.end >= range.start);
                    next = range.end;
                }
                assert_eq!(next, len);
            }
        }
    }

    #[test]
    fn empty_dataset_reports_zero_windows() {
        let trend = trend_chunks(&[], 4);
        assert_eq!(trend.len(), 4);
        for (i, window) in trend.iter().enumerate() {
            assert_eq!(window.week, i + 1);
            assert_eq!(window.avg_score, 0.0);
        }
    }

    #[test]
    fn window_average_uses_overall_score() {
        let dataset = Dataset::from_rows(
            &["math_score", "reading_score"],
            &[&["50", "60"], &["70", "80"], &["10", "20"], &["33", "34"], &["90", "91"]],
        );
        let view = derive_overall_score(&dataset, &ScoreSchema::default()).unwrap();
        let trend = trend_chunks(view.records(), 2);
        assert_eq!(
            trend,
            vec![
                TrendWindow { week: 1, avg_score: 65.0 },
                TrendWindow { week: 2, avg_score: 46.33 },
            ]
        );
    }

    #[test]
    fn date_filter_is_inclusive() {
        let dataset = Dataset::from_rows(
            &["date", "math_score"],
            &[
                &["2024-01-01", "10"],
                &["2024-01-05", "20"],
                &["2024-01-10T08:00:00Z", "30"],
                &["not a date", "40"],
                &["2024-02-01", "50"],
            ],
        );
        let view = derive_overall_score(&dataset, &ScoreSchema::default()).unwrap();
        let range = DateRange::parse(Some("2024-01-05"), Some("2024-01-10")).unwrap();
        let filtered = filter_by_date(&view, "date", range);
        let scores: Vec<f64> = filtered.records().iter().map(|r| r.overall_score).collect();
        assert_eq!(scores, [20.0, 30.0]);
    }

    #[test]
    fn missing_timestamp_column_skips_filter() {
        let dataset = Dataset::from_rows(&["math_score"], &[&["10"], &["20"]]);
        let view = derive_overall_score(&dataset, &ScoreSchema::default()).unwrap();
        let range = DateRange::parse(Some("2024-01-01"), None).unwrap();
        assert_eq!(filter_by_date(&view, "date", range).len(), 2);
    }

    #[test]
    fn malformed_bound_is_invalid_input() {
        let err = DateRange::parse(Some("yesterday"), None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(DateRange::parse(Some(""), None).unwrap().is_unbounded());
    }
}
