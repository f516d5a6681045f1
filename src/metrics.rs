//! Metrics facade.
//!
//! Composes score derivation, segmentation, grouping and trend chunking into the
//! payloads served by the API. Every numeric output is well defined for every
//! dataset state: an empty table or a table without score columns reports zero
//! for every metric, never `null` or NaN.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::ScoreSchema;
use crate::data::Dataset;
use crate::error::Error;
use crate::grouping::{group_aggregate, GroupValue, Reducer};
use crate::scores::{derive_overall_score, ScoredView};
use crate::segments::{segmentation_rates, Segment};
use crate::trend::{filter_by_date, trend_chunks, DateRange, TrendWindow};

/// Number of windows in every reported score trend.
pub const STANDARD_TREND_WINDOWS: usize = 4;

pub const EDUCATION_FIELD: &str = "parental_level_of_education";
pub const GENDER_FIELD: &str = "gender";
pub const TEST_PREP_FIELD: &str = "test_preparation_course";

pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

/// Derives the scored view, recovering "no data" conditions as `None`.
pub fn scored_view<'a>(dataset: &'a Dataset, schema: &ScoreSchema) -> Option<ScoredView<'a>> {
    if dataset.is_empty() {
        info!("dataset is empty, reporting zero metrics");
        return None;
    }
    match derive_overall_score(dataset, schema) {
        Ok(view) => Some(view),
        Err(Error::NoScoreData) => {
            warn!("no score columns in dataset (columns: {:?})", dataset.columns());
            None
        }
        Err(e) => {
            warn!("score derivation failed: {}", e);
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub average_score: f64,
    pub completion_rate: f64,
    pub dropout_rate: f64,
    pub active_students: usize,
    pub total_students: usize,
    pub trend: Vec<TrendWindow>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            average_score: 0.0,
            completion_rate: 0.0,
            dropout_rate: 0.0,
            active_students: 0,
            total_students: 0,
            trend: trend_chunks(&[], STANDARD_TREND_WINDOWS),
        }
    }
}

impl MetricsSnapshot {
    pub fn compute(dataset: &Dataset, schema: &ScoreSchema) -> Self {
        scored_view(dataset, schema)
            .map(|view| Self::from_view(&view))
            .unwrap_or_default()
    }

    pub fn from_view(view: &ScoredView<'_>) -> Self {
        let rates = segmentation_rates(view);
        Self {
            average_score: round2(view.average_score()),
            completion_rate: rates.completion_rate,
            dropout_rate: rates.dropout_rate,
            active_students: rates.active_count,
            total_students: rates.total_count,
            trend: trend_chunks(view.records(), STANDARD_TREND_WINDOWS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: usize,
    pub completion_rate: f64,
    pub average_score: f64,
    pub dropout_rate: f64,
    pub active_students: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardReport {
    pub stats: DashboardStats,
    #[serde(rename = "studentData")]
    pub student_data: Vec<Map<String, Value>>,
}

impl DashboardReport {
    pub fn compute(
        dataset: &Dataset,
        schema: &ScoreSchema,
        timestamp_field: &str,
        range: DateRange,
    ) -> Self {
        let Some(view) = scored_view(dataset, schema) else {
            return Self::default();
        };
        let view = filter_by_date(&view, timestamp_field, range);
        let snapshot = MetricsSnapshot::from_view(&view);

        let student_data = view
            .records()
            .iter()
            .map(|record| {
                let mut row: Map<String, Value> = dataset
                    .columns()
                    .iter()
                    .zip(record.row.iter())
                    .map(|(column, cell)| (column.clone(), Value::String(cell.to_string())))
                    .collect();
                row.insert(
                    "overall_score".to_string(),
                    Value::from(round2(record.overall_score)),
                );
                row
            })
            .collect();

        Self {
            stats: DashboardStats {
                total_students: snapshot.total_students,
                completion_rate: snapshot.completion_rate,
                average_score: snapshot.average_score,
                dropout_rate: snapshot.dropout_rate,
                active_students: snapshot.active_students,
            },
            student_data,
        }
    }
}

/// Dropout rate per parental education level and per gender.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropoutReport {
    pub by_education: Vec<GroupValue>,
    pub by_gender: Vec<GroupValue>,
}

impl DropoutReport {
    pub fn compute(dataset: &Dataset, schema: &ScoreSchema) -> Self {
        let Some(view) = scored_view(dataset, schema) else {
            return Self::default();
        };
        let reducer = Reducer::SegmentRate(Segment::Dropout);
        Self {
            by_education: group_aggregate(&view, EDUCATION_FIELD, reducer),
            by_gender: group_aggregate(&view, GENDER_FIELD, reducer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub subject: String,
    pub average_score: f64,
}

/// Completion rate per parental education level and mean score per subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendsReport {
    pub completion_by_education: Vec<GroupValue>,
    pub subject_averages: Vec<SubjectAverage>,
}

impl TrendsReport {
    pub fn compute(dataset: &Dataset, schema: &ScoreSchema) -> Self {
        let Some(view) = scored_view(dataset, schema) else {
            return Self::default();
        };
        let subject_averages = view
            .score_fields()
            .iter()
            .map(|field| SubjectAverage {
                subject: subject_name(field).to_string(),
                average_score: round2(view.field_average(field)),
            })
            .collect();
        Self {
            completion_by_education: group_aggregate(
                &view,
                EDUCATION_FIELD,
                Reducer::SegmentRate(Segment::Completed),
            ),
            subject_averages,
        }
    }
}

/// `math_score` -> `math`.
pub fn subject_name(field: &str) -> &str {
    field
        .strip_suffix("_score")
        .filter(|s| !s.is_empty())
        .unwrap_or(field)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBucket {
    pub score: f64,
    pub count: usize,
}

/// Histogram of overall scores and mean score per test-preparation status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoresReport {
    pub distribution: Vec<ScoreBucket>,
    pub by_test_prep: Vec<GroupValue>,
}

impl ScoresReport {
    pub fn compute(dataset: &Dataset, schema: &ScoreSchema) -> Self {
        let Some(view) = scored_view(dataset, schema) else {
            return Self::default();
        };

        // Keyed on hundredths so f64 scores can be ordered and counted exactly.
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for record in view.records() {
            let key = (round2(record.overall_score) * 100.0).round() as i64;
            *counts.entry(key).or_default() += 1;
        }
        let distribution = counts
            .into_iter()
            .map(|(key, count)| ScoreBucket {
                score: key as f64 / 100.0,
                count,
            })
            .collect();

        Self {
            distribution,
            by_test_prep: group_aggregate(&view, TEST_PREP_FIELD, Reducer::MeanScore),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_rows(
            &[
                "gender",
                "parental_level_of_education",
                "test_preparation_course",
                "math_score",
                "reading_score",
                "writing_score",
            ],
            &[
                &["female", "bachelor's degree", "none", "72", "72", "74"],
                &["female", "some college", "completed", "69", "90", "88"],
                &["male", "associate's degree", "none", "47", "57", "44"],
                &["male", "some college", "none", "76", "78", "75"],
                &["female", "high school", "none", "38", "34", "32"],
                &["male", "high school", "completed", "30", "42", "39"],
            ],
        )
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(12.344), 12.34);
        assert_eq!(round2(f64::NAN), 0.0);
    }

    #[test]
    fn empty_dataset_reports_zeroes() {
        let snapshot = MetricsSnapshot::compute(&Dataset::empty(), &ScoreSchema::default());
        assert_eq!(snapshot, MetricsSnapshot::default());
        assert_eq!(snapshot.trend.len(), STANDARD_TREND_WINDOWS);
        assert!(snapshot.trend.iter().all(|w| w.avg_score == 0.0));
    }

    #[test]
    fn missing_score_columns_report_zeroes() {
        let dataset = Dataset::from_rows(&["gender"], &[&["female"], &["male"]]);
        let snapshot = MetricsSnapshot::compute(&dataset, &ScoreSchema::default());
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn snapshot_combines_segments_and_trend() {
        let snapshot = MetricsSnapshot::compute(&sample(), &ScoreSchema::default());
        assert_eq!(snapshot.total_students, 6);
        assert_eq!(snapshot.completion_rate, 50.0);
        assert_eq!(snapshot.dropout_rate, 33.33);
        assert_eq!(snapshot.active_students, 1);
        assert_eq!(snapshot.average_score, 58.72);
        let weeks: Vec<usize> = snapshot.trend.iter().map(|w| w.week).collect();
        assert_eq!(weeks, [1, 2, 3, 4]);
        assert_eq!(snapshot.trend[0].avg_score, 72.67);
        assert_eq!(snapshot.trend[3].avg_score, 49.33);
    }

    #[test]
    fn dashboard_rows_carry_overall_score() {
        let report = DashboardReport::compute(
            &sample(),
            &ScoreSchema::default(),
            "date",
            DateRange::default(),
        );
        assert_eq!(report.stats.total_students, 6);
        assert_eq!(report.student_data.len(), 6);
        let first = &report.student_data[0];
        assert_eq!(first["gender"], Value::from("female"));
        assert_eq!(first["overall_score"], Value::from(72.67));
    }

    #[test]
    fn dropout_report_groups_by_education_and_gender() {
        let report = DropoutReport::compute(&sample(), &ScoreSchema::default());
        let high_school = report
            .by_education
            .iter()
            .find(|g| g.group == "high school")
            .unwrap();
        assert_eq!(high_school.value, 100.0);
        assert_eq!(report.by_gender.len(), 2);
        assert_eq!(report.by_gender[0].group, "female");
        assert_eq!(report.by_gender[0].value, 33.33);
    }

    #[test]
    fn trends_report_lists_subjects() {
        let report = TrendsReport::compute(&sample(), &ScoreSchema::default());
        let subjects: Vec<&str> = report
            .subject_averages
            .iter()
            .map(|s| s.subject.as_str())
            .collect();
        assert_eq!(subjects, ["math", "reading", "writing"]);
        assert_eq!(report.subject_averages[0].average_score, 55.33);
        let some_college = report
            .completion_by_education
            .iter()
            .find(|g| g.group == "some college")
            .unwrap();
        assert_eq!(some_college.value, 100.0);
    }

    #[test]
    fn scores_report_counts_distinct_scores() {
        let dataset = Dataset::from_rows(
            &["math_score", "test_preparation_course"],
            &[&["50", "none"], &["70", "completed"], &["50", "none"]],
        );
        let report = ScoresReport::compute(&dataset, &ScoreSchema::default());
        assert_eq!(
            report.distribution,
            vec![
                ScoreBucket { score: 50.0, count: 2 },
                ScoreBucket { score: 70.0, count: 1 },
            ]
        );
        assert_eq!(report.by_test_prep[0].group, "completed");
        assert_eq!(report.by_test_prep[0].value, 70.0);
    }

    #[test]
    fn subject_names_drop_score_suffix() {
        assert_eq!(subject_name("math_score"), "math");
        assert_eq!(subject_name("attendance"), "attendance");
        assert_eq!(subject_name("_score"), "_score");
    }
}
