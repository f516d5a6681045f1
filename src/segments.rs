use serde::Serialize;

use crate::metrics::round2;
use crate::scores::ScoredView;

/// Scores at or above this count as completed.
pub const COMPLETION_THRESHOLD: f64 = 60.0;
/// Scores strictly below this count as dropouts.
pub const DROPOUT_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Completed,
    Active,
    Dropout,
}

pub fn segment(overall_score: f64) -> Segment {
    if overall_score >= COMPLETION_THRESHOLD {
        Segment::Completed
    } else if overall_score < DROPOUT_THRESHOLD {
        Segment::Dropout
    } else {
        Segment::Active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentationRates {
    pub completion_rate: f64,
    pub dropout_rate: f64,
    pub completed_count: usize,
    pub active_count: usize,
    pub dropout_count: usize,
    pub total_count: usize,
}

impl SegmentationRates {
    pub fn active_rate(&self) -> f64 {
        percentage(self.active_count, self.total_count)
    }
}

pub fn segmentation_rates(view: &ScoredView<'_>) -> SegmentationRates {
    let mut rates = SegmentationRates::default();
    for record in view.records() {
        match segment(record.overall_score) {
            Segment::Completed => rates.completed_count += 1,
            Segment::Active => rates.active_count += 1,
            Segment::Dropout => rates.dropout_count += 1,
        }
    }
    rates.total_count = view.len();
    rates.completion_rate = percentage(rates.completed_count, rates.total_count);
    rates.dropout_rate = percentage(rates.dropout_count, rates.total_count);
    rates
}

/// `part / total * 100` rounded to 2 dp, 0 for an empty total.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 / total as f64 * 100.0)
    }
}
