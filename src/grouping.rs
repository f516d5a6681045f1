use std::collections::BTreeMap;

use crate::metrics::round2;
use crate::scores::{mean, ScoredView};
use crate::segments::{percentage, segment, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Mean overall score of the group.
    MeanScore,
    /// Share of the group in the given segment, as a percentage.
    SegmentRate(Segment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupValue {
    pub group: String,
    pub value: f64,
}

/// Reduces the view per distinct value of `field`, sorted by group key.
pub fn group_aggregate(view: &ScoredView<'_>, field: &str, reducer: Reducer) -> Vec<GroupValue> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in view.records() {
        groups
            .entry(view.category(record, field))
            .or_default()
            .push(record.overall_score);
    }

    groups
        .into_iter()
        .map(|(group, scores)| GroupValue {
            group: group.to_string(),
            value: reduce(&scores, reducer),
        })
        .collect()
}

fn reduce(scores: &[f64], reducer: Reducer) -> f64 {
    match reducer {
        Reducer::MeanScore => round2(mean(scores.iter().copied())),
        Reducer::SegmentRate(target) => {
            let hits = scores.iter().filter(|&&s| segment(s) == target).count();
            percentage(hits, scores.len())
        }
    }
}
