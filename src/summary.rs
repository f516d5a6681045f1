use std::fmt::Write;

use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::trend::TrendWindow;

/// Turns computed metrics into narrative text.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, metrics: &MetricsSnapshot, trend: &[TrendWindow]) -> Result<String>;
}

/// Deterministic, template-based summary. Needs no external service.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSummarizer;

/// Minimum first-to-last window change reported as a movement.
const TREND_TOLERANCE: f64 = 1.0;

impl Summarizer for TemplateSummarizer {
    fn summarize(&self, metrics: &MetricsSnapshot, trend: &[TrendWindow]) -> Result<String> {
        Ok(template_summary(metrics, trend))
    }
}

pub fn template_summary(metrics: &MetricsSnapshot, trend: &[TrendWindow]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Quick Overview:");
    let _ = writeln!(output, "- Average score: {:.2}", metrics.average_score);
    let _ = writeln!(output, "- Completion rate: {:.2}%", metrics.completion_rate);
    let _ = writeln!(output, "- Dropout rate: {:.2}%", metrics.dropout_rate);
    let _ = writeln!(
        output,
        "- Active students: {} out of {}",
        metrics.active_students, metrics.total_students
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "Detailed Insight:");
    if metrics.total_students == 0 {
        let _ = writeln!(output, "No student records are available for this period.");
    } else {
        let _ = writeln!(
            output,
            "{:.2}% of students reached the completion threshold and {:.2}% fall in the dropout band.",
            metrics.completion_rate, metrics.dropout_rate
        );
        let _ = writeln!(
            output,
            "{} students sit between the two thresholds and may benefit from targeted support.",
            metrics.active_students
        );
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "Trend Summary:");
    let scores: Vec<String> = trend.iter().map(|w| format!("{:.2}", w.avg_score)).collect();
    if scores.is_empty() {
        let _ = write!(output, "No trend windows were computed.");
    } else {
        let _ = writeln!(
            output,
            "Across {} windows the average scores were: {}.",
            trend.len(),
            scores.join(", ")
        );
        let _ = write!(output, "{}", describe_direction(trend));
    }

    output
}

fn describe_direction(trend: &[TrendWindow]) -> &'static str {
    let (Some(first), Some(last)) = (trend.first(), trend.last()) else {
        return "The trend is flat.";
    };
    let delta = last.avg_score - first.avg_score;
    if delta > TREND_TOLERANCE {
        "Scores rose from the first window to the last."
    } else if delta < -TREND_TOLERANCE {
        "Scores fell from the first window to the last."
    } else {
        "Scores stayed broadly stable across the windows."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(week: usize, avg_score: f64) -> TrendWindow {
        TrendWindow { week, avg_score }
    }

    #[test]
    fn summary_quotes_the_metrics() {
        let metrics = MetricsSnapshot {
            average_score: 66.08,
            completion_rate: 67.5,
            dropout_rate: 4.2,
            active_students: 283,
            total_students: 1000,
            trend: vec![window(1, 65.1), window(2, 70.4)],
        };
        let text = TemplateSummarizer
            .summarize(&metrics, &metrics.trend)
            .unwrap();
        assert!(text.contains("Average score: 66.08"));
        assert!(text.contains("Completion rate: 67.50%"));
        assert!(text.contains("Active students: 283 out of 1000"));
        assert!(text.contains("65.10, 70.40"));
        assert!(text.ends_with("Scores rose from the first window to the last."));
    }

    #[test]
    fn summary_does_not_invent_improvement() {
        let trend = [window(1, 70.0), window(2, 60.0)];
        assert_eq!(describe_direction(&trend), "Scores fell from the first window to the last.");
        let flat = [window(1, 70.0), window(2, 70.5)];
        assert_eq!(
            describe_direction(&flat),
            "Scores stayed broadly stable across the windows."
        );
    }

    #[test]
    fn empty_metrics_still_summarize() {
        let text = template_summary(&MetricsSnapshot::default(), &[]);
        assert!(text.contains("No student records"));
        assert!(text.ends_with("No trend windows were computed."));
    }
}
