//! Completion-likelihood predictors.
//!
//! The API talks to a [`CompletionPredictor`] trait object. Two implementations
//! exist: a logistic regression fitted on the loaded dataset, and a fixed
//! heuristic curve that needs no training data.

use std::sync::Arc;

use linfa::traits::{Fit, Predict};
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use log::{info, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::{PredictorKind, ScoreSchema};
use crate::data;
use crate::error::{Error, Result};
use crate::metrics::scored_view;
use crate::scores::ScoredView;
use crate::segments::{segment, Segment, COMPLETION_THRESHOLD};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionFeatures {
    pub average_score: f64,
    pub hours_watched: Option<f64>,
    pub activity_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub predictor: String,
    pub features: Vec<String>,
    pub accuracy: Option<f64>,
}

pub trait CompletionPredictor: Send + Sync {
    /// Probability in `[0, 1]` that a student with these features completes.
    fn predict_completion(&self, features: &CompletionFeatures) -> Result<f64>;

    fn info(&self) -> ModelInfo;
}

/// Inputs the logistic model can be trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feature {
    AverageScore,
    HoursWatched,
    ActivityLevel,
}

impl Feature {
    const OPTIONAL: [Feature; 2] = [Feature::HoursWatched, Feature::ActivityLevel];

    fn name(self) -> &'static str {
        match self {
            Feature::AverageScore => "average_score",
            Feature::HoursWatched => "hours_watched",
            Feature::ActivityLevel => "activity_level",
        }
    }

    fn value_in(self, features: &CompletionFeatures) -> Option<f64> {
        match self {
            Feature::AverageScore => Some(features.average_score),
            Feature::HoursWatched => features.hours_watched,
            Feature::ActivityLevel => features.activity_level,
        }
    }
}

/// Per-column standardization fitted on the training rows.
#[derive(Debug, Clone)]
struct Scaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl Scaler {
    fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let means: Vec<f64> = (0..width)
            .map(|c| rows.iter().map(|r| r[c]).sum::<f64>() / n)
            .collect();
        let stds = (0..width)
            .map(|c| {
                let var = rows.iter().map(|r| (r[c] - means[c]).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();
        Self { means, stds }
    }

    fn apply(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

pub struct LogisticPredictor {
    model: FittedLogisticRegression<f64, bool>,
    features: Vec<Feature>,
    scaler: Scaler,
    accuracy: f64,
    // linfa reports the probability of its internal positive label; this records
    // whether that label is `true` (completed).
    completed_is_positive: bool,
}

impl LogisticPredictor {
    /// Fits a logistic regression on the scored view, targeting the completed segment.
    pub fn train(view: &ScoredView<'_>) -> Result<Self> {
        if view.is_empty() {
            return Err(Error::UpstreamUnavailable(
                "no scored records to train the completion model on".to_string(),
            ));
        }

        let mut features = vec![Feature::AverageScore];
        for feature in Feature::OPTIONAL {
            let complete = view
                .records()
                .iter()
                .all(|r| view.numeric(r, feature.name()).is_some());
            if view.dataset().has_column(feature.name()) && complete {
                features.push(feature);
            }
        }

        let rows: Vec<Vec<f64>> = view
            .records()
            .iter()
            .map(|r| {
                features
                    .iter()
                    .map(|f| match f {
                        Feature::AverageScore => r.overall_score,
                        other => view.numeric(r, other.name()).unwrap_or_default(),
                    })
                    .collect()
            })
            .collect();
        let targets: Array1<bool> = view
            .records()
            .iter()
            .map(|r| segment(r.overall_score) == Segment::Completed)
            .collect();

        let positives = targets.iter().filter(|&&t| t).count();
        if positives == 0 || positives == targets.len() {
            return Err(Error::UpstreamUnavailable(format!(
                "training data has a single class ({} of {} completed)",
                positives,
                targets.len()
            )));
        }

        let scaler = Scaler::fit(&rows, features.len());
        let flat: Vec<f64> = rows.iter().flat_map(|r| scaler.apply(r)).collect();
        let matrix = Array2::from_shape_vec((rows.len(), features.len()), flat)
            .map_err(|e| Error::UpstreamUnavailable(format!("feature matrix: {}", e)))?;

        let dataset = linfa::Dataset::new(matrix.clone(), targets.clone());
        let model = LogisticRegression::default()
            .max_iterations(100)
            .fit(&dataset)
            .map_err(|e| Error::UpstreamUnavailable(format!("model training failed: {}", e)))?;

        let predictions = model.predict(&matrix);
        let accuracy = calculate_accuracy(&predictions, &targets);
        let probabilities = model.predict_probabilities(&matrix);
        let completed_is_positive = probabilities
            .iter()
            .zip(predictions.iter())
            .max_by(|(a, _), (b, _)| (*a - 0.5).abs().total_cmp(&(*b - 0.5).abs()))
            .map_or(true, |(p, &predicted)| predicted == (*p >= 0.5));
        info!(
            "trained completion model on {} records ({:?}), accuracy {:.2}%",
            rows.len(),
            features.iter().map(|f| f.name()).collect::<Vec<_>>(),
            accuracy * 100.0
        );

        Ok(Self {
            model,
            features,
            scaler,
            accuracy,
            completed_is_positive,
        })
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }
}

impl CompletionPredictor for LogisticPredictor {
    fn predict_completion(&self, request: &CompletionFeatures) -> Result<f64> {
        validate(request)?;
        let row = self
            .features
            .iter()
            .map(|f| {
                f.value_in(request).ok_or_else(|| {
                    Error::InvalidInput(format!("{} is required by the trained model", f.name()))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let x = Array2::from_shape_vec((1, row.len()), self.scaler.apply(&row))
            .map_err(|e| Error::InvalidInput(format!("feature row: {}", e)))?;
        let p = self.model.predict_probabilities(&x)[0].clamp(0.0, 1.0);
        Ok(round4(if self.completed_is_positive { p } else { 1.0 - p }))
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            predictor: "logistic_regression".to_string(),
            features: self.features.iter().map(|f| f.name().to_string()).collect(),
            accuracy: Some(self.accuracy),
        }
    }
}

/// Fixed logistic curve centred on the completion threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPredictor;

impl HeuristicPredictor {
    const SCORE_SPREAD: f64 = 5.0;
    const HOURS_REFERENCE: f64 = 10.0;
    const HOURS_SPREAD: f64 = 20.0;
    const ACTIVITY_REFERENCE: f64 = 3.0;
    const ACTIVITY_SPREAD: f64 = 6.0;
}

impl CompletionPredictor for HeuristicPredictor {
    fn predict_completion(&self, request: &CompletionFeatures) -> Result<f64> {
        validate(request)?;
        let mut logit = (request.average_score - COMPLETION_THRESHOLD) / Self::SCORE_SPREAD;
        if let Some(hours) = request.hours_watched {
            logit += (hours - Self::HOURS_REFERENCE) / Self::HOURS_SPREAD;
        }
        if let Some(activity) = request.activity_level {
            logit += (activity - Self::ACTIVITY_REFERENCE) / Self::ACTIVITY_SPREAD;
        }
        Ok(round4(1.0 / (1.0 + (-logit).exp())))
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            predictor: "heuristic".to_string(),
            features: vec![
                Feature::AverageScore.name().to_string(),
                Feature::HoursWatched.name().to_string(),
                Feature::ActivityLevel.name().to_string(),
            ],
            accuracy: None,
        }
    }
}

fn validate(request: &CompletionFeatures) -> Result<()> {
    let checks = [
        (Feature::AverageScore, Some(request.average_score)),
        (Feature::HoursWatched, request.hours_watched),
        (Feature::ActivityLevel, request.activity_level),
    ];
    for (feature, value) in checks {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "{} must be a non-negative number",
                    feature.name()
                )));
            }
        }
    }
    Ok(())
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub fn calculate_accuracy(predictions: &Array1<bool>, targets: &Array1<bool>) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .filter(|(pred, actual)| pred == actual)
        .count() as f64
        / targets.len() as f64
}

/// Builds the configured predictor from the cleaned dataset.
pub fn build_predictor(
    kind: PredictorKind,
    data_path: &std::path::Path,
    schema: &ScoreSchema,
) -> Result<Arc<dyn CompletionPredictor>> {
    match kind {
        PredictorKind::Heuristic => Ok(Arc::new(HeuristicPredictor)),
        PredictorKind::Logistic => {
            let dataset = data::load(data_path);
            let view = scored_view(&dataset, schema).ok_or_else(|| {
                Error::UpstreamUnavailable("no score data available for model training".to_string())
            })?;
            let predictor = LogisticPredictor::train(&view).inspect_err(|e| {
                warn!("completion model unavailable: {}", e);
            })?;
            Ok(Arc::new(predictor))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use crate::scores::derive_overall_score;

    fn training_set() -> Dataset {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for i in 0..40 {
            let score = 20 + i * 2;
            let hours = if score >= 60 { 12 + i % 3 } else { 4 + i % 3 };
            rows.push(vec![score.to_string(), hours.to_string()]);
        }
        let refs: Vec<Vec<&str>> = rows
            .iter()
            .map(|r| r.iter().map(String::as_str).collect())
            .collect();
        let slices: Vec<&[&str]> = refs.iter().map(Vec::as_slice).collect();
        Dataset::from_rows(&["math_score", "hours_watched"], &slices)
    }

    #[test]
    fn heuristic_is_even_at_threshold_and_monotone() {
        let p = HeuristicPredictor;
        let at = |score| {
            p.predict_completion(&CompletionFeatures {
                average_score: score,
                ..Default::default()
            })
            .unwrap()
        };
        assert_eq!(at(COMPLETION_THRESHOLD), 0.5);
        assert!(at(30.0) < at(50.0));
        assert!(at(50.0) < at(70.0));
        assert!(at(90.0) > 0.99);
    }

    #[test]
    fn negative_inputs_are_rejected() {
        let err = HeuristicPredictor
            .predict_completion(&CompletionFeatures {
                average_score: 70.0,
                hours_watched: Some(-1.0),
                activity_level: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn logistic_model_separates_completers() {
        let dataset = training_set();
        let view = derive_overall_score(&dataset, &ScoreSchema::default()).unwrap();
        let model = LogisticPredictor::train(&view).unwrap();
        assert!(model.accuracy() > 0.9);
        assert_eq!(model.info().features, ["average_score", "hours_watched"]);

        let high = model
            .predict_completion(&CompletionFeatures {
                average_score: 90.0,
                hours_watched: Some(13.0),
                activity_level: None,
            })
            .unwrap();
        let low = model
            .predict_completion(&CompletionFeatures {
                average_score: 25.0,
                hours_watched: Some(4.0),
                activity_level: None,
            })
            .unwrap();
        assert!(high > 0.5, "high = {high}");
        assert!(low < 0.5, "low = {low}");
    }

    #[test]
    fn trained_features_are_required_at_prediction() {
        let dataset = training_set();
        let view = derive_overall_score(&dataset, &ScoreSchema::default()).unwrap();
        let model = LogisticPredictor::train(&view).unwrap();
        let err = model
            .predict_completion(&CompletionFeatures {
                average_score: 70.0,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn single_class_cannot_be_trained() {
        let dataset = Dataset::from_rows(&["math_score"], &[&["80"], &["90"]]);
        let view = derive_overall_score(&dataset, &ScoreSchema::default()).unwrap();
        assert!(matches!(
            LogisticPredictor::train(&view),
            Err(Error::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn accuracy_counts_matches() {
        let predictions = Array1::from_vec(vec![true, true, false, true]);
        let targets = Array1::from_vec(vec![true, false, false, true]);
        assert_eq!(calculate_accuracy(&predictions, &targets), 0.75);
    }
}
