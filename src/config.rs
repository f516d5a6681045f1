use std::path::PathBuf;

use clap::{Parser, ValueEnum};

pub const DEFAULT_SCORE_FIELDS: [&str; 3] = ["math_score", "reading_score", "writing_score"];

#[derive(Parser, Debug, Clone)]
#[command(name = "student-analytics")]
#[command(about = "Student performance analytics API", long_about = None)]
pub struct Config {
    /// Cleaned dataset read on every request
    #[arg(long, env = "ANALYTICS_DATA_PATH", default_value = "data/cleaned/cleaned_students.csv")]
    pub data_path: PathBuf,

    /// Raw dataset consumed by refresh-data
    #[arg(long, env = "ANALYTICS_RAW_PATH", default_value = "data/raw/StudentsPerformance.csv")]
    pub raw_path: PathBuf,

    #[arg(long, env = "ANALYTICS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "ANALYTICS_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Comma separated list of subject score columns
    #[arg(
        long,
        env = "ANALYTICS_SCORE_FIELDS",
        value_delimiter = ',',
        default_values_t = DEFAULT_SCORE_FIELDS.map(String::from)
    )]
    pub score_fields: Vec<String>,

    /// Treat every column containing "score" as a subject score
    #[arg(long, env = "ANALYTICS_DISCOVER_SCORES")]
    pub discover_scores: bool,

    /// Column used for date filtering
    #[arg(long, env = "ANALYTICS_TIMESTAMP_FIELD", default_value = "date")]
    pub timestamp_field: String,

    #[arg(long, env = "ANALYTICS_PREDICTOR", value_enum, default_value_t = PredictorKind::Logistic)]
    pub predictor: PredictorKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PredictorKind {
    Logistic,
    Heuristic,
}

/// Which columns count as subject scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreSchema {
    /// Named fields, intersected with the loaded header.
    Explicit(Vec<String>),
    /// Every column whose name contains "score".
    Discover,
}

impl Default for ScoreSchema {
    fn default() -> Self {
        ScoreSchema::Explicit(DEFAULT_SCORE_FIELDS.iter().map(|f| f.to_string()).collect())
    }
}

impl Config {
    pub fn score_schema(&self) -> ScoreSchema {
        if self.discover_scores {
            return ScoreSchema::Discover;
        }
        let fields: Vec<String> = self
            .score_fields
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        ScoreSchema::Explicit(fields)
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
