//! Student performance analytics.
//!
//! Loads a cleaned exam-score table, derives each student's overall score and
//! reports completion, dropout and activity metrics, grouped aggregates and
//! chronological trend windows over an actix-web JSON API.

pub mod api;
pub mod cleaning;
pub mod config;
pub mod data;
pub mod error;
pub mod grouping;
pub mod metrics;
pub mod model;
pub mod scores;
pub mod segments;
pub mod summary;
pub mod trend;

pub use error::{Error, Result};
