//! Error taxonomy shared by the analytics engine and the HTTP layer.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Source table missing, unreadable or empty.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Table loaded but no score column could be resolved.
    #[error("no score data available")]
    NoScoreData,

    /// Caller-supplied field missing or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Predictor, summarizer or refresh source not ready.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
