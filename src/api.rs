//! HTTP handlers under the `/api` prefix.
//!
//! Every request loads the cleaned table afresh and computes its payload from a
//! read-only view. Data endpoints never fail on missing data; they answer with
//! the zero payload instead.

use std::sync::Arc;

use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::cleaning;
use crate::config::{Config, ScoreSchema};
use crate::data::{self, Dataset};
use crate::error::Error;
use crate::grouping::GroupValue;
use crate::metrics::{
    DashboardReport, DropoutReport, MetricsSnapshot, ScoresReport, TrendsReport, EDUCATION_FIELD,
    GENDER_FIELD, TEST_PREP_FIELD,
};
use crate::model::{build_predictor, CompletionFeatures, CompletionPredictor};
use crate::summary::{template_summary, Summarizer};
use crate::trend::{DateRange, TrendWindow};

pub struct AppState {
    config: Config,
    schema: ScoreSchema,
    predictor: RwLock<Option<Arc<dyn CompletionPredictor>>>,
    summarizer: Arc<dyn Summarizer>,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        predictor: Option<Arc<dyn CompletionPredictor>>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        let schema = config.score_schema();
        Self {
            config,
            schema,
            predictor: RwLock::new(predictor),
            summarizer,
            last_refresh: RwLock::new(None),
        }
    }

    fn load(&self) -> Dataset {
        data::load(&self.config.data_path)
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::compute(&self.load(), &self.schema)
    }

    async fn predictor(&self) -> Option<Arc<dyn CompletionPredictor>> {
        self.predictor.read().await.clone()
    }
}

#[derive(Deserialize)]
pub struct DashboardQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct PredictRequest {
    average_score: Option<f64>,
    hours_watched: Option<f64>,
    activity_level: Option<f64>,
}

#[derive(Serialize)]
struct PredictResponse {
    completion_likelihood: f64,
}

#[derive(Serialize)]
struct MetricsUsed {
    average_score: f64,
    completion_rate: f64,
    dropout_rate: f64,
    active_students: usize,
    total_students: usize,
}

impl From<&MetricsSnapshot> for MetricsUsed {
    fn from(snapshot: &MetricsSnapshot) -> Self {
        Self {
            average_score: snapshot.average_score,
            completion_rate: snapshot.completion_rate,
            dropout_rate: snapshot.dropout_rate,
            active_students: snapshot.active_students,
            total_students: snapshot.total_students,
        }
    }
}

#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
    metrics_used: MetricsUsed,
    trend_used: Vec<TrendWindow>,
}

#[derive(Serialize)]
struct RefreshResponse {
    status: &'static str,
    rows_added: usize,
    last_updated: String,
}

/// `[{key: group, value_key: value}, ...]` in group order.
fn keyed_rows(groups: &[GroupValue], key: &str, value_key: &str) -> Vec<Value> {
    groups
        .iter()
        .map(|g| {
            let mut row = Map::new();
            row.insert(key.to_string(), Value::from(g.group.clone()));
            row.insert(value_key.to_string(), Value::from(g.value));
            Value::Object(row)
        })
        .collect()
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok", "message": "Backend is running" }))
}

async fn system_status(state: web::Data<AppState>) -> HttpResponse {
    let data_available = !state.load().is_empty();
    let last_refresh = *state.last_refresh.read().await;
    HttpResponse::Ok().json(json!({
        "backend": "running",
        "data_available": data_available,
        "last_data_refresh": timestamp(last_refresh),
    }))
}

async fn average_score(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "average_score": state.snapshot().average_score }))
}

async fn completion_rate(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "completion_rate": state.snapshot().completion_rate }))
}

async fn dropout_rate(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "dropout_rate": state.snapshot().dropout_rate }))
}

async fn total_students(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "total_students": state.snapshot().total_students }))
}

async fn active_students(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "active_students": state.snapshot().active_students }))
}

async fn score_trend(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "trend": state.snapshot().trend }))
}

async fn dashboard_data(
    state: web::Data<AppState>,
    query: web::Query<DashboardQuery>,
) -> Result<HttpResponse, Error> {
    let range = DateRange::parse(query.start_date.as_deref(), query.end_date.as_deref())?;
    let report = DashboardReport::compute(
        &state.load(),
        &state.schema,
        &state.config.timestamp_field,
        range,
    );
    Ok(HttpResponse::Ok().json(report))
}

async fn dropouts_data(state: web::Data<AppState>) -> HttpResponse {
    let report = DropoutReport::compute(&state.load(), &state.schema);
    HttpResponse::Ok().json(json!({
        "dropoutByEducation": keyed_rows(&report.by_education, EDUCATION_FIELD, "dropout_rate"),
        "dropoutByGender": keyed_rows(&report.by_gender, GENDER_FIELD, "dropout_rate"),
    }))
}

async fn trends_data(state: web::Data<AppState>) -> HttpResponse {
    let report = TrendsReport::compute(&state.load(), &state.schema);
    HttpResponse::Ok().json(json!({
        "completionTrend": keyed_rows(&report.completion_by_education, EDUCATION_FIELD, "completion_rate"),
        "averageScoresBySubject": report.subject_averages,
    }))
}

async fn scores_data(state: web::Data<AppState>) -> HttpResponse {
    let report = ScoresReport::compute(&state.load(), &state.schema);
    HttpResponse::Ok().json(json!({
        "scoreDistribution": report.distribution,
        "performanceByTestPrep": keyed_rows(&report.by_test_prep, TEST_PREP_FIELD, "average_score"),
    }))
}

async fn predict(
    state: web::Data<AppState>,
    req: web::Json<PredictRequest>,
) -> Result<HttpResponse, Error> {
    let average_score = req
        .average_score
        .ok_or_else(|| Error::InvalidInput("average_score is required".to_string()))?;
    let features = CompletionFeatures {
        average_score,
        hours_watched: req.hours_watched,
        activity_level: req.activity_level,
    };

    let predictor = state.predictor().await.ok_or_else(|| {
        Error::UpstreamUnavailable("completion model is not trained".to_string())
    })?;
    let completion_likelihood = predictor.predict_completion(&features)?;

    Ok(HttpResponse::Ok().json(PredictResponse {
        completion_likelihood,
    }))
}

async fn model_info(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let predictor = state.predictor().await.ok_or_else(|| {
        Error::UpstreamUnavailable("completion model is not trained".to_string())
    })?;
    Ok(HttpResponse::Ok().json(predictor.info()))
}

async fn ai_summary(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.snapshot();
    let summary = match state.summarizer.summarize(&snapshot, &snapshot.trend) {
        Ok(text) => text,
        Err(e) => {
            warn!("summarizer failed ({}), using template summary", e);
            template_summary(&snapshot, &snapshot.trend)
        }
    };

    HttpResponse::Ok().json(SummaryResponse {
        summary,
        metrics_used: MetricsUsed::from(&snapshot),
        trend_used: snapshot.trend.clone(),
    })
}

async fn refresh_data(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let config = state.config.clone();
    let schema = state.schema.clone();
    // Cleaning and model fitting are blocking work.
    let (report, predictor) = web::block(move || -> Result<_, Error> {
        let report = cleaning::clean_dataset(&config.raw_path, &config.data_path)?;
        let predictor = build_predictor(config.predictor, &config.data_path, &schema).ok();
        Ok((report, predictor))
    })
    .await
    .map_err(|e| Error::UpstreamUnavailable(format!("refresh worker failed: {}", e)))??;

    *state.predictor.write().await = predictor;

    let now = Utc::now();
    *state.last_refresh.write().await = Some(now);
    info!("data refreshed: {} rows", report.rows_written);

    Ok(HttpResponse::Ok().json(RefreshResponse {
        status: "success",
        rows_added: report.rows_written,
        last_updated: timestamp(Some(now)),
    }))
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    Error::InvalidInput(format!("malformed request body: {}", err)).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .route("/health", web::get().to(health))
            .route("/system-status", web::get().to(system_status))
            .route("/average-score", web::get().to(average_score))
            .route("/completion-rate", web::get().to(completion_rate))
            .route("/dropout-rate", web::get().to(dropout_rate))
            .route("/total-students", web::get().to(total_students))
            .route("/active-students", web::get().to(active_students))
            .route("/score-trend", web::get().to(score_trend))
            .route("/dashboard-data", web::get().to(dashboard_data))
            .route("/dropouts-data", web::get().to(dropouts_data))
            .route("/trends-data", web::get().to(trends_data))
            .route("/scores-data", web::get().to(scores_data))
            .route("/predict", web::post().to(predict))
            .route("/model/info", web::get().to(model_info))
            .route("/ai-summary", web::post().to(ai_summary))
            .route("/refresh-data", web::post().to(refresh_data)),
    );
}
