use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use student_analytics::api::{self, AppState};
use student_analytics::config::Config;
use student_analytics::model::build_predictor;
use student_analytics::summary::TemplateSummarizer;

async fn start_api(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr();

    info!("Loading student data from {}", config.data_path.display());
    let predictor = match build_predictor(config.predictor, &config.data_path, &config.score_schema()) {
        Ok(predictor) => Some(predictor),
        Err(e) => {
            warn!("starting without a completion model: {}", e);
            None
        }
    };

    let state = web::Data::new(AppState::new(
        config,
        predictor,
        Arc::new(TemplateSummarizer),
    ));

    info!("Starting student analytics API on http://{}:{}", bind_addr.0, bind_addr.1);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(api::configure)
    })
    .bind(bind_addr.clone())
    .with_context(|| format!("failed to bind {}:{}", bind_addr.0, bind_addr.1))?
    .run()
    .await
    .context("HTTP server error")?;

    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    start_api(config).await
}
