mod config;
mod db;
mod device;
mod error;
mod handlers;
mod models;
mod sampler;
mod tasks;

use actix_web::{middleware, web, App, HttpServer};
use config::Config;
use db::Database;
use device::SerialVoteSource;
use handlers::AppState;
use log::{error, info};
use sampler::Sampler;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let database = match Database::new(&config.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    info!(
        "Reading votes from {} at {} baud (timeout {:?})",
        config.serial_port, config.baud_rate, config.read_timeout
    );
    let source = Arc::new(SerialVoteSource::from_config(&config));

    let state = web::Data::new(AppState {
        sampler: Sampler::new(database, source, config.min_tallies),
        legacy_placeholder: config.legacy_placeholder,
    });

    if let Some(poll_id) = config.refresh_poll_id {
        let state_clone = state.clone();
        let period = config.refresh_interval;
        tokio::spawn(async move {
            tasks::refresher::refresh_poll_task(state_clone, poll_id, period).await;
        });
    }

    info!("Listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(&config.bind)?
    .run()
    .await
}
