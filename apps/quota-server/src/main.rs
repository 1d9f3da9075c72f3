//! # Quota Server
//!
//! The main entry point for the Actix-web HTTP server fronting the quota gate.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

#[cfg(feature = "scheduler")]
mod background;
mod config;
mod handlers;
mod middleware;
mod observability;
mod scope;
mod state;
mod telemetry;

use config::AppConfig;
use middleware::throttle::ThrottleMiddleware;
use observability::RequestIdMiddleware;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    // Bad policies are fatal at startup
    let config = AppConfig::from_env()?;

    tracing::info!("Starting quota server on {}:{}", config.host, config.port);

    let state = AppState::new(&config);

    #[cfg(feature = "scheduler")]
    let mut sweeper = background::start_local_sweeper(
        background::SchedulerConfig::from_env(),
        state.gate.clone(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to start scheduler: {:?}", e))?;

    let throttle = config.throttle;
    let throttle_exempt = config.throttle_exempt.clone();
    let server_state = state.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(
                ThrottleMiddleware::new(
                    server_state.gate.clone(),
                    throttle,
                    server_state.clock.clone(),
                )
                .exempt(throttle_exempt.clone()),
            )
            .wrap(RequestIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(server_state.clone()))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    #[cfg(feature = "scheduler")]
    if let Err(e) = sweeper.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {:?}", e);
    }

    tracing::info!("Quota server stopped");
    Ok(())
}
