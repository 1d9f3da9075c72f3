//! HTTP handlers and route configuration.

mod health;
mod quota;

use actix_web::web;

use crate::middleware::error::AppError;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PathConfig::default().error_handler(|err, _req| {
        AppError::NotFound(format!("Unknown quota scope: {}", err)).into()
    }))
    .app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::BadRequest(err.to_string()).into()
    }))
    .service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Quota routes
            .service(
                web::scope("/quota")
                    .route("/check", web::post().to(quota::check))
                    .route("/reset", web::post().to(quota::reset))
                    .route("/{scope}/check", web::post().to(quota::check_scope))
                    .route("/{scope}/reset", web::post().to(quota::reset_scope)),
            ),
    );
}
