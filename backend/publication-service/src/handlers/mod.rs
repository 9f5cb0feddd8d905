/// HTTP handlers for publication-service
///
/// - `posts`: lifecycle, reads and engagement
/// - `comments`: comments and replies
/// - `follows`: follow edges
/// - `notifications`: the caller's notification inbox
/// - `moderation`: the review queue
/// - `internal`: account workflow events
/// - `websocket`: real-time entry point
pub mod comments;
pub mod follows;
pub mod internal;
pub mod moderation;
pub mod notifications;
pub mod posts;
pub mod websocket;

use actix_web::{web, HttpResponse};

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Register every route of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(crate::metrics::serve_metrics));

    posts::register_routes(cfg);
    comments::register_routes(cfg);
    follows::register_routes(cfg);
    notifications::register_routes(cfg);
    moderation::register_routes(cfg);
    internal::register_routes(cfg);
    websocket::register_routes(cfg);
}
