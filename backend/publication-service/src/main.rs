use actix_web::{web, App, HttpServer};
use anyhow::Context;
use publication_service::middleware::JwtAuthMiddleware;
use publication_service::{handlers, metrics, AppState, Config};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=debug".into());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting publication service");

    let config = Config::from_env().context("Failed to load configuration")?;
    let addr = format!("{}:{}", config.app.host, config.app.port);

    let state = AppState::from_config(config)
        .await
        .context("Failed to initialize publication service")?;
    state.start();

    tracing::info!("Starting HTTP server on {}", addr);

    let app_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(JwtAuthMiddleware::new(app_state.verifier.clone()))
            .wrap(metrics::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&addr)
    .with_context(|| format!("Failed to bind {}", addr))?
    .run()
    .await
    .context("HTTP server error")?;

    state.shutdown().await;
    tracing::info!("Publication service stopped");
    Ok(())
}
