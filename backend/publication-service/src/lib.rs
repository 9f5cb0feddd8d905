/// Publication Service Library
///
/// Moderation and publication pipeline for the campus blog: the post
/// lifecycle, the moderation oracle boundary, engagement counters, the
/// notification store with its fan-out dispatcher, and real-time delivery.
///
/// # Modules
///
/// - `lifecycle`: transition table and edit permissions
/// - `moderation`: oracle boundary and the combining gate
/// - `services`: business logic (posts, engagement, dispatcher, delivery)
/// - `db`: repository traits with Postgres and in-memory adapters
/// - `cache`: process-local TTL cache for published reads
/// - `websocket`: session actor and connection manager
/// - `handlers`: HTTP endpoints
/// - `middleware`: JWT authentication
/// - `metrics`: Prometheus metrics
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod moderation;
pub mod services;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
