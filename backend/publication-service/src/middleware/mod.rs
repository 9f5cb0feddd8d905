/// HTTP middleware for publication-service
///
/// JWT authentication with capability normalisation. Request metrics live in
/// `crate::metrics::MetricsMiddleware`.
pub mod auth;

pub use auth::{bearer_token, Claims, JwtAuthMiddleware, JwtVerifier};
