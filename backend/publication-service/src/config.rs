/// Configuration management for Publication Service
///
/// Everything is read from environment variables (a `.env` file is honoured in
/// development). Numeric values that fail to parse are reported instead of
/// silently falling back to defaults.
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub moderation: ModerationConfig,
    pub cache: CacheConfig,
    pub engagement: EngagementConfig,
    pub realtime: RealtimeConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            other => Err(AppError::Config(format!("unknown STORAGE_BACKEND '{}'", other))),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
}

/// Moderation oracle wiring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Optional word list for the rule-based checker
    pub sensitive_words_path: Option<String>,
    /// Optional endpoint of the external (generative) scorer
    pub scorer_url: Option<String>,
    pub timeout_ms: u64,
    /// Tell authors right away when their post is held for review
    pub notify_author_on_review: bool,
}

/// Ephemeral cache TTLs, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub sweep_interval_secs: u64,
    pub single_post_ttl_secs: u64,
    pub list_ttl_secs: u64,
    pub category_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            single_post_ttl_secs: 300,
            list_ttl_secs: 120,
            category_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// Rolling window during which a viewer token counts once per post
    pub view_window_secs: u64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            view_window_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("PUBLICATION_SERVICE_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env_or_default("PUBLICATION_SERVICE_PORT", 8085)?,
        };

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if app.is_production() => {
                return Err(AppError::Config(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            _ => "development-secret".to_string(),
        };

        let backend = match std::env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::Postgres,
        };

        Ok(Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/campus_blog".to_string()),
                max_connections: parse_env_or_default("DATABASE_MAX_CONNECTIONS", 10)?,
                backend,
            },
            auth: AuthConfig {
                jwt_secret,
                jwt_issuer: std::env::var("JWT_ISSUER").ok(),
            },
            moderation: ModerationConfig {
                sensitive_words_path: std::env::var("MODERATION_SENSITIVE_WORDS_PATH").ok(),
                scorer_url: std::env::var("MODERATION_SCORER_URL").ok(),
                timeout_ms: parse_env_or_default("MODERATION_TIMEOUT_MS", 3_000)?,
                notify_author_on_review: parse_env_or_default(
                    "MODERATION_NOTIFY_AUTHOR_ON_REVIEW",
                    false,
                )?,
            },
            cache: CacheConfig {
                sweep_interval_secs: parse_env_or_default("CACHE_SWEEP_INTERVAL_SECS", 60)?,
                single_post_ttl_secs: parse_env_or_default("CACHE_TTL_SINGLE_SECS", 300)?,
                list_ttl_secs: parse_env_or_default("CACHE_TTL_LIST_SECS", 120)?,
                category_ttl_secs: parse_env_or_default("CACHE_TTL_CATEGORY_SECS", 600)?,
            },
            engagement: EngagementConfig {
                view_window_secs: parse_env_or_default("VIEW_WINDOW_SECS", 86_400)?,
            },
            realtime: RealtimeConfig {
                heartbeat_interval_secs: parse_env_or_default("WS_HEARTBEAT_INTERVAL_SECS", 5)?,
                client_timeout_secs: parse_env_or_default("WS_CLIENT_TIMEOUT_SECS", 30)?,
            },
            app,
        })
    }
}

fn parse_env_or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Failed to parse {}='{}': {}", key, val, e))),
        Err(_) => Ok(default),
    }
}
