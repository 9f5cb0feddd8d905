/// Explicitly constructed service graph shared by the HTTP workers
use crate::cache::{EphemeralCache, PostCache};
use crate::config::{Config, ModerationConfig, StorageBackend};
use crate::db::{self, Storage};
use crate::error::{AppError, Result};
use crate::middleware::JwtVerifier;
use crate::moderation::{HttpScoringOracle, ModerationGate, ModerationOracle, RuleBasedOracle};
use crate::services::{
    AccountService, CommentService, EngagementService, FollowService, NotificationDelivery,
    NotificationDispatcher, NotificationService, PostService,
};
use crate::websocket::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Storage,
    pub cache: Arc<EphemeralCache>,
    pub connections: Arc<ConnectionManager>,
    pub delivery: Arc<NotificationDelivery>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub posts: Arc<PostService>,
    pub engagement: Arc<EngagementService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub notifications: Arc<NotificationService>,
    pub accounts: Arc<AccountService>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    /// Wire every service from a storage set and an oracle list
    pub fn build(
        config: Config,
        storage: Storage,
        oracles: Vec<Arc<dyn ModerationOracle>>,
    ) -> Self {
        let cache = EphemeralCache::new();
        let post_cache = PostCache::new(cache.clone(), &config.cache);
        let connections = Arc::new(ConnectionManager::new());

        let delivery = Arc::new(NotificationDelivery::new(
            connections.clone(),
            storage.notifications.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            storage.notifications.clone(),
            storage.users.clone(),
            storage.follows.clone(),
            delivery.clone(),
        ));
        let gate = Arc::new(ModerationGate::new(
            oracles,
            Duration::from_millis(config.moderation.timeout_ms),
        ));

        let posts = Arc::new(PostService::new(
            storage.posts.clone(),
            storage.comments.clone(),
            gate,
            dispatcher.clone(),
            post_cache.clone(),
            config.moderation.notify_author_on_review,
        ));
        let engagement = Arc::new(EngagementService::new(
            storage.posts.clone(),
            dispatcher.clone(),
            post_cache,
            Duration::from_secs(config.engagement.view_window_secs),
        ));
        let comments = Arc::new(CommentService::new(
            storage.comments.clone(),
            storage.posts.clone(),
            dispatcher.clone(),
        ));
        let follows = Arc::new(FollowService::new(
            storage.follows.clone(),
            dispatcher.clone(),
        ));
        let notifications = Arc::new(NotificationService::new(
            storage.notifications.clone(),
            delivery.clone(),
        ));
        let accounts = Arc::new(AccountService::new(
            storage.users.clone(),
            dispatcher.clone(),
        ));
        let verifier = Arc::new(JwtVerifier::new(&config.auth));

        Self {
            config: Arc::new(config),
            storage,
            cache,
            connections,
            delivery,
            dispatcher,
            posts,
            engagement,
            comments,
            follows,
            notifications,
            accounts,
            verifier,
        }
    }

    /// Connect the configured storage backend and oracles, then wire services
    pub async fn from_config(config: Config) -> Result<Self> {
        let storage = match config.database.backend {
            StorageBackend::Postgres => {
                let pool = db::connect(&config.database.url, config.database.max_connections)
                    .await?;
                info!("Connected to Postgres, migrations applied");
                Storage::postgres(pool)
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Storage::in_memory()
            }
        };

        let oracles = oracles_from_config(&config.moderation)?;
        info!(oracles = oracles.len(), "Moderation oracles configured");
        Ok(Self::build(config, storage, oracles))
    }

    /// Start background work owned by the state
    pub fn start(&self) {
        self.cache
            .start_sweeper(Duration::from_secs(self.config.cache.sweep_interval_secs));
    }

    /// Stop background work and drop live sessions
    pub async fn shutdown(&self) {
        self.cache.shutdown();
        self.connections.clear_all().await;
        info!("Publication service state shut down");
    }
}

/// The rule-based checker always runs; the HTTP scorer joins when an
/// endpoint is configured.
pub fn oracles_from_config(config: &ModerationConfig) -> Result<Vec<Arc<dyn ModerationOracle>>> {
    let rules = match &config.sensitive_words_path {
        Some(path) => RuleBasedOracle::new(path).map_err(|e| AppError::Config(e.to_string()))?,
        None => RuleBasedOracle::without_words(),
    };

    let mut oracles: Vec<Arc<dyn ModerationOracle>> = vec![Arc::new(rules)];
    if let Some(url) = &config.scorer_url {
        let scorer = HttpScoringOracle::new(url.clone(), Duration::from_millis(config.timeout_ms))
            .map_err(|e| AppError::Config(e.to_string()))?;
        oracles.push(Arc::new(scorer));
    }
    Ok(oracles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moderation(path: Option<&str>, url: Option<&str>) -> ModerationConfig {
        ModerationConfig {
            sensitive_words_path: path.map(str::to_string),
            scorer_url: url.map(str::to_string),
            timeout_ms: 500,
            notify_author_on_review: false,
        }
    }

    #[test]
    fn test_oracles_from_config() {
        assert_eq!(oracles_from_config(&moderation(None, None)).unwrap().len(), 1);
        assert_eq!(
            oracles_from_config(&moderation(None, Some("http://127.0.0.1:9/score")))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_missing_word_list_is_config_error() {
        let result = oracles_from_config(&moderation(Some("/nonexistent/words.txt"), None));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
