#![allow(dead_code)]

use async_trait::async_trait;
use publication_service::config::{
    AppConfig, AuthConfig, CacheConfig, Config, DatabaseConfig, EngagementConfig,
    ModerationConfig, RealtimeConfig, StorageBackend,
};
use publication_service::db::{
    InMemoryNotifications, InMemoryPosts, NotificationRepository, PostRepository, Storage,
};
use publication_service::error::{AppError, Result};
use publication_service::models::{
    Actor, BulkInsert, Capability, CategoryCount, NewNotification, NewPost, Notification,
    NotificationFilter, NotificationType, PageRequest, Post, PostChanges, PostStatus, ReactionOp,
    ReactionOutcome, Severity, StatusStamp, UserRecord,
};
use publication_service::moderation::{ModerationOracle, OracleError, Verdict};
use publication_service::services::CreatePostRequest;
use publication_service::AppState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use uuid::Uuid;

pub const TEST_SECRET: &str = "publication-test-secret";

pub fn test_config() -> Config {
    Config {
        app: AppConfig {
            env: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            backend: StorageBackend::Memory,
        },
        auth: AuthConfig {
            jwt_secret: TEST_SECRET.to_string(),
            jwt_issuer: None,
        },
        moderation: ModerationConfig {
            sensitive_words_path: None,
            scorer_url: None,
            timeout_ms: 500,
            notify_author_on_review: false,
        },
        cache: CacheConfig::default(),
        engagement: EngagementConfig::default(),
        realtime: RealtimeConfig::default(),
    }
}

/// Oracle returning the same verdict (or failure) for every input
pub struct ScriptedOracle {
    outcome: std::result::Result<Verdict, String>,
}

impl ScriptedOracle {
    pub fn clean() -> Arc<dyn ModerationOracle> {
        Arc::new(Self {
            outcome: Ok(Verdict::clean()),
        })
    }

    pub fn flagging(severity: Severity) -> Arc<dyn ModerationOracle> {
        Arc::new(Self {
            outcome: Ok(Verdict::flagged(severity, vec!["scripted".to_string()])),
        })
    }

    pub fn failing() -> Arc<dyn ModerationOracle> {
        Arc::new(Self {
            outcome: Err("scorer offline".to_string()),
        })
    }
}

#[async_trait]
impl ModerationOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(
        &self,
        _title: &str,
        _content: &str,
    ) -> std::result::Result<Verdict, OracleError> {
        self.outcome.clone().map_err(OracleError::Unavailable)
    }
}

/// A service graph plus the users every scenario needs
pub struct Fixture {
    pub state: AppState,
    pub admin: Actor,
    pub moderator: Actor,
    pub author: Actor,
    pub reader: Actor,
}

impl Fixture {
    pub async fn new(oracle: Arc<dyn ModerationOracle>) -> Self {
        Self::with_storage(Storage::in_memory(), oracle).await
    }

    pub async fn with_storage(storage: Storage, oracle: Arc<dyn ModerationOracle>) -> Self {
        let state = AppState::build(test_config(), storage, vec![oracle]);
        let admin = register(&state, "Ada", [Capability::Admin]).await;
        let moderator = register(&state, "Mo", [Capability::Moderator]).await;
        let author = register(&state, "Ari", [Capability::Author]).await;
        let reader = register(&state, "Rea", [Capability::Reader]).await;

        Self {
            state,
            admin,
            moderator,
            author,
            reader,
        }
    }

    /// Author submits a clean post for review
    pub async fn pending_post(&self) -> Post {
        self.state
            .posts
            .create_post(&self.author, post_request("Exam tips", None))
            .await
            .expect("create pending post")
    }

    /// Pending post approved by the moderator
    pub async fn published_post(&self) -> Post {
        let post = self.pending_post().await;
        self.state
            .posts
            .approve(&self.moderator, post.id, None)
            .await
            .expect("approve post")
    }

    pub async fn count_of(&self, user: &Actor, notification_type: NotificationType) -> usize {
        count_of(&self.state, user.user_id, notification_type).await
    }

    pub async fn unread(&self, user_id: Uuid) -> i64 {
        self.state
            .notifications
            .unread_count(user_id)
            .await
            .expect("unread count")
    }
}

pub async fn register<const N: usize>(
    state: &AppState,
    name: &str,
    capabilities: [Capability; N],
) -> Actor {
    let id = Uuid::new_v4();
    state
        .storage
        .users
        .register(UserRecord::new(id, name, capabilities))
        .await
        .expect("register user");
    Actor::new(id, capabilities)
}

pub async fn count_of(
    state: &AppState,
    recipient_id: Uuid,
    notification_type: NotificationType,
) -> usize {
    state
        .storage
        .notifications
        .list(
            recipient_id,
            &NotificationFilter {
                notification_type: Some(notification_type),
                unread_only: false,
                limit: 100,
                offset: 0,
            },
        )
        .await
        .expect("list notifications")
        .len()
}

pub fn post_request(title: &str, status: Option<PostStatus>) -> CreatePostRequest {
    CreatePostRequest {
        title: title.to_string(),
        content: "Start early, sleep well and read the syllabus twice.".to_string(),
        category: Some("study".to_string()),
        co_authors: Vec::new(),
        status,
        skip_moderation: false,
    }
}

const DISARMED: usize = usize::MAX / 2;

/// Post store whose first two reads wait for each other, so two racing
/// status changes both observe the same starting status. Reads pass
/// straight through until `arm` is called. Also remembers the status each
/// content write found stored.
pub struct RacingPosts {
    inner: InMemoryPosts,
    barrier: Barrier,
    reads: AtomicUsize,
    written_over: Mutex<Vec<PostStatus>>,
}

impl RacingPosts {
    pub fn new() -> Self {
        Self {
            inner: InMemoryPosts::new(),
            barrier: Barrier::new(2),
            reads: AtomicUsize::new(DISARMED),
            written_over: Mutex::new(Vec::new()),
        }
    }

    /// Stored status at the moment of each `update_content`, oldest first
    pub fn statuses_at_write(&self) -> Vec<PostStatus> {
        self.written_over.lock().unwrap().clone()
    }

    pub fn arm(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.reads.store(DISARMED, Ordering::SeqCst);
    }
}

#[async_trait]
impl PostRepository for RacingPosts {
    async fn insert(&self, post: NewPost) -> Result<Post> {
        self.inner.insert(post).await
    }

    async fn get(&self, post_id: Uuid) -> Result<Option<Post>> {
        let post = self.inner.get(post_id).await?;
        if self.reads.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait().await;
        }
        Ok(post)
    }

    async fn update_content(&self, post_id: Uuid, changes: &PostChanges) -> Result<Option<Post>> {
        if let Some(stored) = self.inner.get(post_id).await? {
            self.written_over.lock().unwrap().push(stored.status);
        }
        self.inner.update_content(post_id, changes).await
    }

    async fn answer_invite(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        accept: bool,
    ) -> Result<Option<Post>> {
        self.inner.answer_invite(post_id, user_id, accept).await
    }

    async fn transition(
        &self,
        post_id: Uuid,
        expected: &[PostStatus],
        to: PostStatus,
        stamp: &StatusStamp,
    ) -> Result<Option<Post>> {
        self.inner.transition(post_id, expected, to, stamp).await
    }

    async fn delete(&self, post_id: Uuid) -> Result<bool> {
        self.inner.delete(post_id).await
    }

    async fn react(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        op: ReactionOp,
    ) -> Result<Option<ReactionOutcome>> {
        self.inner.react(post_id, user_id, op).await
    }

    async fn increment_views(&self, post_id: Uuid) -> Result<Option<i64>> {
        self.inner.increment_views(post_id).await
    }

    async fn list_published(
        &self,
        page: PageRequest,
        category: Option<&str>,
    ) -> Result<Vec<Post>> {
        self.inner.list_published(page, category).await
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>> {
        self.inner.category_counts().await
    }

    async fn moderation_queue(&self, page: PageRequest) -> Result<Vec<Post>> {
        self.inner.moderation_queue(page).await
    }
}

/// Notification store whose bulk writes always fail
#[derive(Default)]
pub struct BrokenFanOut {
    inner: InMemoryNotifications,
}

#[async_trait]
impl NotificationRepository for BrokenFanOut {
    async fn insert(&self, notification: NewNotification) -> Result<Option<Notification>> {
        self.inner.insert(notification).await
    }

    async fn insert_many(&self, _batch: Vec<NewNotification>) -> Result<BulkInsert> {
        Err(AppError::Database("connection reset by peer".to_string()))
    }

    async fn find_outstanding(
        &self,
        recipient_id: Uuid,
        notification_type: NotificationType,
        related_post: Uuid,
    ) -> Result<Option<Notification>> {
        self.inner
            .find_outstanding(recipient_id, notification_type, related_post)
            .await
    }

    async fn list(
        &self,
        recipient_id: Uuid,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        self.inner.list(recipient_id, filter).await
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        self.inner.unread_count(recipient_id).await
    }

    async fn mark_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        self.inner.mark_read(recipient_id, notification_id).await
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        self.inner.mark_all_read(recipient_id).await
    }

    async fn delete(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        self.inner.delete(recipient_id, notification_id).await
    }

    async fn delete_all(&self, recipient_id: Uuid) -> Result<u64> {
        self.inner.delete_all(recipient_id).await
    }
}
