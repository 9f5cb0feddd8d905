/// Database access layer
///
/// Every component talks to storage through the repository traits below.
/// Two adapters exist: Postgres (sqlx, production) and in-memory (local runs
/// and tests). Both must honour the same atomicity contract:
///
/// - `PostRepository::transition` is a conditional update that only applies
///   when the stored status is still one of `expected`
/// - `PostRepository::react` mutates likes/dislikes in one step
/// - `PostRepository::increment_views` is a single increment, never a
///   read-then-write
pub mod comment_repo;
pub mod follow_repo;
pub mod memory;
pub mod notification_repo;
pub mod post_repo;
pub mod user_repo;

pub use comment_repo::PgCommentRepository;
pub use follow_repo::PgFollowRepository;
pub use memory::{
    InMemoryComments, InMemoryFollows, InMemoryNotifications, InMemoryPosts, InMemoryUsers,
};
pub use notification_repo::PgNotificationRepository;
pub use post_repo::PgPostRepository;
pub use user_repo::PgUserDirectory;

use crate::error::Result;
use crate::models::{
    BulkInsert, Capability, CategoryCount, Comment, NewComment, NewNotification, NewPost,
    Notification, NotificationFilter, NotificationType, PageRequest, Post, PostChanges, PostStatus, ReactionOp,
    ReactionOutcome, StatusStamp, UserRecord,
};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert(&self, post: NewPost) -> Result<Post>;

    async fn get(&self, post_id: Uuid) -> Result<Option<Post>>;

    /// Returns `None` when the post is missing or, with
    /// `changes.unmodified_since` set, when it was modified in between.
    async fn update_content(&self, post_id: Uuid, changes: &PostChanges) -> Result<Option<Post>>;

    /// Accept (or drop, when `accept` is false) the open invite of `user_id`
    /// in one step, leaving the other co-author entries as stored.
    /// Returns `None` when the post is missing or has no open invite for them.
    async fn answer_invite(&self, post_id: Uuid, user_id: Uuid, accept: bool)
        -> Result<Option<Post>>;

    /// Apply `to` only if the stored status is one of `expected`.
    /// Returns `None` when the post is missing or its status moved on.
    async fn transition(
        &self,
        post_id: Uuid,
        expected: &[PostStatus],
        to: PostStatus,
        stamp: &StatusStamp,
    ) -> Result<Option<Post>>;

    async fn delete(&self, post_id: Uuid) -> Result<bool>;

    async fn react(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        op: ReactionOp,
    ) -> Result<Option<ReactionOutcome>>;

    /// Returns the new view count, or `None` for an unknown post
    async fn increment_views(&self, post_id: Uuid) -> Result<Option<i64>>;

    async fn list_published(&self, page: PageRequest, category: Option<&str>)
        -> Result<Vec<Post>>;

    async fn category_counts(&self) -> Result<Vec<CategoryCount>>;

    /// Pending posts, most severe first, then oldest first
    async fn moderation_queue(&self, page: PageRequest) -> Result<Vec<Post>>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: NewNotification) -> Result<Option<Notification>>;

    /// One bulk write; recipients that could not be written are reported,
    /// never dropped.
    async fn insert_many(&self, batch: Vec<NewNotification>) -> Result<BulkInsert>;

    /// Unread record of a de-duplicated type still outstanding for the
    /// recipient and post
    async fn find_outstanding(
        &self,
        recipient_id: Uuid,
        notification_type: NotificationType,
        related_post: Uuid,
    ) -> Result<Option<Notification>>;

    async fn list(&self, recipient_id: Uuid, filter: &NotificationFilter)
        -> Result<Vec<Notification>>;

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64>;

    async fn mark_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool>;

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64>;

    async fn delete(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool>;

    async fn delete_all(&self, recipient_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait FollowRepository: Send + Sync {
    /// Returns true when the edge did not exist before
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;

    async fn followers_of(&self, followee_id: Uuid) -> Result<Vec<Uuid>>;

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserRecord>>;

    /// Insert or refresh a directory entry
    async fn register(&self, user: UserRecord) -> Result<()>;

    /// Active users holding at least one of `capabilities`
    async fn active_with_capabilities(&self, capabilities: &[Capability]) -> Result<Vec<Uuid>>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: NewComment) -> Result<Comment>;

    async fn get(&self, comment_id: Uuid) -> Result<Option<Comment>>;

    async fn update(&self, comment_id: Uuid, content: &str) -> Result<Option<Comment>>;

    async fn delete(&self, comment_id: Uuid) -> Result<bool>;

    async fn delete_for_post(&self, post_id: Uuid) -> Result<u64>;

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>>;
}

/// The full set of repositories the services are built from
#[derive(Clone)]
pub struct Storage {
    pub posts: Arc<dyn PostRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub follows: Arc<dyn FollowRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub comments: Arc<dyn CommentRepository>,
}

impl Storage {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            posts: Arc::new(PgPostRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            follows: Arc::new(PgFollowRepository::new(pool.clone())),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            comments: Arc::new(PgCommentRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            posts: Arc::new(InMemoryPosts::new()),
            notifications: Arc::new(InMemoryNotifications::new()),
            follows: Arc::new(InMemoryFollows::new()),
            users: Arc::new(InMemoryUsers::new()),
            comments: Arc::new(InMemoryComments::new()),
        }
    }
}

/// Connect to Postgres and run pending migrations
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| crate::error::AppError::Database(format!("migration failed: {}", e)))?;

    Ok(pool)
}
