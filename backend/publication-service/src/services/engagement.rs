use super::dispatcher::NotificationDispatcher;
use crate::cache::PostCache;
use crate::db::PostRepository;
use crate::error::{AppError, Result};
use crate::models::{Actor, EngagementCounts, Post, PostStatus, Reaction, ReactionOp, ReactionOutcome};
use crate::websocket::RealtimeEvent;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Result of a view request
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ViewOutcome {
    pub counted: bool,
    pub views: i64,
}

/// Likes, dislikes and view counting on published posts
pub struct EngagementService {
    posts: Arc<dyn PostRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    cache: PostCache,
    view_window: Duration,
}

impl EngagementService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        cache: PostCache,
        view_window: Duration,
    ) -> Self {
        Self {
            posts,
            dispatcher,
            cache,
            view_window,
        }
    }

    async fn published(&self, post_id: Uuid) -> Result<Post> {
        match self.posts.get(post_id).await? {
            Some(post) if post.status == PostStatus::Published => Ok(post),
            _ => Err(AppError::NotFound(format!("post {}", post_id))),
        }
    }

    pub async fn like(&self, actor: &Actor, post_id: Uuid) -> Result<ReactionOutcome> {
        self.react(actor, post_id, ReactionOp::Add(Reaction::Like))
            .await
    }

    pub async fn unlike(&self, actor: &Actor, post_id: Uuid) -> Result<ReactionOutcome> {
        self.react(actor, post_id, ReactionOp::Remove(Reaction::Like))
            .await
    }

    pub async fn dislike(&self, actor: &Actor, post_id: Uuid) -> Result<ReactionOutcome> {
        self.react(actor, post_id, ReactionOp::Add(Reaction::Dislike))
            .await
    }

    pub async fn undislike(&self, actor: &Actor, post_id: Uuid) -> Result<ReactionOutcome> {
        self.react(actor, post_id, ReactionOp::Remove(Reaction::Dislike))
            .await
    }

    /// Idempotent reaction update. Only a call that actually changes the
    /// stored sets notifies the author or emits an update.
    pub async fn react(
        &self,
        actor: &Actor,
        post_id: Uuid,
        op: ReactionOp,
    ) -> Result<ReactionOutcome> {
        if !actor.active {
            return Err(AppError::Forbidden("account is not active".to_string()));
        }
        let post = self.published(post_id).await?;

        let outcome = self
            .posts
            .react(post_id, actor.user_id, op)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        if !outcome.changed {
            debug!(post_id = %post_id, user_id = %actor.user_id, ?op, "reaction unchanged");
            return Ok(outcome);
        }

        if let ReactionOp::Add(reaction) = op {
            self.dispatcher
                .reaction(&post, actor.user_id, reaction)
                .await;
        }

        self.cache.invalidate_single(post_id);
        self.dispatcher
            .delivery()
            .to_post_viewers(
                post_id,
                RealtimeEvent::EngagementUpdate,
                json!({
                    "post_id": post_id,
                    "likes": outcome.likes,
                    "dislikes": outcome.dislikes,
                }),
            )
            .await;

        Ok(outcome)
    }

    /// Count a view at most once per viewer token within the window. Nothing
    /// is counted unless the caller asked to track, and authors never count
    /// their own views.
    pub async fn record_view(
        &self,
        post_id: Uuid,
        viewer: Option<&Actor>,
        viewer_token: &str,
        track: bool,
    ) -> Result<ViewOutcome> {
        let post = self.published(post_id).await?;
        let unchanged = ViewOutcome {
            counted: false,
            views: post.views,
        };

        if !track {
            return Ok(unchanged);
        }
        if viewer.map(|v| post.is_author(v.user_id)).unwrap_or(false) {
            return Ok(unchanged);
        }
        if !self.cache.claim_view(post_id, viewer_token, self.view_window) {
            return Ok(unchanged);
        }

        let views = self
            .posts
            .increment_views(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        self.cache.invalidate_single(post_id);
        self.dispatcher
            .delivery()
            .to_post_viewers(
                post_id,
                RealtimeEvent::EngagementUpdate,
                json!({ "post_id": post_id, "views": views }),
            )
            .await;

        Ok(ViewOutcome {
            counted: true,
            views,
        })
    }

    pub async fn counts(&self, post_id: Uuid) -> Result<EngagementCounts> {
        Ok(self.published(post_id).await?.engagement())
    }
}
