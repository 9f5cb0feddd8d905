/// Comment service - comments and replies on published posts
use super::dispatcher::NotificationDispatcher;
use crate::db::{CommentRepository, PostRepository};
use crate::error::{AppError, Result};
use crate::lifecycle;
use crate::models::{Actor, Comment, NewComment, Post, PostStatus};
use crate::websocket::RealtimeEvent;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        posts: Arc<dyn PostRepository>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            comments,
            posts,
            dispatcher,
        }
    }

    async fn load_comment(&self, comment_id: Uuid) -> Result<Comment> {
        self.comments
            .get(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("comment {}", comment_id)))
    }

    async fn published_post(&self, post_id: Uuid) -> Result<Post> {
        match self.posts.get(post_id).await? {
            Some(post) if post.status == PostStatus::Published => Ok(post),
            _ => Err(AppError::NotFound(format!("post {}", post_id))),
        }
    }

    pub async fn create(
        &self,
        actor: &Actor,
        post_id: Uuid,
        req: CreateCommentRequest,
    ) -> Result<Comment> {
        req.validate()?;
        if !actor.active {
            return Err(AppError::Forbidden("account is not active".to_string()));
        }
        let content = req.content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("comment must not be blank".to_string()));
        }

        let post = self.published_post(post_id).await?;
        let parent = match req.parent_id {
            Some(parent_id) => {
                let parent = self.load_comment(parent_id).await?;
                if parent.post_id != post_id {
                    return Err(AppError::Validation(
                        "parent comment belongs to another post".to_string(),
                    ));
                }
                Some(parent)
            }
            None => None,
        };

        let comment = self
            .comments
            .create(NewComment {
                post_id,
                author_id: actor.user_id,
                parent_id: req.parent_id,
                content: content.to_string(),
            })
            .await?;

        info!(
            comment_id = %comment.id,
            post_id = %post_id,
            reply = parent.is_some(),
            "comment created"
        );

        match &parent {
            Some(parent) => {
                self.dispatcher.reply(&post, parent, &comment).await;
            }
            None => {
                self.dispatcher.comment(&post, &comment).await;
            }
        }

        self.dispatcher
            .delivery()
            .to_post_viewers(post_id, RealtimeEvent::CommentNew, json!(comment))
            .await;

        Ok(comment)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        comment_id: Uuid,
        req: UpdateCommentRequest,
    ) -> Result<Comment> {
        req.validate()?;
        let comment = self.load_comment(comment_id).await?;
        if !actor.active || comment.author_id != actor.user_id {
            return Err(AppError::Forbidden(
                "only the author may edit a comment".to_string(),
            ));
        }
        let content = req.content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("comment must not be blank".to_string()));
        }

        let updated = self
            .comments
            .update(comment_id, content)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("comment {}", comment_id)))?;

        self.dispatcher
            .delivery()
            .to_post_viewers(
                updated.post_id,
                RealtimeEvent::CommentUpdated,
                json!(updated),
            )
            .await;
        Ok(updated)
    }

    /// Delete a comment and its replies. Authors and moderation staff only.
    pub async fn delete(&self, actor: &Actor, comment_id: Uuid) -> Result<()> {
        let comment = self.load_comment(comment_id).await?;
        if !actor.active || (comment.author_id != actor.user_id && !actor.is_staff()) {
            return Err(AppError::Forbidden(
                "not permitted to delete this comment".to_string(),
            ));
        }

        if !self.comments.delete(comment_id).await? {
            return Err(AppError::NotFound(format!("comment {}", comment_id)));
        }

        self.dispatcher
            .delivery()
            .to_post_viewers(
                comment.post_id,
                RealtimeEvent::CommentDeleted,
                json!({ "comment_id": comment_id, "post_id": comment.post_id }),
            )
            .await;
        Ok(())
    }

    pub async fn list_for_post(&self, viewer: Option<&Actor>, post_id: Uuid) -> Result<Vec<Comment>> {
        let post = self
            .posts
            .get(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;
        if !lifecycle::can_view(&post, viewer) {
            return Err(AppError::NotFound(format!("post {}", post_id)));
        }
        self.comments.list_for_post(post_id).await
    }
}
