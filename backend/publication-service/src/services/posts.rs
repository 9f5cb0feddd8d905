/// Post service - lifecycle, moderation gate and read paths for posts
use super::dispatcher::{CollaborationEvent, NotificationDispatcher};
use crate::cache::PostCache;
use crate::db::{CommentRepository, PostRepository};
use crate::error::{AppError, Result};
use crate::lifecycle::{self, EditScope, TransitionError};
use crate::metrics;
use crate::models::{
    Actor, CategoryCount, CoAuthor, CoAuthorRole, NewPost, PageRequest, Post, PostChanges,
    PostStatus, StatusStamp, ViolationReport,
};
use crate::moderation::{Assessment, ModerationGate};
use crate::websocket::RealtimeEvent;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

const MAX_CO_AUTHORS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct CoAuthorInvite {
    pub user_id: Uuid,
    pub role: CoAuthorRole,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 50000))]
    pub content: String,
    #[validate(length(min = 1, max = 64))]
    pub category: Option<String>,
    #[serde(default)]
    pub co_authors: Vec<CoAuthorInvite>,
    /// Requested status; `draft` or `pending` for everyone, `published`
    /// only takes effect for an admin skipping moderation
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub skip_moderation: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 50000))]
    pub content: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub category: Option<String>,
    pub co_authors: Option<Vec<CoAuthorInvite>>,
    #[validate(length(max = 2000))]
    pub moderation_notes: Option<String>,
    pub status: Option<PostStatus>,
}

impl UpdatePostRequest {
    fn touches_content(&self) -> bool {
        self.title.is_some()
            || self.content.is_some()
            || self.category.is_some()
            || self.co_authors.is_some()
    }
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    comments: Arc<dyn CommentRepository>,
    gate: Arc<ModerationGate>,
    dispatcher: Arc<NotificationDispatcher>,
    cache: PostCache,
    notify_author_on_review: bool,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        comments: Arc<dyn CommentRepository>,
        gate: Arc<ModerationGate>,
        dispatcher: Arc<NotificationDispatcher>,
        cache: PostCache,
        notify_author_on_review: bool,
    ) -> Self {
        Self {
            posts,
            comments,
            gate,
            dispatcher,
            cache,
            notify_author_on_review,
        }
    }

    async fn load(&self, post_id: Uuid) -> Result<Post> {
        self.posts
            .get(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))
    }

    /// Create a post. Critical content is refused before anything is stored;
    /// anything the gate flags lands in `pending` whatever was requested.
    pub async fn create_post(&self, actor: &Actor, req: CreatePostRequest) -> Result<Post> {
        req.validate()?;
        if !actor.active || !actor.can_author() {
            return Err(AppError::Forbidden(
                "author capability required to create posts".to_string(),
            ));
        }

        let title = req.title.trim().to_string();
        if title.is_empty() || req.content.trim().is_empty() {
            return Err(AppError::Validation(
                "title and content must not be blank".to_string(),
            ));
        }
        let requested = req.status.unwrap_or(PostStatus::Pending);
        if matches!(requested, PostStatus::Rejected | PostStatus::Archived) {
            return Err(AppError::Validation(format!(
                "posts cannot be created as {}",
                requested
            )));
        }
        let co_authors = normalize_co_authors(actor.user_id, &req.co_authors, &[])?;

        let bypass = req.skip_moderation && actor.is_admin();
        if req.skip_moderation && !bypass {
            debug!(user_id = %actor.user_id, "skip_moderation ignored for non-admin");
        }

        let (report, held, alert) = if bypass {
            (ViolationReport::skipped(), false, false)
        } else {
            let assessment = self.gate.assess(&title, &req.content).await;
            if assessment.is_blocking() {
                return Err(self.block(None, actor.user_id, &title, &assessment).await);
            }
            let held = assessment.requires_review();
            let alert = assessment.is_alert();
            (assessment.report, held, alert)
        };

        let status = match (bypass, held, requested) {
            (true, _, PostStatus::Published) => PostStatus::Published,
            (_, false, PostStatus::Draft) => PostStatus::Draft,
            _ => PostStatus::Pending,
        };

        let now = Utc::now();
        let stamp = if status == PostStatus::Published {
            StatusStamp {
                moderated_by: Some(actor.user_id),
                moderated_at: Some(now),
                published_at: Some(now),
                moderation_notes: None,
            }
        } else {
            StatusStamp::default()
        };

        let post = self
            .posts
            .insert(NewPost {
                author_id: actor.user_id,
                title,
                content: req.content,
                category: req.category,
                co_authors,
                status,
                violation_report: report,
                stamp,
            })
            .await?;

        metrics::record_transition("new", status.as_str());
        info!(
            post_id = %post.id,
            author_id = %post.author_id,
            status = %post.status,
            severity = %post.violation_report.severity,
            bypass,
            "post created"
        );

        for co_author in &post.co_authors {
            self.dispatcher
                .collaboration(
                    CollaborationEvent::Invited,
                    &post,
                    actor.user_id,
                    co_author.user_id,
                )
                .await;
        }
        if alert {
            self.dispatcher
                .violation_alert(
                    Some(post.id),
                    post.author_id,
                    &post.title,
                    &post.violation_report,
                )
                .await;
        }
        if held && self.notify_author_on_review && requested != PostStatus::Pending {
            self.dispatcher.review_notice(&post).await;
        }
        self.after_transition(None, &post, actor.user_id, None).await;

        Ok(post)
    }

    /// Edit content or moderation notes, optionally followed by a status
    /// change. Content edits go back through the gate; a published post that
    /// picks up a flag is moved back to `pending`.
    pub async fn update_post(
        &self,
        actor: &Actor,
        post_id: Uuid,
        req: UpdatePostRequest,
    ) -> Result<Post> {
        req.validate()?;
        let post = self.load(post_id).await?;

        match lifecycle::edit_scope(&post, actor) {
            EditScope::None => {
                return Err(AppError::Forbidden(
                    "not permitted to edit this post".to_string(),
                ))
            }
            EditScope::ModerationOnly if req.touches_content() => {
                return Err(AppError::Forbidden(
                    "moderators may only change status and moderation notes".to_string(),
                ))
            }
            _ => {}
        }
        if req.moderation_notes.is_some() && !actor.is_staff() {
            return Err(AppError::Forbidden(
                "only moderators and admins may set moderation notes".to_string(),
            ));
        }

        let co_authors = match &req.co_authors {
            Some(invites) => Some(normalize_co_authors(
                post.author_id,
                invites,
                &post.co_authors,
            )?),
            None => None,
        };

        let mut changes = PostChanges {
            title: req.title.as_ref().map(|t| t.trim().to_string()),
            content: req.content.clone(),
            category: req.category.clone(),
            co_authors,
            moderation_notes: req.moderation_notes.clone(),
            violation_report: None,
            unmodified_since: None,
        };
        if changes.title.as_deref() == Some("") {
            return Err(AppError::Validation("title must not be blank".to_string()));
        }

        let mut held = false;
        if changes.title.is_some() || changes.content.is_some() {
            let title = changes.title.as_deref().unwrap_or(&post.title);
            let content = changes.content.as_deref().unwrap_or(&post.content);
            let assessment = self.gate.assess(title, content).await;
            if assessment.is_blocking() {
                return Err(self
                    .block(Some(post.id), post.author_id, title, &assessment)
                    .await);
            }
            if assessment.is_alert() {
                self.dispatcher
                    .violation_alert(Some(post.id), post.author_id, title, &assessment.report)
                    .await;
            }
            held = assessment.requires_review();
            changes.violation_report = Some(assessment.report);
        }

        // flagged text must never be readable on a published post
        let mut seen = post.updated_at;
        let demoted = held && post.status == PostStatus::Published;
        if demoted {
            seen = self.hold_for_review(&post).await?.updated_at;
        }
        // the co-author list was rebuilt from the copy read above
        if changes.co_authors.is_some() {
            changes.unmodified_since = Some(seen);
        }

        let updated = if changes.is_empty() {
            post.clone()
        } else {
            match self.posts.update_content(post_id, &changes).await? {
                Some(updated) => updated,
                None if changes.unmodified_since.is_some() => {
                    // NotFound if it was deleted meanwhile
                    self.load(post_id).await?;
                    return Err(AppError::Conflict(
                        "post changed while editing, reload and retry".to_string(),
                    ));
                }
                None => return Err(AppError::NotFound(format!("post {}", post_id))),
            }
        };

        if demoted {
            self.after_review_hold(&updated, actor.user_id).await;
        }

        if let Some(new_co_authors) = &changes.co_authors {
            self.notify_co_author_changes(&post, &updated, new_co_authors, actor.user_id)
                .await;
        }

        if post.status == PostStatus::Published || updated.status == PostStatus::Published {
            self.cache.invalidate_post(post_id);
        }
        if !changes.is_empty() {
            self.dispatcher
                .delivery()
                .to_post_viewers(post_id, RealtimeEvent::PostUpdated, summary(&updated))
                .await;
        }

        match req.status {
            Some(to) if to != updated.status => {
                self.change_status(actor, post_id, to, false, req.moderation_notes)
                    .await
            }
            _ => Ok(updated),
        }
    }

    /// Move a published post back to `pending` ahead of writing flagged
    /// content. Runs as the system, not as the editing actor.
    async fn hold_for_review(&self, post: &Post) -> Result<Post> {
        let pending = self
            .posts
            .transition(
                post.id,
                &[PostStatus::Published],
                PostStatus::Pending,
                &StatusStamp::default(),
            )
            .await?
            .ok_or_else(|| {
                AppError::Conflict("post status changed while editing, reload and retry".to_string())
            })?;
        self.cache.invalidate_post(post.id);
        Ok(pending)
    }

    async fn after_review_hold(&self, pending: &Post, actor_id: Uuid) {
        metrics::record_transition(PostStatus::Published.as_str(), "pending");
        warn!(
            post_id = %pending.id,
            severity = %pending.violation_report.severity,
            "published post flagged on edit, moved back to review"
        );
        if self.notify_author_on_review {
            self.dispatcher.review_notice(pending).await;
        }
        self.after_transition(Some(PostStatus::Published), pending, actor_id, None)
            .await;
    }

    /// Apply one transition of the lifecycle table.
    ///
    /// The conditional update uses the status this call read, so of two
    /// concurrent transitions on the same post exactly one applies and the
    /// other gets `Conflict`.
    pub async fn change_status(
        &self,
        actor: &Actor,
        post_id: Uuid,
        to: PostStatus,
        override_moderation: bool,
        notes: Option<String>,
    ) -> Result<Post> {
        let post = self.load(post_id).await?;
        lifecycle::authorize(&post, actor, to, override_moderation)?;

        let from = post.status;
        if from == to {
            debug!(post_id = %post_id, status = %to, "status unchanged");
            return Ok(post);
        }

        let notes = if actor.is_staff() { notes } else { None };
        let now = Utc::now();
        let stamp = match to {
            PostStatus::Published => StatusStamp {
                moderated_by: Some(actor.user_id),
                moderated_at: Some(now),
                published_at: Some(now),
                moderation_notes: notes.clone(),
            },
            PostStatus::Rejected => StatusStamp {
                moderated_by: Some(actor.user_id),
                moderated_at: Some(now),
                published_at: None,
                moderation_notes: notes.clone(),
            },
            _ => StatusStamp {
                moderation_notes: notes.clone(),
                ..Default::default()
            },
        };

        let updated = match self.posts.transition(post_id, &[from], to, &stamp).await? {
            Some(updated) => updated,
            None => {
                return match self.posts.get(post_id).await? {
                    Some(_) => {
                        warn!(post_id = %post_id, from = %from, to = %to, "lost transition race");
                        Err(TransitionError::Stale.into())
                    }
                    None => Err(AppError::NotFound(format!("post {}", post_id))),
                };
            }
        };

        metrics::record_transition(from.as_str(), to.as_str());
        info!(
            post_id = %post_id,
            from = %from,
            to = %to,
            actor = %actor.user_id,
            "post status changed"
        );

        self.after_transition(Some(from), &updated, actor.user_id, notes.as_deref())
            .await;
        Ok(updated)
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        post_id: Uuid,
        notes: Option<String>,
    ) -> Result<Post> {
        self.change_status(actor, post_id, PostStatus::Published, false, notes)
            .await
    }

    pub async fn reject(&self, actor: &Actor, post_id: Uuid, notes: Option<String>) -> Result<Post> {
        self.change_status(actor, post_id, PostStatus::Rejected, false, notes)
            .await
    }

    /// Side effects of a post entering its current status
    async fn after_transition(
        &self,
        from: Option<PostStatus>,
        post: &Post,
        actor_id: Uuid,
        notes: Option<&str>,
    ) {
        match post.status {
            PostStatus::Pending => {
                self.dispatcher.post_submitted(post).await;
            }
            PostStatus::Published => {
                self.cache.invalidate_post(post.id);
                self.dispatcher.post_published(post, actor_id).await;
                self.dispatcher
                    .delivery()
                    .to_everyone(RealtimeEvent::PostNew, summary(post))
                    .await;
            }
            PostStatus::Rejected => {
                self.dispatcher.post_rejected(post, actor_id, notes).await;
            }
            PostStatus::Draft | PostStatus::Archived => {}
        }

        if from == Some(PostStatus::Published) && post.status != PostStatus::Published {
            self.cache.invalidate_post(post.id);
            self.dispatcher
                .delivery()
                .to_post_viewers(post.id, RealtimeEvent::PostUpdated, summary(post))
                .await;
        }
    }

    /// Refuse critical content: alert staff, then build the caller's error
    async fn block(
        &self,
        post_id: Option<Uuid>,
        author_id: Uuid,
        title: &str,
        assessment: &Assessment,
    ) -> AppError {
        warn!(
            post_id = ?post_id,
            author_id = %author_id,
            violations = ?assessment.report.violations,
            "critical content blocked"
        );
        self.dispatcher
            .violation_alert(post_id, author_id, title, &assessment.report)
            .await;

        let tags = if assessment.report.violations.is_empty() {
            "critical severity".to_string()
        } else {
            assessment.report.violations.join(", ")
        };
        AppError::ContentViolation(tags)
    }

    async fn notify_co_author_changes(
        &self,
        before: &Post,
        after: &Post,
        co_authors: &[CoAuthor],
        actor_id: Uuid,
    ) {
        let previous: HashSet<Uuid> = before.co_authors.iter().map(|c| c.user_id).collect();
        let current: HashSet<Uuid> = co_authors.iter().map(|c| c.user_id).collect();

        for added in current.difference(&previous) {
            self.dispatcher
                .collaboration(CollaborationEvent::Invited, after, actor_id, *added)
                .await;
        }
        for removed in previous.difference(&current) {
            self.dispatcher
                .collaboration(CollaborationEvent::Removed, after, actor_id, *removed)
                .await;
        }
    }

    /// Accept or decline a pending co-author invitation
    pub async fn respond_to_invite(
        &self,
        actor: &Actor,
        post_id: Uuid,
        accept: bool,
    ) -> Result<Post> {
        let post = self.load(post_id).await?;
        let invite = post
            .co_author(actor.user_id)
            .ok_or_else(|| AppError::NotFound("no collaboration invite for this post".to_string()))?;
        if invite.accepted {
            return Err(AppError::Conflict("invite already accepted".to_string()));
        }

        let updated = self
            .posts
            .answer_invite(post_id, actor.user_id, accept)
            .await?
            .ok_or_else(|| AppError::Conflict("invite no longer open".to_string()))?;

        let event = if accept {
            CollaborationEvent::Accepted
        } else {
            CollaborationEvent::Declined
        };
        self.dispatcher
            .collaboration(event, &updated, actor.user_id, updated.author_id)
            .await;
        if updated.status == PostStatus::Published {
            self.cache.invalidate_post(post_id);
        }
        Ok(updated)
    }

    /// Delete a post and its comments
    pub async fn delete_post(&self, actor: &Actor, post_id: Uuid) -> Result<()> {
        let post = self.load(post_id).await?;
        if !lifecycle::can_delete(&post, actor) {
            return Err(AppError::Forbidden(
                "not permitted to delete this post".to_string(),
            ));
        }

        let comments = self.comments.delete_for_post(post_id).await?;
        if !self.posts.delete(post_id).await? {
            return Err(AppError::NotFound(format!("post {}", post_id)));
        }
        info!(post_id = %post_id, actor = %actor.user_id, comments, "post deleted");

        let payload = json!({ "post_id": post_id });
        let delivery = self.dispatcher.delivery();
        if post.status == PostStatus::Published {
            self.cache.invalidate_post(post_id);
            delivery.to_everyone(RealtimeEvent::PostDeleted, payload).await;
        } else {
            delivery
                .to_post_viewers(post_id, RealtimeEvent::PostDeleted, payload)
                .await;
        }
        Ok(())
    }

    /// Fetch a post the viewer may see. Posts the viewer may not see are
    /// reported as missing.
    pub async fn get_post(&self, viewer: Option<&Actor>, post_id: Uuid) -> Result<Post> {
        if let Some(post) = self.cache.get_single(post_id) {
            return Ok(post);
        }

        let post = self.load(post_id).await?;
        if !lifecycle::can_view(&post, viewer) {
            return Err(AppError::NotFound(format!("post {}", post_id)));
        }

        if post.status == PostStatus::Published {
            if let Err(e) = self.cache.put_single(&post) {
                debug!(post_id = %post_id, "post cache set failed: {}", e);
            }
        }
        Ok(post)
    }

    pub async fn list_published(
        &self,
        page: PageRequest,
        category: Option<&str>,
    ) -> Result<Vec<Post>> {
        let page = page.normalized();
        if let Some(posts) = self.cache.get_list(page, category) {
            return Ok(posts);
        }

        let posts = self.posts.list_published(page, category).await?;
        if let Err(e) = self.cache.put_list(page, category, &posts) {
            debug!("post list cache set failed: {}", e);
        }
        Ok(posts)
    }

    pub async fn category_counts(&self) -> Result<Vec<CategoryCount>> {
        if let Some(counts) = self.cache.get_categories() {
            return Ok(counts);
        }

        let counts = self.posts.category_counts().await?;
        if let Err(e) = self.cache.put_categories(&counts) {
            debug!("category cache set failed: {}", e);
        }
        Ok(counts)
    }

    /// Pending posts for the moderation staff, most severe first
    pub async fn moderation_queue(&self, actor: &Actor, page: PageRequest) -> Result<Vec<Post>> {
        if !actor.active || !actor.is_staff() {
            return Err(AppError::Forbidden(
                "moderation queue is restricted to moderators and admins".to_string(),
            ));
        }
        self.posts.moderation_queue(page.normalized()).await
    }
}

/// Validate requested co-authors: unique, never the author, bounded. Users
/// already listed keep their acceptance; new entries start unaccepted.
fn normalize_co_authors(
    author_id: Uuid,
    invites: &[CoAuthorInvite],
    existing: &[CoAuthor],
) -> Result<Vec<CoAuthor>> {
    if invites.len() > MAX_CO_AUTHORS {
        return Err(AppError::Validation(format!(
            "at most {} co-authors are allowed",
            MAX_CO_AUTHORS
        )));
    }

    let mut seen = HashSet::new();
    invites
        .iter()
        .map(|invite| {
            if invite.user_id == author_id {
                return Err(AppError::Validation(
                    "the author cannot be a co-author".to_string(),
                ));
            }
            if !seen.insert(invite.user_id) {
                return Err(AppError::Validation(format!(
                    "duplicate co-author {}",
                    invite.user_id
                )));
            }
            let accepted = existing
                .iter()
                .any(|c| c.user_id == invite.user_id && c.accepted);
            Ok(CoAuthor {
                user_id: invite.user_id,
                role: invite.role,
                accepted,
            })
        })
        .collect()
}

/// Compact post payload for real-time events
fn summary(post: &Post) -> Value {
    json!({
        "post_id": post.id,
        "author_id": post.author_id,
        "title": post.title,
        "category": post.category,
        "status": post.status,
        "published_at": post.published_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_co_authors_exclude_author_and_duplicates() {
        let author = Uuid::new_v4();
        let other = Uuid::new_v4();

        let invite = |user_id| CoAuthorInvite {
            user_id,
            role: CoAuthorRole::Editor,
        };

        assert!(normalize_co_authors(author, &[invite(author)], &[]).is_err());
        assert!(normalize_co_authors(author, &[invite(other), invite(other)], &[]).is_err());

        let list = normalize_co_authors(author, &[invite(other)], &[]).unwrap();
        assert_eq!(list.len(), 1);
        assert!(!list[0].accepted);
    }

    #[test]
    fn test_existing_acceptance_is_kept() {
        let author = Uuid::new_v4();
        let editor = Uuid::new_v4();
        let existing = vec![CoAuthor {
            user_id: editor,
            role: CoAuthorRole::Contributor,
            accepted: true,
        }];

        let list = normalize_co_authors(
            author,
            &[CoAuthorInvite {
                user_id: editor,
                role: CoAuthorRole::Editor,
            }],
            &existing,
        )
        .unwrap();
        assert!(list[0].accepted);
        assert_eq!(list[0].role, CoAuthorRole::Editor);
    }

    #[test]
    fn test_update_request_content_detection() {
        let notes_only = UpdatePostRequest {
            moderation_notes: Some("looks fine".into()),
            ..Default::default()
        };
        assert!(!notes_only.touches_content());

        let retitle = UpdatePostRequest {
            title: Some("New".into()),
            ..Default::default()
        };
        assert!(retitle.touches_content());
    }
}
