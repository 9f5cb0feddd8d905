//! In-memory repository adapters.
//!
//! Used for local runs (`STORAGE_BACKEND=memory`) and the test suites. Each
//! conditional update happens inside a single map-entry (or lock) critical
//! section so the adapters give the same guarantees as the SQL statements
//! in the Postgres adapters.

use super::{CommentRepository, FollowRepository, NotificationRepository, PostRepository, UserDirectory};
use crate::error::Result;
use crate::models::{
    BulkInsert, Capability, CategoryCount, Comment, NewComment, NewNotification, NewPost,
    Notification, NotificationFilter, NotificationType, PageRequest, Post, PostChanges, PostStatus,
    Reaction, ReactionOp, ReactionOutcome, StatusStamp, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

fn page_slice<T>(items: Vec<T>, page: PageRequest) -> Vec<T> {
    let page = page.normalized();
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect()
}

/// Posts keyed by id. `DashMap::get_mut` holds the shard lock for the whole
/// check-and-set, which is what makes `transition`, `react` and
/// `increment_views` atomic.
#[derive(Default)]
pub struct InMemoryPosts {
    posts: DashMap<Uuid, Post>,
}

impl InMemoryPosts {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PostRepository for InMemoryPosts {
    async fn insert(&self, new_post: NewPost) -> Result<Post> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            author_id: new_post.author_id,
            title: new_post.title,
            content: new_post.content,
            category: new_post.category,
            status: new_post.status,
            co_authors: new_post.co_authors,
            violation_report: new_post.violation_report,
            moderated_by: new_post.stamp.moderated_by,
            moderated_at: new_post.stamp.moderated_at,
            moderation_notes: new_post.stamp.moderation_notes,
            likes: BTreeSet::new(),
            dislikes: BTreeSet::new(),
            views: 0,
            published_at: new_post.stamp.published_at,
            created_at: now,
            updated_at: now,
        };

        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get(&self, post_id: Uuid) -> Result<Option<Post>> {
        Ok(self.posts.get(&post_id).map(|p| p.clone()))
    }

    async fn update_content(&self, post_id: Uuid, changes: &PostChanges) -> Result<Option<Post>> {
        let Some(mut post) = self.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        if matches!(changes.unmodified_since, Some(seen) if seen != post.updated_at) {
            return Ok(None);
        }

        if let Some(title) = &changes.title {
            post.title = title.clone();
        }
        if let Some(content) = &changes.content {
            post.content = content.clone();
        }
        if let Some(category) = &changes.category {
            post.category = Some(category.clone());
        }
        if let Some(co_authors) = &changes.co_authors {
            post.co_authors = co_authors.clone();
        }
        if let Some(notes) = &changes.moderation_notes {
            post.moderation_notes = Some(notes.clone());
        }
        if let Some(report) = &changes.violation_report {
            post.violation_report = report.clone();
        }
        post.updated_at = Utc::now();

        Ok(Some(post.clone()))
    }

    async fn answer_invite(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        accept: bool,
    ) -> Result<Option<Post>> {
        let Some(mut post) = self.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        let Some(index) = post
            .co_authors
            .iter()
            .position(|c| c.user_id == user_id && !c.accepted)
        else {
            return Ok(None);
        };

        if accept {
            post.co_authors[index].accepted = true;
        } else {
            post.co_authors.remove(index);
        }
        post.updated_at = Utc::now();

        Ok(Some(post.clone()))
    }

    async fn transition(
        &self,
        post_id: Uuid,
        expected: &[PostStatus],
        to: PostStatus,
        stamp: &StatusStamp,
    ) -> Result<Option<Post>> {
        let Some(mut post) = self.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        if !expected.contains(&post.status) {
            return Ok(None);
        }

        post.status = to;
        if stamp.moderated_by.is_some() {
            post.moderated_by = stamp.moderated_by;
        }
        if stamp.moderated_at.is_some() {
            post.moderated_at = stamp.moderated_at;
        }
        if stamp.published_at.is_some() {
            post.published_at = stamp.published_at;
        }
        if stamp.moderation_notes.is_some() {
            post.moderation_notes = stamp.moderation_notes.clone();
        }
        post.updated_at = Utc::now();

        Ok(Some(post.clone()))
    }

    async fn delete(&self, post_id: Uuid) -> Result<bool> {
        Ok(self.posts.remove(&post_id).is_some())
    }

    async fn react(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        op: ReactionOp,
    ) -> Result<Option<ReactionOutcome>> {
        let Some(mut entry) = self.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        let post = &mut *entry;

        let changed = match op {
            ReactionOp::Add(Reaction::Like) => {
                post.dislikes.remove(&user_id);
                post.likes.insert(user_id)
            }
            ReactionOp::Add(Reaction::Dislike) => {
                post.likes.remove(&user_id);
                post.dislikes.insert(user_id)
            }
            ReactionOp::Remove(Reaction::Like) => post.likes.remove(&user_id),
            ReactionOp::Remove(Reaction::Dislike) => post.dislikes.remove(&user_id),
        };

        Ok(Some(ReactionOutcome {
            changed,
            liked: post.likes.contains(&user_id),
            disliked: post.dislikes.contains(&user_id),
            likes: post.likes.len() as i64,
            dislikes: post.dislikes.len() as i64,
        }))
    }

    async fn increment_views(&self, post_id: Uuid) -> Result<Option<i64>> {
        Ok(self.posts.get_mut(&post_id).map(|mut post| {
            post.views += 1;
            post.views
        }))
    }

    async fn list_published(
        &self,
        page: PageRequest,
        category: Option<&str>,
    ) -> Result<Vec<Post>> {
        let mut published: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| p.status == PostStatus::Published)
            .filter(|p| match category {
                Some(c) => p.category.as_deref() == Some(c),
                None => true,
            })
            .map(|p| p.clone())
            .collect();

        published.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));
        Ok(page_slice(published, page))
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for post in self.posts.iter() {
            if post.status != PostStatus::Published {
                continue;
            }
            if let Some(category) = &post.category {
                *counts.entry(category.clone()).or_default() += 1;
            }
        }

        let mut counts: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        Ok(counts)
    }

    async fn moderation_queue(&self, page: PageRequest) -> Result<Vec<Post>> {
        let mut pending: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| p.status == PostStatus::Pending)
            .map(|p| p.clone())
            .collect();

        pending.sort_by(|a, b| {
            b.violation_report
                .severity
                .rank()
                .cmp(&a.violation_report.severity.rank())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(page_slice(pending, page))
    }
}

/// Notifications behind one lock: the outstanding-duplicate check and the
/// insert it guards must not interleave.
#[derive(Default)]
pub struct InMemoryNotifications {
    records: RwLock<Vec<Notification>>,
}

impl InMemoryNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    fn outstanding<'a>(
        records: &'a [Notification],
        recipient_id: Uuid,
        notification_type: NotificationType,
        related_post: Option<Uuid>,
    ) -> Option<&'a Notification> {
        if !notification_type.is_deduplicated() {
            return None;
        }
        let related_post = related_post?;
        records.iter().find(|n| {
            !n.read
                && n.recipient_id == recipient_id
                && n.notification_type == notification_type
                && n.related_post == Some(related_post)
        })
    }

    fn insert_locked(
        records: &mut Vec<Notification>,
        new: NewNotification,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        if Self::outstanding(records, new.recipient_id, new.notification_type, new.related_post)
            .is_some()
        {
            return None;
        }
        let notification = new.into_notification(Uuid::new_v4(), now);
        records.push(notification.clone());
        Some(notification)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotifications {
    async fn insert(&self, notification: NewNotification) -> Result<Option<Notification>> {
        let mut records = self.records.write().await;
        Ok(Self::insert_locked(&mut records, notification, Utc::now()))
    }

    async fn insert_many(&self, batch: Vec<NewNotification>) -> Result<BulkInsert> {
        let mut records = self.records.write().await;
        let now = Utc::now();
        let mut result = BulkInsert::default();

        for new in batch {
            let recipient_id = new.recipient_id;
            match Self::insert_locked(&mut records, new, now) {
                Some(created) => result.created.push(created),
                None => result.skipped.push(recipient_id),
            }
        }

        Ok(result)
    }

    async fn find_outstanding(
        &self,
        recipient_id: Uuid,
        notification_type: NotificationType,
        related_post: Uuid,
    ) -> Result<Option<Notification>> {
        let records = self.records.read().await;
        Ok(
            Self::outstanding(&records, recipient_id, notification_type, Some(related_post))
                .cloned(),
        )
    }

    async fn list(
        &self,
        recipient_id: Uuid,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        let records = self.records.read().await;
        let mut matching: Vec<Notification> = records
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| !filter.unread_only || !n.read)
            .filter(|n| match filter.notification_type {
                Some(t) => n.notification_type == t,
                None => true,
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let limit = if filter.limit > 0 {
            filter.limit as usize
        } else {
            usize::MAX
        };
        Ok(matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(limit)
            .collect())
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .count() as i64)
    }

    async fn mark_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        match records
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient_id == recipient_id)
        {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        let mut records = self.records.write().await;
        let mut updated = 0;
        for n in records
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
        {
            n.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|n| !(n.id == notification_id && n.recipient_id == recipient_id));
        Ok(records.len() < before)
    }

    async fn delete_all(&self, recipient_id: Uuid) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|n| n.recipient_id != recipient_id);
        Ok((before - records.len()) as u64)
    }
}

/// Follow edges keyed by `(follower, followee)`
#[derive(Default)]
pub struct InMemoryFollows {
    edges: DashMap<(Uuid, Uuid), DateTime<Utc>>,
}

impl InMemoryFollows {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FollowRepository for InMemoryFollows {
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        let mut created = false;
        self.edges.entry((follower_id, followee_id)).or_insert_with(|| {
            created = true;
            Utc::now()
        });
        Ok(created)
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        Ok(self.edges.remove(&(follower_id, followee_id)).is_some())
    }

    async fn followers_of(&self, followee_id: Uuid) -> Result<Vec<Uuid>> {
        let mut followers: Vec<(DateTime<Utc>, Uuid)> = self
            .edges
            .iter()
            .filter(|e| e.key().1 == followee_id)
            .map(|e| (*e.value(), e.key().0))
            .collect();
        followers.sort();
        Ok(followers.into_iter().map(|(_, id)| id).collect())
    }

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        Ok(self.edges.contains_key(&(follower_id, followee_id)))
    }
}

#[derive(Default)]
pub struct InMemoryUsers {
    users: DashMap<Uuid, UserRecord>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn register(&self, user: UserRecord) -> Result<()> {
        self.users.insert(user.id, user);
        Ok(())
    }

    async fn active_with_capabilities(&self, capabilities: &[Capability]) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self
            .users
            .iter()
            .filter(|u| u.active && u.has_any(capabilities))
            .map(|u| u.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Default)]
pub struct InMemoryComments {
    comments: DashMap<Uuid, Comment>,
}

impl InMemoryComments {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommentRepository for InMemoryComments {
    async fn create(&self, new: NewComment) -> Result<Comment> {
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: new.post_id,
            author_id: new.author_id,
            parent_id: new.parent_id,
            content: new.content,
            created_at: now,
            updated_at: now,
        };
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        Ok(self.comments.get(&comment_id).map(|c| c.clone()))
    }

    async fn update(&self, comment_id: Uuid, content: &str) -> Result<Option<Comment>> {
        Ok(self.comments.get_mut(&comment_id).map(|mut c| {
            c.content = content.to_string();
            c.updated_at = Utc::now();
            c.clone()
        }))
    }

    async fn delete(&self, comment_id: Uuid) -> Result<bool> {
        if self.comments.remove(&comment_id).is_none() {
            return Ok(false);
        }

        // replies go with their parent, like the FK cascade in Postgres
        let mut orphans = vec![comment_id];
        while let Some(parent) = orphans.pop() {
            let children: Vec<Uuid> = self
                .comments
                .iter()
                .filter(|c| c.parent_id == Some(parent))
                .map(|c| c.id)
                .collect();
            for child in children {
                self.comments.remove(&child);
                orphans.push(child);
            }
        }
        Ok(true)
    }

    async fn delete_for_post(&self, post_id: Uuid) -> Result<u64> {
        let before = self.comments.len();
        self.comments.retain(|_, c| c.post_id != post_id);
        Ok((before - self.comments.len()) as u64)
    }

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .map(|c| c.clone())
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }
}
