use super::delivery::NotificationDelivery;
use crate::db::{FollowRepository, NotificationRepository, UserDirectory};
use crate::error::Result;
use crate::metrics;
use crate::models::{
    Capability, Comment, FanOutReport, NewNotification, Notification, NotificationType, Post,
    Reaction, ViolationReport,
};
use crate::websocket::RealtimeEvent;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Collaboration lifecycle events that notify one affected user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaborationEvent {
    Invited,
    Accepted,
    Declined,
    Removed,
}

impl CollaborationEvent {
    fn notification_type(&self) -> NotificationType {
        match self {
            CollaborationEvent::Invited => NotificationType::CollaborationInvite,
            CollaborationEvent::Accepted => NotificationType::CollaborationAccepted,
            CollaborationEvent::Declined => NotificationType::CollaborationDeclined,
            CollaborationEvent::Removed => NotificationType::CollaborationRemoved,
        }
    }
}

/// Resolves recipient sets for pipeline events, persists one record per
/// recipient and hands what was created to the delivery layer.
///
/// Fan-out never fails the caller: records that could not be written are
/// reported in the returned `FanOutReport` and logged.
pub struct NotificationDispatcher {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserDirectory>,
    follows: Arc<dyn FollowRepository>,
    delivery: Arc<NotificationDelivery>,
}

impl NotificationDispatcher {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserDirectory>,
        follows: Arc<dyn FollowRepository>,
        delivery: Arc<NotificationDelivery>,
    ) -> Self {
        Self {
            notifications,
            users,
            follows,
            delivery,
        }
    }

    pub fn delivery(&self) -> &Arc<NotificationDelivery> {
        &self.delivery
    }

    /// Persist and push a single notification. `None` means an identical
    /// outstanding record already exists.
    pub async fn create(&self, notification: NewNotification) -> Result<Option<Notification>> {
        let notification_type = notification.notification_type;
        let created = self.notifications.insert(notification).await?;

        if let Some(created) = &created {
            metrics::record_notifications_created(notification_type.as_str(), 1);
            self.delivery.deliver(created).await;
        }
        Ok(created)
    }

    /// One record per distinct recipient, written in a single bulk insert
    pub async fn fan_out<F>(
        &self,
        notification_type: NotificationType,
        recipients: &[Uuid],
        template: F,
    ) -> FanOutReport
    where
        F: Fn(Uuid) -> NewNotification,
    {
        let mut seen = HashSet::new();
        let batch: Vec<NewNotification> = recipients
            .iter()
            .filter(|r| seen.insert(**r))
            .map(|r| template(*r))
            .collect();

        if batch.is_empty() {
            return FanOutReport::default();
        }

        let attempted = batch.len();
        let report: FanOutReport = match self.notifications.insert_many(batch).await {
            Ok(bulk) => bulk.into(),
            Err(e) => {
                let reason = e.to_string();
                FanOutReport {
                    failed: seen.iter().map(|r| (*r, reason.clone())).collect(),
                    ..Default::default()
                }
            }
        };

        metrics::record_notifications_created(notification_type.as_str(), report.created_count());
        if report.is_partial() {
            metrics::record_fanout_failures(notification_type.as_str(), report.failed.len());
            error!(
                event = notification_type.as_str(),
                recipients = attempted,
                failed = report.failed.len(),
                failed_recipients = ?report.failed.iter().map(|(r, _)| r).collect::<Vec<_>>(),
                "notification fan-out partially failed"
            );
        } else {
            info!(
                event = notification_type.as_str(),
                recipients = attempted,
                created = report.created_count(),
                skipped = report.skipped.len(),
                "notification fan-out complete"
            );
        }

        self.delivery.deliver_report(&report).await;
        report
    }

    async fn resolve(&self, capabilities: &[Capability]) -> Vec<Uuid> {
        match self.users.active_with_capabilities(capabilities).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "failed to resolve recipients by capability");
                Vec::new()
            }
        }
    }

    /// New pending post: every active moderator and admin
    pub async fn post_submitted(&self, post: &Post) -> FanOutReport {
        let staff = self.resolve(&Capability::STAFF).await;
        let report = self
            .fan_out(NotificationType::PendingReview, &staff, |recipient| {
                NewNotification::new(
                    recipient,
                    NotificationType::PendingReview,
                    "Post awaiting review",
                    format!("\"{}\" is waiting for moderation", post.title),
                )
                .sender(post.author_id)
                .post(post.id)
            })
            .await;

        self.delivery
            .to_staff(
                RealtimeEvent::ModerationNew,
                json!({
                    "post_id": post.id,
                    "author_id": post.author_id,
                    "title": post.title,
                    "severity": post.violation_report.severity,
                }),
            )
            .await;
        report
    }

    /// Published post: approval notice to the author, publication notice to
    /// each of the author's followers.
    pub async fn post_published(&self, post: &Post, moderator_id: Uuid) -> FanOutReport {
        let mut report = self
            .fan_out(NotificationType::PostApproved, &[post.author_id], |author| {
                NewNotification::new(
                    author,
                    NotificationType::PostApproved,
                    "Post approved",
                    format!("\"{}\" has been approved and is now live", post.title),
                )
                .sender(moderator_id)
                .post(post.id)
            })
            .await;

        let followers: Vec<Uuid> = match self.follows.followers_of(post.author_id).await {
            Ok(followers) => followers
                .into_iter()
                .filter(|f| *f != post.author_id)
                .collect(),
            Err(e) => {
                error!(post_id = %post.id, error = %e, "failed to resolve followers");
                Vec::new()
            }
        };
        report.merge(
            self.fan_out(NotificationType::PostPublished, &followers, |follower| {
                NewNotification::new(
                    follower,
                    NotificationType::PostPublished,
                    "New post",
                    format!("A new post was published: \"{}\"", post.title),
                )
                .sender(post.author_id)
                .post(post.id)
            })
            .await,
        );

        self.delivery
            .to_staff(
                RealtimeEvent::ModerationApproved,
                json!({ "post_id": post.id, "moderator_id": moderator_id }),
            )
            .await;
        report
    }

    pub async fn post_rejected(
        &self,
        post: &Post,
        moderator_id: Uuid,
        notes: Option<&str>,
    ) -> FanOutReport {
        let message = match notes {
            Some(notes) if !notes.trim().is_empty() => {
                format!("\"{}\" was not approved: {}", post.title, notes)
            }
            _ => format!("\"{}\" was not approved", post.title),
        };
        let report = self
            .fan_out(NotificationType::PostRejected, &[post.author_id], |author| {
                NewNotification::new(
                    author,
                    NotificationType::PostRejected,
                    "Post rejected",
                    message.clone(),
                )
                .sender(moderator_id)
                .post(post.id)
                .high_priority()
            })
            .await;

        self.delivery
            .to_staff(
                RealtimeEvent::ModerationRejected,
                json!({ "post_id": post.id, "moderator_id": moderator_id, "notes": notes }),
            )
            .await;
        report
    }

    /// First-time like or dislike; nothing when the actor owns the post
    pub async fn reaction(&self, post: &Post, actor_id: Uuid, reaction: Reaction) -> FanOutReport {
        if actor_id == post.author_id {
            return FanOutReport::default();
        }

        let (notification_type, verb) = match reaction {
            Reaction::Like => (NotificationType::Like, "liked"),
            Reaction::Dislike => (NotificationType::Dislike, "disliked"),
        };
        self.fan_out(notification_type, &[post.author_id], |author| {
            NewNotification::new(
                author,
                notification_type,
                format!("Someone {} your post", verb),
                format!("Your post \"{}\" was {}", post.title, verb),
            )
            .sender(actor_id)
            .post(post.id)
        })
        .await
    }

    /// Top-level comment, to the post owner
    pub async fn comment(&self, post: &Post, comment: &Comment) -> FanOutReport {
        if comment.author_id == post.author_id {
            return FanOutReport::default();
        }

        self.fan_out(NotificationType::Comment, &[post.author_id], |author| {
            NewNotification::new(
                author,
                NotificationType::Comment,
                "New comment",
                format!("New comment on \"{}\"", post.title),
            )
            .sender(comment.author_id)
            .post(post.id)
            .comment(comment.id)
        })
        .await
    }

    /// Reply, to the author of the parent comment
    pub async fn reply(&self, post: &Post, parent: &Comment, reply: &Comment) -> FanOutReport {
        if reply.author_id == parent.author_id {
            return FanOutReport::default();
        }

        self.fan_out(NotificationType::Reply, &[parent.author_id], |recipient| {
            NewNotification::new(
                recipient,
                NotificationType::Reply,
                "New reply",
                format!("Someone replied to your comment on \"{}\"", post.title),
            )
            .sender(reply.author_id)
            .post(post.id)
            .comment(reply.id)
        })
        .await
    }

    pub async fn followed(&self, follower_id: Uuid, followee_id: Uuid) -> FanOutReport {
        self.fan_out(NotificationType::Follow, &[followee_id], |followee| {
            NewNotification::new(
                followee,
                NotificationType::Follow,
                "New follower",
                "Someone started following you",
            )
            .sender(follower_id)
            .link(format!("/users/{}", follower_id))
        })
        .await
    }

    pub async fn user_registered(&self, user_id: Uuid, display_name: &str) -> FanOutReport {
        let admins = self.resolve(&[Capability::Admin]).await;
        self.fan_out(NotificationType::NewUser, &admins, |admin| {
            NewNotification::new(
                admin,
                NotificationType::NewUser,
                "New user registered",
                format!("{} registered and is awaiting approval", display_name),
            )
            .sender(user_id)
            .link(format!("/admin/users/{}", user_id))
        })
        .await
    }

    pub async fn author_requested(&self, user_id: Uuid, display_name: &str) -> FanOutReport {
        let admins = self.resolve(&[Capability::Admin]).await;
        self.fan_out(NotificationType::AuthorRequest, &admins, |admin| {
            NewNotification::new(
                admin,
                NotificationType::AuthorRequest,
                "Author application",
                format!("{} applied for author access", display_name),
            )
            .sender(user_id)
            .link(format!("/admin/users/{}", user_id))
            .high_priority()
        })
        .await
    }

    pub async fn account_decision(
        &self,
        user_id: Uuid,
        approved: bool,
        reason: Option<&str>,
    ) -> FanOutReport {
        let (notification_type, title, message) = if approved {
            (
                NotificationType::AccountApproved,
                "Account approved",
                "Your account has been approved".to_string(),
            )
        } else {
            (
                NotificationType::AccountRejected,
                "Account not approved",
                match reason {
                    Some(reason) => format!("Your account was not approved: {}", reason),
                    None => "Your account was not approved".to_string(),
                },
            )
        };

        self.fan_out(notification_type, &[user_id], |user| {
            NewNotification::new(user, notification_type, title, message.clone())
        })
        .await
    }

    pub async fn welcome(&self, user_id: Uuid, display_name: &str) -> FanOutReport {
        self.fan_out(NotificationType::Welcome, &[user_id], |user| {
            NewNotification::new(
                user,
                NotificationType::Welcome,
                "Welcome",
                format!("Welcome to the campus blog, {}!", display_name),
            )
        })
        .await
    }

    /// High or critical verdict: high-priority alert to every active staff
    /// member. `post_id` is `None` when the content was blocked before it
    /// was stored.
    pub async fn violation_alert(
        &self,
        post_id: Option<Uuid>,
        author_id: Uuid,
        title: &str,
        report: &ViolationReport,
    ) -> FanOutReport {
        let staff = self.resolve(&Capability::STAFF).await;
        let tags = report.violations.join(", ");
        let fan_out = self
            .fan_out(NotificationType::ViolationAlert, &staff, |recipient| {
                let notification = NewNotification::new(
                    recipient,
                    NotificationType::ViolationAlert,
                    format!("{} severity content detected", report.severity),
                    format!("\"{}\" was flagged: {}", title, tags),
                )
                .sender(author_id)
                .high_priority();
                match post_id {
                    Some(post_id) => notification.post(post_id),
                    None => notification,
                }
            })
            .await;

        warn!(
            post_id = ?post_id,
            author_id = %author_id,
            severity = %report.severity,
            "violation alert raised"
        );
        self.delivery
            .to_staff(
                RealtimeEvent::ModerationViolationAlert,
                json!({
                    "post_id": post_id,
                    "author_id": author_id,
                    "title": title,
                    "severity": report.severity,
                    "violations": report.violations,
                    "blocked": post_id.is_none(),
                }),
            )
            .await;
        fan_out
    }

    /// Tell the author their post was held for review by the moderation gate
    pub async fn review_notice(&self, post: &Post) -> FanOutReport {
        self.fan_out(NotificationType::System, &[post.author_id], |author| {
            NewNotification::new(
                author,
                NotificationType::System,
                "Post held for review",
                format!(
                    "\"{}\" was sent to the moderators for review before publishing",
                    post.title
                ),
            )
            .post(post.id)
        })
        .await
    }

    pub async fn collaboration(
        &self,
        event: CollaborationEvent,
        post: &Post,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> FanOutReport {
        if actor_id == target_id {
            return FanOutReport::default();
        }

        let notification_type = event.notification_type();
        let (title, message) = match event {
            CollaborationEvent::Invited => (
                "Collaboration invite",
                format!("You were invited to co-author \"{}\"", post.title),
            ),
            CollaborationEvent::Accepted => (
                "Invite accepted",
                format!("Your co-author invite for \"{}\" was accepted", post.title),
            ),
            CollaborationEvent::Declined => (
                "Invite declined",
                format!("Your co-author invite for \"{}\" was declined", post.title),
            ),
            CollaborationEvent::Removed => (
                "Removed from post",
                format!("You are no longer a co-author of \"{}\"", post.title),
            ),
        };

        self.fan_out(notification_type, &[target_id], |target| {
            NewNotification::new(target, notification_type, title, message.clone())
                .sender(actor_id)
                .post(post.id)
        })
        .await
    }

    pub async fn system(&self, recipient_id: Uuid, title: &str, message: &str) -> FanOutReport {
        self.fan_out(NotificationType::System, &[recipient_id], |recipient| {
            NewNotification::new(recipient, NotificationType::System, title, message)
        })
        .await
    }
}
