use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Notification type enumeration (closed set)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Like,
    Dislike,
    Comment,
    Reply,
    Follow,
    PostApproved,
    PostRejected,
    PostPublished,
    PendingReview,
    NewUser,
    AuthorRequest,
    AccountApproved,
    AccountRejected,
    ContentReport,
    ViolationAlert,
    CollaborationInvite,
    CollaborationAccepted,
    CollaborationDeclined,
    CollaborationRemoved,
    System,
    Welcome,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Like => "like",
            NotificationType::Dislike => "dislike",
            NotificationType::Comment => "comment",
            NotificationType::Reply => "reply",
            NotificationType::Follow => "follow",
            NotificationType::PostApproved => "post_approved",
            NotificationType::PostRejected => "post_rejected",
            NotificationType::PostPublished => "post_published",
            NotificationType::PendingReview => "pending_review",
            NotificationType::NewUser => "new_user",
            NotificationType::AuthorRequest => "author_request",
            NotificationType::AccountApproved => "account_approved",
            NotificationType::AccountRejected => "account_rejected",
            NotificationType::ContentReport => "content_report",
            NotificationType::ViolationAlert => "violation_alert",
            NotificationType::CollaborationInvite => "collaboration_invite",
            NotificationType::CollaborationAccepted => "collaboration_accepted",
            NotificationType::CollaborationDeclined => "collaboration_declined",
            NotificationType::CollaborationRemoved => "collaboration_removed",
            NotificationType::System => "system",
            NotificationType::Welcome => "welcome",
        }
    }

    /// Types that are not re-issued while an identical unread record for the
    /// same recipient and post is still outstanding.
    pub fn is_deduplicated(&self) -> bool {
        matches!(
            self,
            NotificationType::PendingReview | NotificationType::CollaborationInvite
        )
    }

    pub const DEDUPLICATED: [NotificationType; 2] = [
        NotificationType::PendingReview,
        NotificationType::CollaborationInvite,
    ];
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown notification type '{}'", s))
    }
}

/// Notification priority level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    #[default]
    Normal,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        }
    }
}

impl FromStr for NotificationPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(NotificationPriority::Normal),
            "high" => Ok(NotificationPriority::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Core notification model. Only `read` ever changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_post: Option<Uuid>,
    pub related_comment: Option<Uuid>,
    pub link: Option<String>,
    pub priority: NotificationPriority,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to create a notification
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_post: Option<Uuid>,
    pub related_comment: Option<Uuid>,
    pub link: Option<String>,
    pub priority: NotificationPriority,
}

impl NewNotification {
    pub fn new(
        recipient_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            sender_id: None,
            notification_type,
            title: title.into(),
            message: message.into(),
            related_post: None,
            related_comment: None,
            link: None,
            priority: NotificationPriority::Normal,
        }
    }

    pub fn sender(mut self, sender_id: Uuid) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn post(mut self, post_id: Uuid) -> Self {
        self.related_post = Some(post_id);
        self.link = Some(format!("/posts/{}", post_id));
        self
    }

    pub fn comment(mut self, comment_id: Uuid) -> Self {
        self.related_comment = Some(comment_id);
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn high_priority(mut self) -> Self {
        self.priority = NotificationPriority::High;
        self
    }

    pub fn into_notification(self, id: Uuid, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id,
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            notification_type: self.notification_type,
            title: self.title,
            message: self.message,
            related_post: self.related_post,
            related_comment: self.related_comment,
            link: self.link,
            priority: self.priority,
            read: false,
            created_at,
        }
    }
}

/// Listing filter for a recipient's notifications
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFilter {
    pub notification_type: Option<NotificationType>,
    pub unread_only: bool,
    pub limit: i64,
    pub offset: i64,
}

/// Per-recipient outcome of one bulk write
#[derive(Debug, Clone, Default)]
pub struct BulkInsert {
    pub created: Vec<Notification>,
    /// Recipients holding an outstanding identical record
    pub skipped: Vec<Uuid>,
    /// Recipients whose record could not be written, with the reason
    pub failed: Vec<(Uuid, String)>,
}

/// What one fan-out produced, keyed by recipient
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    pub created: HashMap<Uuid, Notification>,
    pub skipped: Vec<Uuid>,
    pub failed: Vec<(Uuid, String)>,
}

impl FanOutReport {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn merge(&mut self, other: FanOutReport) {
        self.created.extend(other.created);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

impl From<BulkInsert> for FanOutReport {
    fn from(bulk: BulkInsert) -> Self {
        Self {
            created: bulk
                .created
                .into_iter()
                .map(|n| (n.recipient_id, n))
                .collect(),
            skipped: bulk.skipped,
            failed: bulk.failed,
        }
    }
}
