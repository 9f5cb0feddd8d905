/// Notification service - recipient-facing reads and read-state changes
use super::delivery::NotificationDelivery;
use crate::db::NotificationRepository;
use crate::error::{AppError, Result};
use crate::models::{Notification, NotificationFilter, NotificationType};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Query parameters for listing notifications
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationQuery {
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            notification_type: None,
            unread_only: false,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl NotificationQuery {
    pub const MAX_LIMIT: i64 = 100;

    pub fn to_filter(&self) -> NotificationFilter {
        NotificationFilter {
            notification_type: self.notification_type,
            unread_only: self.unread_only,
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            offset: self.offset.max(0),
        }
    }
}

/// Every operation is scoped to the recipient; a record owned by someone
/// else looks missing. Read-state changes push the fresh unread count.
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    delivery: Arc<NotificationDelivery>,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        delivery: Arc<NotificationDelivery>,
    ) -> Self {
        Self {
            notifications,
            delivery,
        }
    }

    pub async fn list(&self, user_id: Uuid, query: &NotificationQuery) -> Result<Vec<Notification>> {
        self.notifications.list(user_id, &query.to_filter()).await
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        self.notifications.unread_count(user_id).await
    }

    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<()> {
        if !self.notifications.mark_read(user_id, notification_id).await? {
            return Err(AppError::NotFound(format!(
                "notification {}",
                notification_id
            )));
        }
        self.delivery.push_count(user_id).await;
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let updated = self.notifications.mark_all_read(user_id).await?;
        self.delivery.push_count(user_id).await;
        Ok(updated)
    }

    pub async fn delete(&self, user_id: Uuid, notification_id: Uuid) -> Result<()> {
        if !self.notifications.delete(user_id, notification_id).await? {
            return Err(AppError::NotFound(format!(
                "notification {}",
                notification_id
            )));
        }
        self.delivery.push_count(user_id).await;
        Ok(())
    }

    pub async fn delete_all(&self, user_id: Uuid) -> Result<u64> {
        let deleted = self.notifications.delete_all(user_id).await?;
        self.delivery.push_count(user_id).await;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_clamps_paging() {
        let query = NotificationQuery {
            limit: 10_000,
            offset: -5,
            ..Default::default()
        };
        let filter = query.to_filter();
        assert_eq!(filter.limit, NotificationQuery::MAX_LIMIT);
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn test_query_parses_type_filter() {
        let query: NotificationQuery =
            serde_json::from_str(r#"{"type":"pending_review","unread_only":true}"#).unwrap();
        assert_eq!(
            query.notification_type,
            Some(NotificationType::PendingReview)
        );
        assert!(query.unread_only);
        assert_eq!(query.limit, 20);
    }
}
