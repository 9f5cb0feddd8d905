use super::NotificationRepository;
use crate::error::{AppError, Result};
use crate::models::{
    BulkInsert, NewNotification, Notification, NotificationFilter, NotificationType,
};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tracing::error;
use uuid::Uuid;

const NOTIFICATION_COLUMNS: &str = r#"
    id, recipient_id, sender_id, notification_type, title, message,
    related_post, related_comment, link, priority, is_read, created_at
"#;

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let notification_type: String = row.try_get("notification_type")?;
    let priority: String = row.try_get("priority")?;

    Ok(Notification {
        id: row.try_get("id")?,
        recipient_id: row.try_get("recipient_id")?,
        sender_id: row.try_get("sender_id")?,
        notification_type: notification_type.parse().map_err(AppError::Database)?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        related_post: row.try_get("related_post")?,
        related_comment: row.try_get("related_comment")?,
        link: row.try_get("link")?,
        priority: priority.parse().map_err(AppError::Database)?,
        read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, notification: NewNotification) -> Result<Option<Notification>> {
        // the partial unique index turns an outstanding duplicate into a no-op
        let sql = format!(
            r#"
            INSERT INTO notifications (
                id, recipient_id, sender_id, notification_type, title, message,
                related_post, related_comment, link, priority
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(notification.recipient_id)
            .bind(notification.sender_id)
            .bind(notification.notification_type.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.related_post)
            .bind(notification.related_comment)
            .bind(&notification.link)
            .bind(notification.priority.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn insert_many(&self, batch: Vec<NewNotification>) -> Result<BulkInsert> {
        if batch.is_empty() {
            return Ok(BulkInsert::default());
        }

        let ids: Vec<Uuid> = batch.iter().map(|_| Uuid::new_v4()).collect();
        let recipients: Vec<Uuid> = batch.iter().map(|n| n.recipient_id).collect();
        let senders: Vec<Option<Uuid>> = batch.iter().map(|n| n.sender_id).collect();
        let types: Vec<&str> = batch.iter().map(|n| n.notification_type.as_str()).collect();
        let titles: Vec<&str> = batch.iter().map(|n| n.title.as_str()).collect();
        let messages: Vec<&str> = batch.iter().map(|n| n.message.as_str()).collect();
        let posts: Vec<Option<Uuid>> = batch.iter().map(|n| n.related_post).collect();
        let comments: Vec<Option<Uuid>> = batch.iter().map(|n| n.related_comment).collect();
        let links: Vec<Option<&str>> = batch.iter().map(|n| n.link.as_deref()).collect();
        let priorities: Vec<&str> = batch.iter().map(|n| n.priority.as_str()).collect();

        let sql = format!(
            r#"
            INSERT INTO notifications (
                id, recipient_id, sender_id, notification_type, title, message,
                related_post, related_comment, link, priority
            )
            SELECT * FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::uuid[], $4::text[], $5::text[],
                $6::text[], $7::uuid[], $8::uuid[], $9::text[], $10::text[]
            )
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(&ids)
            .bind(&recipients)
            .bind(&senders)
            .bind(&types)
            .bind(&titles)
            .bind(&messages)
            .bind(&posts)
            .bind(&comments)
            .bind(&links)
            .bind(&priorities)
            .fetch_all(&self.pool)
            .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, recipients = batch.len(), "bulk notification insert failed");
                let reason = e.to_string();
                return Ok(BulkInsert {
                    failed: recipients.into_iter().map(|r| (r, reason.clone())).collect(),
                    ..Default::default()
                });
            }
        };

        let mut result = BulkInsert::default();
        for row in &rows {
            match notification_from_row(row) {
                Ok(n) => result.created.push(n),
                Err(e) => error!(error = %e, "failed to decode inserted notification"),
            }
        }

        let written: HashSet<Uuid> = rows
            .iter()
            .filter_map(|r| r.try_get::<Uuid, _>("id").ok())
            .collect();
        let decoded: HashSet<Uuid> = result.created.iter().map(|n| n.id).collect();
        for (id, recipient) in ids.iter().zip(recipients) {
            if !written.contains(id) {
                result.skipped.push(recipient);
            } else if !decoded.contains(id) {
                result
                    .failed
                    .push((recipient, "stored record could not be decoded".to_string()));
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
        if !notification_type.is_deduplicated() {
            return Ok(None);
        }

        let sql = format!(
            r#"
            SELECT {} FROM notifications
            WHERE recipient_id = $1 AND notification_type = $2
              AND related_post = $3 AND is_read = FALSE
            LIMIT 1
            "#,
            NOTIFICATION_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(recipient_id)
            .bind(notification_type.as_str())
            .bind(related_post)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn list(
        &self,
        recipient_id: Uuid,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        let sql = format!(
            r#"
            SELECT {} FROM notifications
            WHERE recipient_id = $1
              AND ($2::text IS NULL OR notification_type = $2)
              AND (NOT $3 OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            NOTIFICATION_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(recipient_id)
            .bind(filter.notification_type.map(|t| t.as_str()))
            .bind(filter.unread_only)
            .bind((filter.limit > 0).then_some(filter.limit))
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2",
        )
        .bind(notification_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(notification_id)
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE recipient_id = $1")
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
