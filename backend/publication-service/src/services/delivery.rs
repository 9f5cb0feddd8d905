use crate::db::NotificationRepository;
use crate::models::{FanOutReport, Notification};
use crate::websocket::{ConnectionManager, RealtimeEvent, RoleChannel};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Best-effort real-time push on top of the connection manager.
///
/// Nothing here returns an error: a recipient without a session, a closed
/// socket or a failed count query only ever costs the push.
pub struct NotificationDelivery {
    connections: Arc<ConnectionManager>,
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationDelivery {
    pub fn new(
        connections: Arc<ConnectionManager>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            connections,
            notifications,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Push a freshly persisted notification, then the recipient's unread
    /// count as it stands after the write.
    pub async fn deliver(&self, notification: &Notification) {
        let recipient = notification.recipient_id;
        if !self.connections.is_online(recipient).await {
            debug!(recipient = %recipient, "recipient offline, push dropped");
            return;
        }

        let payload = match serde_json::to_value(notification) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode notification for push");
                return;
            }
        };

        self.connections
            .emit_to_user(recipient, RealtimeEvent::NotificationNew, payload)
            .await;
        self.push_count(recipient).await;
    }

    pub async fn deliver_report(&self, report: &FanOutReport) {
        for notification in report.created.values() {
            self.deliver(notification).await;
        }
    }

    /// Recompute and push the unread count with a fresh query
    pub async fn push_count(&self, user_id: Uuid) {
        if !self.connections.is_online(user_id).await {
            return;
        }

        match self.notifications.unread_count(user_id).await {
            Ok(count) => {
                self.connections
                    .emit_to_user(
                        user_id,
                        RealtimeEvent::NotificationCount,
                        json!({ "count": count }),
                    )
                    .await;
            }
            Err(e) => warn!(user_id = %user_id, error = %e, "unread count unavailable for push"),
        }
    }

    pub async fn to_staff(&self, event: RealtimeEvent, payload: Value) {
        self.connections
            .emit_to_roles(&RoleChannel::STAFF, event, payload)
            .await;
    }

    pub async fn to_post_viewers(&self, post_id: Uuid, event: RealtimeEvent, payload: Value) {
        self.connections
            .emit_to_post_viewers(post_id, event, payload)
            .await;
    }

    pub async fn to_everyone(&self, event: RealtimeEvent, payload: Value) {
        self.connections.broadcast(event, payload).await;
    }
}
