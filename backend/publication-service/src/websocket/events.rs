/// Real-time event names and frame shapes shared with clients
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::Capability;

/// Outbound event names. These strings are part of the client contract and
/// must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealtimeEvent {
    NotificationNew,
    NotificationCount,
    PostNew,
    PostUpdated,
    PostDeleted,
    CommentNew,
    CommentUpdated,
    CommentDeleted,
    EngagementUpdate,
    ModerationNew,
    ModerationApproved,
    ModerationRejected,
    ModerationViolationAlert,
}

impl RealtimeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeEvent::NotificationNew => "notification:new",
            RealtimeEvent::NotificationCount => "notification:count",
            RealtimeEvent::PostNew => "post:new",
            RealtimeEvent::PostUpdated => "post:updated",
            RealtimeEvent::PostDeleted => "post:deleted",
            RealtimeEvent::CommentNew => "comment:new",
            RealtimeEvent::CommentUpdated => "comment:updated",
            RealtimeEvent::CommentDeleted => "comment:deleted",
            RealtimeEvent::EngagementUpdate => "engagement:update",
            RealtimeEvent::ModerationNew => "moderation:new",
            RealtimeEvent::ModerationApproved => "moderation:approved",
            RealtimeEvent::ModerationRejected => "moderation:rejected",
            RealtimeEvent::ModerationViolationAlert => "moderation:violation_alert",
        }
    }
}

/// Role-scoped channels a session joins on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleChannel {
    Moderators,
    Admins,
}

impl RoleChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleChannel::Moderators => "moderators",
            RoleChannel::Admins => "admins",
        }
    }

    pub fn for_capability(capability: Capability) -> Option<Self> {
        match capability {
            Capability::Admin => Some(RoleChannel::Admins),
            Capability::Moderator => Some(RoleChannel::Moderators),
            _ => None,
        }
    }

    /// Both staff channels
    pub const STAFF: [RoleChannel; 2] = [RoleChannel::Moderators, RoleChannel::Admins];
}

/// Frame pushed to clients: `{"event": ..., "payload": ..., "timestamp": ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundFrame {
    pub event: String,
    pub payload: Value,
    pub timestamp: i64,
}

impl OutboundFrame {
    pub fn new(event: RealtimeEvent, payload: Value) -> Self {
        Self {
            event: event.as_str().to_string(),
            payload,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Actions clients may send over the socket
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboundAction {
    JoinPost { post_id: Uuid },
    LeavePost { post_id: Uuid },
    Ping,
}
