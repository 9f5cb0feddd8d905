/// WebSocket Connection Manager
///
/// Tracks live sessions and routes frames to them. Every session is
/// addressable three ways:
/// - its personal channel (user id)
/// - the role channels it joined on connect (`moderators`, `admins`)
/// - the post rooms it joined while viewing a post
///
/// Nothing here is persisted. A frame for a user with no live session is
/// dropped; the notification stays queryable through the store.
use super::events::{OutboundFrame, RealtimeEvent, RoleChannel};
use crate::metrics;
use crate::models::Actor;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Serialized frames travel to the session actor over this channel
pub type SessionSender = mpsc::UnboundedSender<String>;

struct Connection {
    user_id: Uuid,
    roles: HashSet<RoleChannel>,
    rooms: HashSet<Uuid>,
    sender: SessionSender,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<Uuid, Connection>,
    by_user: HashMap<Uuid, HashSet<Uuid>>,
    by_room: HashMap<Uuid, HashSet<Uuid>>,
}

impl Registry {
    fn remove_from_room(&mut self, post_id: Uuid, connection_id: Uuid) {
        if let Some(members) = self.by_room.get_mut(&post_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.by_room.remove(&post_id);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct ConnectionManager {
    registry: Arc<RwLock<Registry>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session: personal channel plus the role channels its
    /// capability set entitles it to.
    pub async fn register(&self, connection_id: Uuid, actor: &Actor, sender: SessionSender) {
        let roles: HashSet<RoleChannel> = actor
            .capabilities
            .iter()
            .filter_map(|c| RoleChannel::for_capability(*c))
            .collect();

        let mut registry = self.registry.write().await;
        registry
            .by_user
            .entry(actor.user_id)
            .or_default()
            .insert(connection_id);
        registry.connections.insert(
            connection_id,
            Connection {
                user_id: actor.user_id,
                roles,
                rooms: HashSet::new(),
                sender,
            },
        );

        metrics::realtime_connection_opened();
        debug!(user_id = %actor.user_id, connection_id = %connection_id, "session registered");
    }

    /// Drop a session together with its room memberships
    pub async fn unregister(&self, connection_id: Uuid) {
        let mut registry = self.registry.write().await;
        let Some(connection) = registry.connections.remove(&connection_id) else {
            return;
        };

        if let Some(sessions) = registry.by_user.get_mut(&connection.user_id) {
            sessions.remove(&connection_id);
            if sessions.is_empty() {
                registry.by_user.remove(&connection.user_id);
            }
        }
        for post_id in connection.rooms {
            registry.remove_from_room(post_id, connection_id);
        }

        metrics::realtime_connection_closed();
        debug!(user_id = %connection.user_id, connection_id = %connection_id, "session unregistered");
    }

    pub async fn join_post(&self, connection_id: Uuid, post_id: Uuid) -> bool {
        let mut guard = self.registry.write().await;
        let registry = &mut *guard;
        match registry.connections.get_mut(&connection_id) {
            Some(connection) => {
                connection.rooms.insert(post_id);
                registry
                    .by_room
                    .entry(post_id)
                    .or_default()
                    .insert(connection_id);
                true
            }
            None => false,
        }
    }

    pub async fn leave_post(&self, connection_id: Uuid, post_id: Uuid) -> bool {
        let mut registry = self.registry.write().await;
        let left = registry
            .connections
            .get_mut(&connection_id)
            .map(|c| c.rooms.remove(&post_id))
            .unwrap_or(false);
        registry.remove_from_room(post_id, connection_id);
        left
    }

    /// Push to every session of one user. Returns the number of sessions
    /// reached.
    pub async fn emit_to_user(&self, user_id: Uuid, event: RealtimeEvent, payload: Value) -> usize {
        let registry = self.registry.read().await;
        let targets: Vec<Uuid> = registry
            .by_user
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        Self::send(&registry, &targets, event, payload)
    }

    pub async fn emit_to_role(&self, role: RoleChannel, event: RealtimeEvent, payload: Value) -> usize {
        self.emit_to_roles(&[role], event, payload).await
    }

    /// Push to the union of several role channels; a session in more than
    /// one of them receives the frame once.
    pub async fn emit_to_roles(
        &self,
        roles: &[RoleChannel],
        event: RealtimeEvent,
        payload: Value,
    ) -> usize {
        let registry = self.registry.read().await;
        let targets: Vec<Uuid> = registry
            .connections
            .iter()
            .filter(|(_, c)| roles.iter().any(|r| c.roles.contains(r)))
            .map(|(id, _)| *id)
            .collect();
        Self::send(&registry, &targets, event, payload)
    }

    pub async fn emit_to_post_viewers(
        &self,
        post_id: Uuid,
        event: RealtimeEvent,
        payload: Value,
    ) -> usize {
        let registry = self.registry.read().await;
        let targets: Vec<Uuid> = registry
            .by_room
            .get(&post_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        Self::send(&registry, &targets, event, payload)
    }

    /// Push to every live session
    pub async fn broadcast(&self, event: RealtimeEvent, payload: Value) -> usize {
        let registry = self.registry.read().await;
        let targets: Vec<Uuid> = registry.connections.keys().copied().collect();
        Self::send(&registry, &targets, event, payload)
    }

    fn send(registry: &Registry, targets: &[Uuid], event: RealtimeEvent, payload: Value) -> usize {
        if targets.is_empty() {
            metrics::record_push(event.as_str(), false);
            return 0;
        }

        let frame = match serde_json::to_string(&OutboundFrame::new(event, payload)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = event.as_str(), error = %e, "failed to encode real-time frame");
                return 0;
            }
        };

        let delivered = targets
            .iter()
            .filter_map(|id| registry.connections.get(id))
            // a closed channel means the session is shutting down
            .filter(|c| c.sender.send(frame.clone()).is_ok())
            .count();

        metrics::record_push(event.as_str(), delivered > 0);
        delivered
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.registry.read().await.by_user.contains_key(&user_id)
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.registry
            .read()
            .await
            .by_user
            .get(&user_id)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        self.registry.read().await.connections.len()
    }

    pub async fn connected_users_count(&self) -> usize {
        self.registry.read().await.by_user.len()
    }

    pub async fn viewers_of(&self, post_id: Uuid) -> usize {
        self.registry
            .read()
            .await
            .by_room
            .get(&post_id)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    /// Drop every session; dropping the senders ends the session forwarders
    pub async fn clear_all(&self) {
        let mut registry = self.registry.write().await;
        for _ in 0..registry.connections.len() {
            metrics::realtime_connection_closed();
        }
        *registry = Registry::default();
    }
}
