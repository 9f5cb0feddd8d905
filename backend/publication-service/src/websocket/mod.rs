/// Real-time delivery over WebSocket
///
/// - `events`: event names and frame shapes
/// - `manager`: live session registry and routing
/// - `session`: the per-connection actor
pub mod events;
pub mod manager;
pub mod session;

pub use events::{InboundAction, OutboundFrame, RealtimeEvent, RoleChannel};
pub use manager::{ConnectionManager, SessionSender};
pub use session::{join_post_room, WsSession};
