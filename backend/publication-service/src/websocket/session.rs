use super::events::InboundAction;
use super::manager::ConnectionManager;
use crate::config::RealtimeConfig;
use crate::error::Result as AppResult;
use crate::models::Actor as SessionActor;
use crate::services::{NotificationDelivery, PostService};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A serialized frame routed to this session by the connection manager
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Push(String);

/// Session-level reply that is not a routed event (`pong`, `error`)
fn control_frame(event: &str, payload: Value) -> String {
    json!({
        "event": event,
        "payload": payload,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    })
    .to_string()
}

/// Join a post's room, provided the session's user may view the post.
/// Hidden and missing posts both come back as `NotFound`.
pub async fn join_post_room(
    connections: &ConnectionManager,
    posts: &PostService,
    connection_id: Uuid,
    actor: &SessionActor,
    post_id: Uuid,
) -> AppResult<bool> {
    posts.get_post(Some(actor), post_id).await?;
    Ok(connections.join_post(connection_id, post_id).await)
}

/// One authenticated socket. Joins the user's personal channel and role
/// channels on start, post rooms on request.
pub struct WsSession {
    connection_id: Uuid,
    actor: SessionActor,
    connections: Arc<ConnectionManager>,
    delivery: Arc<NotificationDelivery>,
    posts: Arc<PostService>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    hb: Instant,
}

impl WsSession {
    pub fn new(
        actor: SessionActor,
        connections: Arc<ConnectionManager>,
        delivery: Arc<NotificationDelivery>,
        posts: Arc<PostService>,
        config: &RealtimeConfig,
    ) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            actor,
            connections,
            delivery,
            posts,
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(config.client_timeout_secs),
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                warn!(user_id = %act.actor.user_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_action(&self, action: InboundAction, ctx: &mut ws::WebsocketContext<Self>) {
        let connections = self.connections.clone();
        let connection_id = self.connection_id;

        match action {
            InboundAction::JoinPost { post_id } => {
                let posts = self.posts.clone();
                let actor = self.actor.clone();
                let addr = ctx.address();
                actix::spawn(async move {
                    let joined =
                        join_post_room(&connections, &posts, connection_id, &actor, post_id).await;
                    if let Err(e) = joined {
                        debug!(
                            user_id = %actor.user_id,
                            post_id = %post_id,
                            error = %e,
                            "post room join refused"
                        );
                        addr.do_send(Push(control_frame(
                            "error",
                            json!({
                                "action": "join_post",
                                "post_id": post_id,
                                "message": e.to_string(),
                            }),
                        )));
                    }
                });
            }
            InboundAction::LeavePost { post_id } => {
                actix::spawn(async move {
                    connections.leave_post(connection_id, post_id).await;
                });
            }
            InboundAction::Ping => {
                ctx.text(control_frame("pong", json!({})));
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);

        let (sender, mut frames) = mpsc::unbounded_channel::<String>();
        let addr = ctx.address().downgrade();
        let connections = self.connections.clone();
        let delivery = self.delivery.clone();
        let actor = self.actor.clone();
        let connection_id = self.connection_id;

        actix::spawn(async move {
            connections.register(connection_id, &actor, sender).await;
            delivery.push_count(actor.user_id).await;

            // Ends once the manager drops the sender on unregister
            while let Some(frame) = frames.recv().await {
                match addr.upgrade() {
                    Some(addr) => addr.do_send(Push(frame)),
                    None => break,
                }
            }
        });

        info!(
            user_id = %self.actor.user_id,
            connection_id = %self.connection_id,
            "WebSocket session started"
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let connections = self.connections.clone();
        let connection_id = self.connection_id;
        actix::spawn(async move {
            connections.unregister(connection_id).await;
        });

        info!(
            user_id = %self.actor.user_id,
            connection_id = %self.connection_id,
            "WebSocket session closed"
        );
    }
}

impl Handler<Push> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Push, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.hb = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<InboundAction>(&text) {
                    Ok(action) => self.handle_action(action, ctx),
                    Err(e) => debug!(error = %e, "ignoring malformed client frame"),
                }
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Binary(_)) | Ok(ws::Message::Continuation(_)) => {}
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}
