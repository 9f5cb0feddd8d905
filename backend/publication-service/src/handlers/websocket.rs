/// WebSocket entry point and connection status
///
/// Clients connect to `/ws` with a bearer token, either in the
/// Authorization header or as `?token=`. Browsers cannot set headers on a
/// WebSocket handshake, hence the query fallback.
use crate::error::AppError;
use crate::middleware::bearer_token;
use crate::models::Actor;
use crate::state::AppState;
use crate::websocket::WsSession;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<WsParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let token = params
        .token
        .as_deref()
        .or_else(|| bearer_token(&req))
        .ok_or_else(|| AppError::Unauthorized("missing token".to_string()))?;

    let actor = state.verifier.verify(token)?;
    if !actor.active {
        return Err(AppError::Forbidden("account is not active".to_string()).into());
    }

    let session = WsSession::new(
        actor,
        state.connections.clone(),
        state.delivery.clone(),
        state.posts.clone(),
        &state.config.realtime,
    );
    ws::start(session, &req, stream)
}

/// GET /api/v1/ws/status
pub async fn ws_status(state: web::Data<AppState>, actor: Actor) -> HttpResponse {
    let connections = state.connections.connection_count(actor.user_id).await;
    HttpResponse::Ok().json(json!({
        "user_id": actor.user_id,
        "connected": connections > 0,
        "connection_count": connections,
        "online_users": state.connections.connected_users_count().await,
    }))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_connect))
        .route("/api/v1/ws/status", web::get().to(ws_status));
}
