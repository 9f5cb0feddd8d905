/// Follow handlers
use crate::error::Result;
use crate::models::Actor;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

/// POST /api/v1/users/{id}/follow
pub async fn follow_user(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let followee_id = path.into_inner();
    let created = state.follows.follow(&actor, followee_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "followee_id": followee_id,
        "following": true,
        "created": created,
    })))
}

/// DELETE /api/v1/users/{id}/follow
pub async fn unfollow_user(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let followee_id = path.into_inner();
    let removed = state.follows.unfollow(&actor, followee_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "followee_id": followee_id,
        "following": false,
        "removed": removed,
    })))
}

/// GET /api/v1/users/{id}/follow
pub async fn follow_status(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let followee_id = path.into_inner();
    let following = state.follows.is_following(&actor, followee_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "followee_id": followee_id,
        "following": following,
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/users")
            .route("/{id}/follow", web::get().to(follow_status))
            .route("/{id}/follow", web::post().to(follow_user))
            .route("/{id}/follow", web::delete().to(unfollow_user)),
    );
}
