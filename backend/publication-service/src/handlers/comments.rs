/// Comment handlers
use crate::error::Result;
use crate::models::Actor;
use crate::services::{CreateCommentRequest, UpdateCommentRequest};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

/// GET /api/v1/posts/{id}/comments
pub async fn list_comments(
    state: web::Data<AppState>,
    actor: Option<Actor>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let comments = state
        .comments
        .list_for_post(actor.as_ref(), path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(comments))
}

/// POST /api/v1/posts/{id}/comments
pub async fn create_comment(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    req: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse> {
    let comment = state
        .comments
        .create(&actor, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

/// PATCH /api/v1/comments/{id}
pub async fn update_comment(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    req: web::Json<UpdateCommentRequest>,
) -> Result<HttpResponse> {
    let comment = state
        .comments
        .update(&actor, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(comment))
}

/// DELETE /api/v1/comments/{id}
pub async fn delete_comment(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    state.comments.delete(&actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/comments")
            .route("/{id}", web::patch().to(update_comment))
            .route("/{id}", web::delete().to(delete_comment)),
    );
}
