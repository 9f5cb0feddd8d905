/// Notification handlers - the recipient's own inbox
use crate::error::Result;
use crate::models::Actor;
use crate::services::NotificationQuery;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

/// GET /api/v1/notifications?type=&unread_only=&limit=&offset=
pub async fn list_notifications(
    state: web::Data<AppState>,
    actor: Actor,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse> {
    let notifications = state
        .notifications
        .list(actor.user_id, &query)
        .await?;
    let unread = state.notifications.unread_count(actor.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "notifications": notifications,
        "unread_count": unread,
    })))
}

/// GET /api/v1/notifications/unread-count
pub async fn unread_count(state: web::Data<AppState>, actor: Actor) -> Result<HttpResponse> {
    let count = state.notifications.unread_count(actor.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

/// PUT /api/v1/notifications/{id}/read
pub async fn mark_read(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    state
        .notifications
        .mark_read(actor.user_id, path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /api/v1/notifications/read-all
pub async fn mark_all_read(state: web::Data<AppState>, actor: Actor) -> Result<HttpResponse> {
    let updated = state.notifications.mark_all_read(actor.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": updated })))
}

/// DELETE /api/v1/notifications/{id}
pub async fn delete_notification(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    state
        .notifications
        .delete(actor.user_id, path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/v1/notifications
pub async fn delete_all(state: web::Data<AppState>, actor: Actor) -> Result<HttpResponse> {
    let deleted = state.notifications.delete_all(actor.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "deleted": deleted })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/notifications")
            .route("", web::get().to(list_notifications))
            .route("", web::delete().to(delete_all))
            .route("/unread-count", web::get().to(unread_count))
            .route("/read-all", web::put().to(mark_all_read))
            .route("/{id}/read", web::put().to(mark_read))
            .route("/{id}", web::delete().to(delete_notification)),
    );
}
