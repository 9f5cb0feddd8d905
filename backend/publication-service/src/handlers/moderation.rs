/// Moderation staff endpoints
use crate::error::Result;
use crate::models::{Actor, PageRequest};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/v1/moderation/queue
pub async fn moderation_queue(
    state: web::Data<AppState>,
    actor: Actor,
    query: web::Query<QueueQuery>,
) -> Result<HttpResponse> {
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.limit.unwrap_or(defaults.limit),
    );
    let posts = state.posts.moderation_queue(&actor, page).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/moderation").route("/queue", web::get().to(moderation_queue)),
    );
}
