/// Post handlers - lifecycle, reads and engagement endpoints
use crate::error::Result;
use crate::models::{Actor, PageRequest, PostStatus};
use crate::services::{CreatePostRequest, UpdatePostRequest};
use crate::state::AppState;
use actix_web::cookie::{time, Cookie};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
}

impl ListQuery {
    fn page_request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.limit.unwrap_or(defaults.limit),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub track_view: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: PostStatus,
    #[serde(default)]
    pub override_moderation: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    pub notes: Option<String>,
}

/// GET /api/v1/posts
pub async fn list_posts(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = query.page_request();
    let posts = state
        .posts
        .list_published(page, query.category.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "posts": posts,
        "page": page.page,
        "limit": page.limit,
    })))
}

/// GET /api/v1/posts/categories
pub async fn list_categories(state: web::Data<AppState>) -> Result<HttpResponse> {
    let counts = state.posts.category_counts().await?;
    Ok(HttpResponse::Ok().json(counts))
}

/// POST /api/v1/posts
pub async fn create_post(
    state: web::Data<AppState>,
    actor: Actor,
    req: web::Json<CreatePostRequest>,
) -> Result<HttpResponse> {
    let post = state.posts.create_post(&actor, req.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

/// GET /api/v1/posts/{id}
///
/// With `track_view=true` the view is counted once per `pv_{id}` cookie
/// within the configured window.
pub async fn get_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    actor: Option<Actor>,
    path: web::Path<Uuid>,
    query: web::Query<ViewQuery>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    let mut post = state.posts.get_post(actor.as_ref(), post_id).await?;

    if !query.track_view || post.status != PostStatus::Published {
        return Ok(HttpResponse::Ok().json(post));
    }

    let cookie_name = format!("pv_{}", post_id);
    let existing = req.cookie(&cookie_name).map(|c| c.value().to_string());
    let token = existing
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let outcome = state
        .engagement
        .record_view(post_id, actor.as_ref(), &token, true)
        .await?;
    post.views = post.views.max(outcome.views);

    let mut response = HttpResponse::Ok();
    if existing.is_none() {
        let window = state.config.engagement.view_window_secs as i64;
        response.cookie(
            Cookie::build(cookie_name, token)
                .path("/")
                .http_only(true)
                .max_age(time::Duration::seconds(window))
                .finish(),
        );
    }
    Ok(response.json(post))
}

/// PATCH /api/v1/posts/{id}
pub async fn update_post(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    req: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse> {
    let post = state
        .posts
        .update_post(&actor, path.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

/// DELETE /api/v1/posts/{id}
pub async fn delete_post(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    state.posts.delete_post(&actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PATCH /api/v1/posts/{id}/status
pub async fn change_status(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    req: web::Json<StatusRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let post = state
        .posts
        .change_status(
            &actor,
            path.into_inner(),
            req.status,
            req.override_moderation,
            req.notes,
        )
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

/// POST /api/v1/posts/{id}/approve
pub async fn approve_post(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    req: Option<web::Json<NotesRequest>>,
) -> Result<HttpResponse> {
    let notes = req.and_then(|r| r.into_inner().notes);
    let post = state.posts.approve(&actor, path.into_inner(), notes).await?;
    Ok(HttpResponse::Ok().json(post))
}

/// POST /api/v1/posts/{id}/reject
pub async fn reject_post(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    req: Option<web::Json<NotesRequest>>,
) -> Result<HttpResponse> {
    let notes = req.and_then(|r| r.into_inner().notes);
    let post = state.posts.reject(&actor, path.into_inner(), notes).await?;
    Ok(HttpResponse::Ok().json(post))
}

/// POST /api/v1/posts/{id}/invite/accept
pub async fn accept_invite(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post = state
        .posts
        .respond_to_invite(&actor, path.into_inner(), true)
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

/// POST /api/v1/posts/{id}/invite/decline
pub async fn decline_invite(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post = state
        .posts
        .respond_to_invite(&actor, path.into_inner(), false)
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

/// POST /api/v1/posts/{id}/like
pub async fn like_post(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let outcome = state.engagement.like(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// DELETE /api/v1/posts/{id}/like
pub async fn unlike_post(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let outcome = state.engagement.unlike(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /api/v1/posts/{id}/dislike
pub async fn dislike_post(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let outcome = state.engagement.dislike(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// DELETE /api/v1/posts/{id}/dislike
pub async fn undislike_post(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let outcome = state
        .engagement
        .undislike(&actor, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// GET /api/v1/posts/{id}/engagement
pub async fn get_engagement(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let counts = state.engagement.counts(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(counts))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/posts")
            .route("", web::get().to(list_posts))
            .route("", web::post().to(create_post))
            .route("/categories", web::get().to(list_categories))
            .route("/{id}", web::get().to(get_post))
            .route("/{id}", web::patch().to(update_post))
            .route("/{id}", web::delete().to(delete_post))
            .route("/{id}/status", web::patch().to(change_status))
            .route("/{id}/approve", web::post().to(approve_post))
            .route("/{id}/reject", web::post().to(reject_post))
            .route("/{id}/invite/accept", web::post().to(accept_invite))
            .route("/{id}/invite/decline", web::post().to(decline_invite))
            .route("/{id}/like", web::post().to(like_post))
            .route("/{id}/like", web::delete().to(unlike_post))
            .route("/{id}/dislike", web::post().to(dislike_post))
            .route("/{id}/dislike", web::delete().to(undislike_post))
            .route("/{id}/engagement", web::get().to(get_engagement))
            .route(
                "/{id}/comments",
                web::get().to(super::comments::list_comments),
            )
            .route(
                "/{id}/comments",
                web::post().to(super::comments::create_comment),
            ),
    );
}
