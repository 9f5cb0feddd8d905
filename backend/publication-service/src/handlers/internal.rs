/// Internal endpoints for the account workflow. Admin tokens only.
use crate::error::{AppError, Result};
use crate::models::Actor;
use crate::services::AccountEvent;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

/// POST /api/v1/internal/users/events
pub async fn account_event(
    state: web::Data<AppState>,
    actor: Actor,
    event: web::Json<AccountEvent>,
) -> Result<HttpResponse> {
    if !actor.active || !actor.is_admin() {
        return Err(AppError::Forbidden(
            "account events require an admin token".to_string(),
        ));
    }

    let outcome = state.accounts.handle(event.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(outcome))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/internal").route("/users/events", web::post().to(account_event)),
    );
}
