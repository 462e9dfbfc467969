use actix_web::{web, HttpResponse, Responder};
use tracing::instrument;

use crate::{errors::AppError, use_cases::extractors::AuthUser, AppState};

/// The caller's plan and the presets it grants.
#[instrument(skip(user, state), fields(user_id = %user.0))]
pub async fn me(user: AuthUser, state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let account = state.image_handler.account(&user.0).await?;
    Ok(HttpResponse::Ok().json(account))
}
