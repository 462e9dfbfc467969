use actix_web::{
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web, HttpResponse,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{errors::AppError, AppState};

/// Serves the derived image for a live link. Unknown and expired links are
/// indistinguishable to the caller.
#[instrument(skip(state))]
pub async fn resolve_link(
    link_id: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let resolved = state.resolver.resolve(&link_id).await?;

    Ok(HttpResponse::Ok()
        .content_type(resolved.content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Inline,
            parameters: vec![DispositionParam::Filename(resolved.filename)],
        })
        .insert_header(("X-Cache", resolved.cache.as_str()))
        .body(resolved.bytes))
}

pub async fn method_not_allowed() -> Result<HttpResponse, AppError> {
    Err(AppError::MethodNotAllowed)
}
