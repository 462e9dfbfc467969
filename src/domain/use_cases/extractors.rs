use actix_web::{web, FromRequest, HttpRequest, HttpMessage};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use crate::{entities::token::Claims, errors::{AppError, AuthError}, AppState};

/// The authenticated caller's user id.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(authenticated_user(req).map(AuthUser).map_err(Into::into))
    }
}

/// Like [`AuthUser`], but also charges the caller's request budget.
/// Returns 429 with `Retry-After` once the budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct ThrottledUser(pub Uuid);

impl FromRequest for ThrottledUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        let user_id = match authenticated_user(req) {
            Ok(id) => id,
            Err(e) => return ready(Err(e.into())),
        };

        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("AppState missing in throttle extractor");
            return ready(Err(AppError::InternalError("Missing application state".into()).into()));
        };

        let decision = state.throttle.check(&user_id.to_string());
        if decision.allowed {
            ready(Ok(ThrottledUser(user_id)))
        } else {
            tracing::warn!(user_id = %user_id, retry_after = ?decision.retry_after, "request throttled");
            ready(Err(AppError::RateLimited {
                retry_after: decision.retry_after.unwrap_or(1),
            }
            .into()))
        }
    }
}

fn authenticated_user(req: &HttpRequest) -> Result<Uuid, AuthError> {
    req.extensions()
        .get::<Claims>()
        .ok_or(AuthError::MissingCredentials)?
        .user_id()
}
