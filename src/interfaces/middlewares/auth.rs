use actix_web::{
    body::BoxBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage, HttpResponse,
};
use futures_util::future::{ok, Ready, LocalBoxFuture};
use std::{rc::Rc, task::{Context, Poll}};

use crate::{entities::token::Claims, errors::AuthError, AppState};

/// Verifies the bearer token on every non-public route and stores the
/// decoded [`Claims`] in the request extensions.
pub struct AuthMiddleware;

impl<S> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            if is_public_route(req.path()) {
                return service.call(req).await;
            }

            let Some(token) = extract_token(&req) else {
                tracing::warn!("Missing or malformed Authorization header");
                return Ok(unauthorized(req, "Missing or invalid credentials"));
            };

            let claims = match get_valid_claims(&req, &token) {
                Ok(claims) => claims,
                Err(AuthError::TokenExpired) => {
                    return Ok(unauthorized(req, "Token has expired"));
                }
                Err(AuthError::MissingJwtService) => {
                    tracing::error!("AppState missing in middleware");
                    return Ok(req.into_response(HttpResponse::InternalServerError().json(
                        serde_json::json!({"error": "Internal server error"})
                    )));
                }
                Err(e) => {
                    tracing::warn!("Rejected bearer token: {}", e);
                    return Ok(unauthorized(req, "Missing or invalid credentials"));
                }
            };

            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}

/// The resolution endpoint is reachable by anyone holding a link id.
fn is_public_route(path: &str) -> bool {
    matches!(path, "/" | "/health") || path.starts_with("/image-urls/")
}

fn extract_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| {
            let parts: Vec<&str> = header.split_whitespace().collect();
            if parts.len() == 2 && parts[0].eq_ignore_ascii_case("bearer") {
                Some(parts[1].to_string())
            } else {
                None
            }
        })
}

fn get_valid_claims(req: &ServiceRequest, token: &str) -> Result<Claims, AuthError> {
    let state = req.app_data::<web::Data<AppState>>()
        .ok_or(AuthError::MissingJwtService)?;

    let decoded = state.token_service.decode_jwt(token)?;
    decoded.claims.user_id()?;
    Ok(decoded.claims)
}

fn unauthorized(req: ServiceRequest, message: &str) -> ServiceResponse<BoxBody> {
    req.into_response(HttpResponse::Unauthorized().json(serde_json::json!({
        "error": message
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resolution_home_and_health_are_public() {
        assert!(is_public_route("/"));
        assert!(is_public_route("/health"));
        assert!(is_public_route("/image-urls/7d3c6d2e-0000-4000-8000-000000000000"));
        assert!(!is_public_route("/api/v1/images"));
        assert!(!is_public_route("/api/v1/users/me"));
        assert!(!is_public_route("/image-urls-fake"));
    }
}
