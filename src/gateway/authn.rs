//! Bearer authentication stage: resolve the token, validate it with the
//! configured strategy, and establish the caller's principal.
//!
//! The missing-token sentinel travels through the same validation path as
//! any real token and fails there, so clients cannot distinguish a missing
//! credential from a malformed one.

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    cookies,
    introspect::IntrospectionError,
    jwt::JwtError,
    resolver,
    state::{GatewayState, TokenValidator},
};

enum AuthFailure {
    /// Bad or missing credential. 401, no detail for the client.
    Unauthorized,
    /// The validation infrastructure itself failed. 500.
    Infrastructure,
}

/// Per-request middleware stage guarding the protected subtree.
pub async fn require_bearer_principal(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = resolver::resolve(request.headers(), state.codec());

    let outcome = match state.validator() {
        TokenValidator::Jwt(validator) => validator.validate(&token).await.map_err(|err| match err {
            JwtError::BadToken => AuthFailure::Unauthorized,
            JwtError::Provider(detail) => {
                error!("jwt validation infrastructure failure: {detail}");
                AuthFailure::Infrastructure
            }
        }),
        TokenValidator::Opaque(introspector) => {
            introspector.introspect(&token).await.map_err(|err| match err {
                IntrospectionError::BadToken(reason) => {
                    debug!("opaque token rejected: {reason}");
                    AuthFailure::Unauthorized
                }
                IntrospectionError::Provider(detail) => {
                    error!("introspection infrastructure failure: {detail}");
                    AuthFailure::Infrastructure
                }
            })
        }
    };

    match outcome {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(AuthFailure::Unauthorized) => unauthorized(),
        Err(AuthFailure::Infrastructure) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// 401 with the access-token cookie cleared, so a browser holding a dead
/// token does not loop on it.
fn unauthorized() -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    if let Ok(cleared) = cookies::clear(cookies::ACCESS_TOKEN_COOKIE) {
        response.headers_mut().append(SET_COOKIE, cleared);
    }
    response
}
