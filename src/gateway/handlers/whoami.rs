//! Default downstream route: echoes the established principal.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::gateway::principal::Principal;

/// Reports who the gateway decided the caller is. Mostly useful for
/// wiring checks; real deployments dispatch to their own downstream.
pub async fn whoami(principal: Option<Extension<Principal>>) -> impl IntoResponse {
    match principal {
        Some(Extension(principal)) => Json(json!({
            "subject": principal.subject,
            "username": principal.username,
            "authorities": principal.authorities,
            "scope": principal.claims.scope,
            "expires_at": principal.claims.expires_at,
        }))
        .into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}
