//! Login page and the classic (username/password) login outcome.

use axum::{
    extract::{Extension, Form, Query},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::gateway::{cookies, redirect, state::GatewayState};

/// Minimal HTML attribute escaping for values echoed back into the page.
fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Debug, Deserialize)]
pub struct LoginPageParams {
    #[serde(default)]
    redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
    #[serde(default)]
    redirect: Option<String>,
}

/// Serve the login form. Real page rendering lives outside this core; the
/// markup here only carries the form field contract.
pub async fn login_page(
    state: Extension<Arc<GatewayState>>,
    Query(params): Query<LoginPageParams>,
) -> impl IntoResponse {
    let action = state.config().login().login_page();
    let redirect_field = params
        .redirect
        .as_deref()
        .and_then(|target| redirect::validate_redirect(target).ok())
        .map(|target| {
            format!(
                r#"<input type="hidden" name="redirect" value="{}">"#,
                escape_attribute(&target)
            )
        })
        .unwrap_or_default();

    let mut body = format!(
        r#"<!DOCTYPE html>
<html>
<body>
<form method="post" action="{action}">
{redirect_field}
<label>Username <input type="text" name="username"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Sign in</button>
</form>
"#
    );
    if state.config().login().oauth2().is_some() {
        body.push_str("<a href=\"/oauth2/authorize\">Sign in with OAuth2</a>\n");
    }
    body.push_str("</body>\n</html>\n");
    Html(body)
}

/// Classic login outcome: mint the encrypted credential cookie and redirect.
pub async fn classic_login(
    state: Extension<Arc<GatewayState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let Some(classic) = state.config().login().classic().cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !state
        .user_lookup()
        .verify_credentials(&form.username, &form.password)
    {
        info!("classic login failed");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let credentials = format!("{}:{}", form.username, form.password);
    let sealed = match state.codec().seal(&credentials) {
        Ok(sealed) => sealed,
        Err(err) => {
            error!("could not seal classic credentials: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let Ok(cookie) = cookies::build(
        cookies::CLASSIC_AUTH_COOKIE,
        &sealed,
        classic.cookie_ttl_seconds(),
    ) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let target = match form.redirect.as_deref() {
        Some(requested) => match redirect::validate_redirect(requested) {
            Ok(validated) => validated,
            Err(err) => {
                info!("rejected login redirect target: {err}");
                return StatusCode::FORBIDDEN.into_response();
            }
        },
        None => state
            .config()
            .login()
            .default_redirect_uri()
            .unwrap_or(cookies::BASE_PATH)
            .to_string(),
    };
    let target = redirect::append_query_param(&target, "theme", classic.theme());

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    match target.parse() {
        Ok(location) => {
            headers.insert(LOCATION, location);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
