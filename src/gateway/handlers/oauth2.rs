//! OAuth2 login flow: authorization initiation and the code callback.
//!
//! The in-flight request lives in an encrypted cookie between the two
//! endpoints; the server keeps nothing.

use axum::{
    extract::{Extension, Query},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::gateway::{
    cookies, expiry,
    flow::{AuthorizationFlowRecord, AuthorizationFlowStore, GrantType, ResponseType},
    state::{GatewayState, OAuth2LoginConfig},
};
use crate::APP_USER_AGENT;

/// Fallback token lifetime when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Start the authorization flow: build the record, store it in the flow
/// cookie, redirect to the identity provider.
pub async fn authorize(state: Extension<Arc<GatewayState>>) -> Response {
    let Some(oauth2) = state.config().login().oauth2() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let flow = match build_flow(oauth2) {
        Ok(flow) => flow,
        Err(err) => {
            error!("could not build authorization request: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    let store = AuthorizationFlowStore::new(state.codec());
    if let Err(err) = store.save(&flow, &mut headers) {
        error!("could not save authorization request: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match flow.authorization_request_uri.parse() {
        Ok(location) => {
            headers.insert(LOCATION, location);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Provider callback: consume the stored flow, exchange the code, mint the
/// access-token cookie, redirect to the fixed post-login URI.
pub async fn callback(
    state: Extension<Arc<GatewayState>>,
    Query(params): Query<CallbackParams>,
    request_headers: HeaderMap,
) -> Response {
    let Some(oauth2) = state.config().login().oauth2().cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut headers = HeaderMap::new();
    let store = AuthorizationFlowStore::new(state.codec());
    let flow = match store.remove(&request_headers, &mut headers) {
        Ok(Some(flow)) => flow,
        Ok(None) => {
            info!("authorization callback without an in-flight request");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(err) => {
            error!("could not load authorization request: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // From here on `headers` carries the Set-Cookie clearing the consumed
    // flow cookie; every response must keep it.
    let (Some(code), Some(callback_state)) = (params.code.as_deref(), params.state.as_deref())
    else {
        info!("authorization callback missing code or state");
        return (StatusCode::UNAUTHORIZED, headers).into_response();
    };
    if callback_state != flow.state {
        info!("authorization callback state mismatch");
        return (StatusCode::UNAUTHORIZED, headers).into_response();
    }

    let token = match exchange_code(&oauth2, code).await {
        Ok(token) => token,
        Err(status) => return (status, headers).into_response(),
    };

    // Issued-at defaults to now, expiry to now + 1h when the endpoint says
    // nothing; the cookie carries the remaining seconds.
    let now = expiry::epoch_seconds_now();
    let expires_at = expiry::compute_access_window(
        now,
        DEFAULT_TOKEN_LIFETIME,
        token.expires_in.map(|seconds| now.saturating_add(seconds)),
        None,
    );
    let max_age = expires_at.saturating_sub(now);

    let sealed = match state.codec().seal(&token.access_token) {
        Ok(sealed) => sealed,
        Err(err) => {
            error!("could not seal access token: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, headers).into_response();
        }
    };
    let Ok(cookie) = cookies::build(cookies::ACCESS_TOKEN_COOKIE, &sealed, max_age) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, headers).into_response();
    };
    headers.append(SET_COOKIE, cookie);

    match oauth2.post_login_redirect_uri.parse() {
        Ok(location) => {
            headers.insert(LOCATION, location);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn build_flow(oauth2: &OAuth2LoginConfig) -> anyhow::Result<AuthorizationFlowRecord> {
    let state_token = generate_state_token()?;
    let scopes: BTreeSet<String> = oauth2.scopes.iter().cloned().collect();

    let mut authorization_request = url::Url::parse(&oauth2.authorization_uri)?;
    authorization_request
        .query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &oauth2.client_id)
        .append_pair("redirect_uri", &oauth2.redirect_uri)
        .append_pair(
            "scope",
            &oauth2.scopes.join(" "),
        )
        .append_pair("state", &state_token);

    Ok(AuthorizationFlowRecord {
        authorization_uri: oauth2.authorization_uri.clone(),
        response_type: ResponseType::code(),
        client_id: oauth2.client_id.clone(),
        redirect_uri: oauth2.redirect_uri.clone(),
        scopes,
        state: state_token,
        additional_parameters: BTreeMap::new(),
        authorization_request_uri: authorization_request.to_string(),
        attributes: BTreeMap::from([(
            "registration_id".to_string(),
            oauth2.provider.clone(),
        )]),
        grant_type: GrantType::authorization_code(),
    })
}

/// Exchange the authorization code for an access token, authenticating the
/// client with Basic `base64(client_id:client_secret)`.
async fn exchange_code(
    oauth2: &OAuth2LoginConfig,
    code: &str,
) -> Result<TokenEndpointResponse, StatusCode> {
    use secrecy::ExposeSecret;

    let client = match Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            error!("could not build token exchange client: {err}");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let response = match client
        .post(&oauth2.token_uri)
        .basic_auth(&oauth2.client_id, Some(oauth2.client_secret.expose_secret()))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", oauth2.redirect_uri.as_str()),
        ])
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            error!("token endpoint unreachable: {err}");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let status = response.status();
    if !status.is_success() {
        info!("token endpoint rejected the code exchange: {status}");
        return Err(StatusCode::UNAUTHORIZED);
    }

    response.json().await.map_err(|err| {
        error!("could not decode token endpoint response: {err}");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn generate_state_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| anyhow::anyhow!("could not generate state token: {err}"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
