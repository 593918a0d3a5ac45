//! Classic-auth bridge: turns the encrypted `username:password` cookie into
//! a standard `Authorization: Basic` header on the forwarded request.
//!
//! When both a classic-auth cookie and an OAuth2 access-token cookie are
//! present, OAuth2 wins: the classic cookie is cleared on the response and
//! the request passes through untouched. That is a conflict worth logging,
//! not an error.

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use tracing::{error, warn};

use super::{cookies, crypto::TokenCodec, state::GatewayState};

/// What the bridge decided for one request.
#[derive(Debug, PartialEq, Eq)]
enum BridgeDecision {
    /// No classic cookie; nothing to do.
    PassThrough,
    /// Classic and OAuth2 cookies both present; OAuth2 wins, clear classic.
    OAuth2Precedence,
    /// Only the classic cookie; inject this `Authorization` value.
    InjectBasic(HeaderValue),
    /// Classic cookie present but undecryptable.
    Reject,
}

fn evaluate(headers: &HeaderMap, codec: &TokenCodec) -> BridgeDecision {
    let Some(classic) = cookies::get(headers, cookies::CLASSIC_AUTH_COOKIE) else {
        return BridgeDecision::PassThrough;
    };

    if cookies::get(headers, cookies::ACCESS_TOKEN_COOKIE).is_some() {
        warn!(
            cookie = cookies::CLASSIC_AUTH_COOKIE,
            "classic-auth cookie present alongside an OAuth2 cookie; OAuth2 takes precedence"
        );
        return BridgeDecision::OAuth2Precedence;
    }

    let Ok(credentials) = codec.open(&classic) else {
        error!(
            cookie = cookies::CLASSIC_AUTH_COOKIE,
            "classic-auth cookie could not be decrypted"
        );
        return BridgeDecision::Reject;
    };

    let encoded = STANDARD.encode(credentials.as_bytes());
    match HeaderValue::from_str(&format!("Basic {encoded}")) {
        Ok(value) => BridgeDecision::InjectBasic(value),
        Err(_) => BridgeDecision::Reject,
    }
}

/// Per-request middleware stage; runs before bearer token resolution.
pub async fn classic_auth_bridge(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match evaluate(request.headers(), state.codec()) {
        BridgeDecision::PassThrough => next.run(request).await,
        BridgeDecision::OAuth2Precedence => {
            let mut response = next.run(request).await;
            if let Ok(cleared) = cookies::clear(cookies::CLASSIC_AUTH_COOKIE) {
                response.headers_mut().append(SET_COOKIE, cleared);
            }
            response
        }
        BridgeDecision::InjectBasic(value) => {
            request.headers_mut().insert(AUTHORIZATION, value);
            next.run(request).await
        }
        BridgeDecision::Reject => StatusCode::UNAUTHORIZED.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::crypto::{CipherKey, SymmetricCipherBox};
    use axum::http::header::COOKIE;

    fn codec() -> TokenCodec {
        let key = CipherKey::from_secret("0123456789abcdef0123456789abcdef").expect("valid key");
        TokenCodec::new(SymmetricCipherBox::new(key))
    }

    fn headers_with_cookies(pairs: &[(&str, &str)]) -> HeaderMap {
        let joined = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&joined).expect("cookie"));
        headers
    }

    #[test]
    fn no_classic_cookie_passes_through() {
        let codec = codec();
        assert_eq!(
            evaluate(&HeaderMap::new(), &codec),
            BridgeDecision::PassThrough
        );
    }

    #[test]
    fn oauth2_cookie_takes_precedence() {
        let codec = codec();
        let classic = codec.seal("alice:secret").expect("seal");
        let headers = headers_with_cookies(&[
            (cookies::CLASSIC_AUTH_COOKIE, &classic),
            (cookies::ACCESS_TOKEN_COOKIE, "whatever"),
        ]);
        assert_eq!(evaluate(&headers, &codec), BridgeDecision::OAuth2Precedence);
    }

    #[test]
    fn classic_only_injects_basic_header() {
        let codec = codec();
        let classic = codec.seal("alice:secret").expect("seal");
        let headers = headers_with_cookies(&[(cookies::CLASSIC_AUTH_COOKIE, &classic)]);

        let BridgeDecision::InjectBasic(value) = evaluate(&headers, &codec) else {
            panic!("expected Basic header injection");
        };
        let text = value.to_str().expect("ascii");
        let encoded = text.strip_prefix("Basic ").expect("Basic prefix");
        let decoded = STANDARD.decode(encoded).expect("base64");
        assert_eq!(decoded, b"alice:secret");
    }

    #[test]
    fn undecryptable_classic_cookie_rejects() {
        let codec = codec();
        let headers = headers_with_cookies(&[(cookies::CLASSIC_AUTH_COOKIE, "bm90LXZhbGlk")]);
        assert_eq!(evaluate(&headers, &codec), BridgeDecision::Reject);
    }
}
