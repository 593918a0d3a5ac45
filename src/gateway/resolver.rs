//! Bearer token resolution: header first, encrypted cookie second,
//! sentinel last.
//!
//! The resolver never reports why a token is absent. Missing and malformed
//! credentials both resolve to the same sentinel, which the validation
//! stage rejects like any other invalid token. One uniform failure, no
//! information leak.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::trace;

use super::{cookies, crypto::TokenCodec};

/// Case-sensitive header prefix; the remainder is returned verbatim.
const BEARER_PREFIX: &str = "Bearer ";

/// Sentinel returned instead of an error. Downstream validation treats it
/// identically to any other invalid token.
pub const MISSING_TOKEN: &str = "missing-token";

/// Resolve the caller's bearer token from the `Authorization` header or,
/// failing that, from the encrypted access-token cookie.
#[must_use]
pub fn resolve(headers: &HeaderMap, codec: &TokenCodec) -> String {
    if let Some(token) = header_token(headers) {
        return token;
    }
    resolve_cookie_only(headers, codec)
}

/// Cookie-only variant for the access-token-only surface: no header
/// fallback, same sentinel semantics.
#[must_use]
pub fn resolve_cookie_only(headers: &HeaderMap, codec: &TokenCodec) -> String {
    let Some(value) = cookies::get(headers, cookies::ACCESS_TOKEN_COOKIE) else {
        trace!(
            cookie = cookies::ACCESS_TOKEN_COOKIE,
            "no access token cookie present"
        );
        return MISSING_TOKEN.to_string();
    };
    match codec.open(&value) {
        Ok(token) => token,
        Err(_) => {
            trace!(
                cookie = cookies::ACCESS_TOKEN_COOKIE,
                "access token cookie could not be opened"
            );
            MISSING_TOKEN.to_string()
        }
    }
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
