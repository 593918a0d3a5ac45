//! Cookie transport contract shared by every credential scheme.
//!
//! All gateway cookies are `HttpOnly`, `Secure`, and scoped to the fixed
//! base path. Deletion is writing the same name with `Max-Age=0`.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

/// Encrypted `username:password` pair, classic-auth mode.
pub const CLASSIC_AUTH_COOKIE: &str = "CUSTODE_CLASSIC_AUTH_CREDENTIALS";

/// Encrypted raw OAuth2 access token.
pub const ACCESS_TOKEN_COOKIE: &str = "CUSTODE_OAUTH2_ACCESS_TOKEN";

/// Encrypted in-flight authorization request (short-lived).
pub const AUTHORIZATION_REQUEST_COOKIE: &str = "CUSTODE_OAUTH2_AUTHORIZATION_REQUEST";

/// Fixed base path for every gateway cookie.
pub const BASE_PATH: &str = "/";

/// Build a `Set-Cookie` value with the gateway's fixed attributes.
///
/// # Errors
/// Returns an error when the value contains characters invalid in a header.
pub fn build(name: &str, value: &str, max_age_seconds: i64) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{name}={value}; Path={BASE_PATH}; HttpOnly; Secure; Max-Age={max_age_seconds}"
    ))
}

/// Build a `Set-Cookie` value that deletes the named cookie.
///
/// # Errors
/// Returns an error when the name contains characters invalid in a header.
pub fn clear(name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{name}=; Path={BASE_PATH}; HttpOnly; Secure; Max-Age=0"
    ))
}

/// Read a cookie value from the request `Cookie` header.
#[must_use]
pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == name {
            return Some(val.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn build_sets_fixed_attributes() {
        let cookie = build("NAME", "value", 60).expect("header value");
        let text = cookie.to_str().expect("ascii");
        assert_eq!(text, "NAME=value; Path=/; HttpOnly; Secure; Max-Age=60");
    }

    #[test]
    fn clear_expires_immediately() {
        let cookie = clear("NAME").expect("header value");
        let text = cookie.to_str().expect("ascii");
        assert!(text.starts_with("NAME=;"));
        assert!(text.ends_with("Max-Age=0"));
    }

    #[test]
    fn get_finds_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("a=1; CUSTODE_OAUTH2_ACCESS_TOKEN=abc==; b=2"),
        );
        assert_eq!(
            get(&headers, ACCESS_TOKEN_COOKIE),
            Some("abc==".to_string())
        );
        assert_eq!(get(&headers, "missing"), None);
    }

    #[test]
    fn get_none_without_cookie_header() {
        let headers = HeaderMap::new();
        assert_eq!(get(&headers, ACCESS_TOKEN_COOKIE), None);
    }
}
