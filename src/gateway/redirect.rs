//! Post-login redirect validation.
//!
//! Only relative paths rooted at `/` are accepted. Absolute URIs,
//! protocol-relative forms, and anything malformed are rejected outright so
//! users can never be redirected to an attacker-controlled domain.

use thiserror::Error;
use url::form_urlencoded;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedirectError {
    #[error("redirect target must be a relative path starting with '/'")]
    NotRelative,
    #[error("redirect target is malformed")]
    Malformed,
}

/// Validate a caller-supplied redirect target and re-serialize its query.
///
/// Accepts `/dashboard?x=1`, rejects `https://evil.example/x` and
/// `//evil.example`. Query parameters are re-encoded URL-safe onto the
/// validated path.
///
/// # Errors
/// Returns a [`RedirectError`] for any non-relative or malformed target;
/// callers map this to a client error, never to a silent default.
pub fn validate_redirect(target: &str) -> Result<String, RedirectError> {
    if !target.starts_with('/') || target.starts_with("//") {
        return Err(RedirectError::NotRelative);
    }
    // A path that parses as an absolute URL is smuggling a scheme.
    if url::Url::parse(target).is_ok() {
        return Err(RedirectError::NotRelative);
    }
    if target.contains('\\') || target.contains(|c: char| c.is_ascii_control()) {
        return Err(RedirectError::Malformed);
    }
    // Not valid in a URI path or query; also the characters that would
    // break out of an HTML attribute when the target is echoed back.
    if target.contains(['"', '\'', '<', '>', '`']) {
        return Err(RedirectError::Malformed);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    match query {
        None | Some("") => Ok(path.to_string()),
        Some(query) => {
            let encoded: String = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form_urlencoded::parse(query.as_bytes()))
                .finish();
            Ok(format!("{path}?{encoded}"))
        }
    }
}

/// Append one more query parameter to an already-validated target.
#[must_use]
pub fn append_query_param(target: &str, key: &str, value: &str) -> String {
    let encoded: String = form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    if target.contains('?') {
        format!("{target}&{encoded}")
    } else {
        format!("{target}?{encoded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_rooted_path_with_query() {
        assert_eq!(
            validate_redirect("/dashboard?x=1"),
            Ok("/dashboard?x=1".to_string())
        );
        assert_eq!(validate_redirect("/"), Ok("/".to_string()));
    }

    #[test]
    fn rejects_absolute_uri() {
        assert_eq!(
            validate_redirect("https://evil.example/x"),
            Err(RedirectError::NotRelative)
        );
    }

    #[test]
    fn rejects_protocol_relative() {
        assert_eq!(
            validate_redirect("//evil.example"),
            Err(RedirectError::NotRelative)
        );
    }

    #[test]
    fn rejects_backslash_and_control_characters() {
        assert_eq!(
            validate_redirect("/dash\\board"),
            Err(RedirectError::Malformed)
        );
        assert_eq!(
            validate_redirect("/dash\nboard"),
            Err(RedirectError::Malformed)
        );
    }

    #[test]
    fn rejects_html_breaking_characters() {
        assert_eq!(
            validate_redirect(r#"/x"><script>alert(1)</script>"#),
            Err(RedirectError::Malformed)
        );
        for target in ["/x\"y", "/x'y", "/x<y", "/x>y", "/x`y"] {
            assert_eq!(validate_redirect(target), Err(RedirectError::Malformed));
        }
    }

    #[test]
    fn rejects_empty_and_relative_forms() {
        assert_eq!(validate_redirect(""), Err(RedirectError::NotRelative));
        assert_eq!(
            validate_redirect("dashboard"),
            Err(RedirectError::NotRelative)
        );
    }

    #[test]
    fn reencodes_query_parameters() {
        assert_eq!(
            validate_redirect("/search?q=a b&lang=de"),
            Ok("/search?q=a+b&lang=de".to_string())
        );
    }

    #[test]
    fn append_query_param_handles_both_forms() {
        assert_eq!(
            append_query_param("/index", "theme", "dark"),
            "/index?theme=dark"
        );
        assert_eq!(
            append_query_param("/index?x=1", "theme", "dark"),
            "/index?x=1&theme=dark"
        );
    }
}
