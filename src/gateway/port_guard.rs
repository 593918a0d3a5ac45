//! Port access guard: requests must arrive on the configured port.
//!
//! The local socket port is not visible on the request itself, so each
//! listener stamps a [`ServedPort`] extension on the requests it serves.
//! The guard compares that stamp against the allowed port. Stateless, no
//! side effects.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

/// The port a listener accepted this request on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServedPort(pub u16);

fn allowed(served: Option<ServedPort>, allowed_port: u16) -> bool {
    served.is_some_and(|ServedPort(port)| port == allowed_port)
}

/// Per-request middleware stage; first in the pipeline.
pub async fn port_access_guard(
    State(allowed_port): State<u16>,
    request: Request,
    next: Next,
) -> Response {
    let served = request.extensions().get::<ServedPort>().copied();
    if allowed(served, allowed_port) {
        next.run(request).await
    } else {
        warn!(
            allowed_port,
            served_port = served.map(|ServedPort(port)| port),
            "request rejected by port access guard"
        );
        StatusCode::FORBIDDEN.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_port_is_allowed() {
        assert!(allowed(Some(ServedPort(8080)), 8080));
    }

    #[test]
    fn mismatched_port_is_forbidden() {
        assert!(!allowed(Some(ServedPort(9090)), 8080));
    }

    #[test]
    fn unstamped_request_is_forbidden() {
        assert!(!allowed(None, 8080));
    }
}
