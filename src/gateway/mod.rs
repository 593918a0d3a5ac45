//! Gateway core: request pipeline, routes, and the serve loop.
//!
//! Pipeline order for every request: port access guard → classic-auth
//! bridge → (protected paths only) bearer resolution and validation →
//! principal established → downstream dispatch.

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod authn;
pub mod classic;
pub mod cookies;
pub mod crypto;
pub mod expiry;
pub mod flow;
pub mod handlers;
pub mod introspect;
pub mod jwt;
pub mod port_guard;
pub mod principal;
pub mod redirect;
pub mod resolver;
pub mod state;

use port_guard::ServedPort;
use state::GatewayState;

/// Compose the full application router around a downstream router.
///
/// The downstream carries the actual service; everything it serves sits
/// behind bearer authentication. Login and health endpoints stay public
/// (the port guard still applies to them).
pub fn router(gateway: Arc<GatewayState>, downstream: Router) -> Router {
    let login = gateway.config().login();

    let mut public = Router::new().route("/health", get(handlers::health));
    if login.is_enabled() {
        public = public.route(
            login.login_page(),
            get(handlers::login_page).post(handlers::classic_login),
        );
        if login.oauth2().is_some() {
            public = public
                .route("/oauth2/authorize", get(handlers::authorize))
                .route("/login/oauth2/code", get(handlers::callback));
        }
    }

    let protected =
        downstream.layer(from_fn_with_state(gateway.clone(), authn::require_bearer_principal));

    public.merge(protected).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(ServedPort(gateway.config().port())))
            .layer(from_fn_with_state(
                gateway.config().port(),
                port_guard::port_access_guard,
            ))
            .layer(from_fn_with_state(
                gateway.clone(),
                classic::classic_auth_bridge,
            ))
            .layer(Extension(gateway)),
    )
}

/// Start the gateway.
/// # Errors
/// Returns an error when a listener cannot bind or the server fails.
pub async fn new(gateway: Arc<GatewayState>, downstream: Router) -> Result<()> {
    let port = gateway.config().port();

    if let Some(management_port) = gateway.config().management_port() {
        let health = management_router(management_port);

        let listener = TcpListener::bind(format!("::0:{management_port}")).await?;

        info!("Management listening on [::]:{}", management_port);

        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, health.into_make_service()).await {
                tracing::error!("management listener failed: {}", error);
            }
        });
    }

    let app = router(gateway, downstream);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Router for the optional management listener: health only, anything else
/// is refused the same way the port guard refuses wrong-port API traffic.
fn management_router(port: u16) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .fallback(|| async { StatusCode::FORBIDDEN })
        .layer(Extension(ServedPort(port)))
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[tokio::test]
    async fn management_router_serves_health() {
        let response = management_router(9090)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn management_router_forbids_everything_else() {
        for path in ["/whoami", "/login", "/oauth2/authorize"] {
            let response = management_router(9090)
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
    }
}
