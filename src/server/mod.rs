//! Demo HTTP server: one protected route behind [`AuthPubTktLayer`] and an
//! open health check.

use crate::{
    cli::telemetry,
    pubtkt::{AuthPubTktLayer, MiddlewareError},
};
use anyhow::Result;
use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    routing::get,
    Router,
};
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, error, info, Span};
use ulid::Ulid;

mod handlers;

/// Build the application router, `/` guarded by `auth`.
#[must_use]
pub fn router(auth: AuthPubTktLayer) -> Router {
    let protected = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_escalation))
        .layer(auth);

    Router::new()
        .route("/", get(handlers::root::root).layer(protected))
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

/// Serve the router until ctrl-c.
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(port: u16, auth: AuthPubTktLayer) -> Result<()> {
    let app = router(auth);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    // Peer addresses feed the ticket ip check.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    telemetry::shutdown_tracer();

    Ok(())
}

async fn handle_escalation(err: MiddlewareError<Infallible>) -> (StatusCode, &'static str) {
    error!("ticket validation failed: {err}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, request_id)
}
