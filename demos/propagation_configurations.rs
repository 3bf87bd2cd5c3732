//! Different propagation configuration examples
//!
//! This example demonstrates strict validation, custom span sinks and the
//! outbound client layer that carries the trace context to downstream calls

use std::convert::Infallible;
use std::sync::Arc;

use axum::{body::Body, http::Request, http::Response, routing::get, Router};
use tower::{service_fn, Layer, ServiceExt};
use trace_context::{
    InMemoryExporter, PropagationConfig, PropagationLayer, SimpleSpanSink, TraceClientLayer,
    TraceScope,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Collect finished spans in memory so we can inspect them
    let exporter = InMemoryExporter::new();
    let sink = Arc::new(SimpleSpanSink::new(Arc::new(exporter.clone())));

    // Explicit configuration: every collaborator is injected here,
    // there is no process-wide mutable state
    let config = PropagationConfig {
        span_sink: Some(sink),
        // Flip to true to reject requests with malformed trace headers
        strict: false,
        ..PropagationConfig::default()
    };

    let app = Router::new()
        .route("/", get(handler))
        .layer(PropagationLayer::with_config(config));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();

    tracing::info!("Starting server on 0.0.0.0:3000");
    axum::serve(listener, app).await.unwrap();
}

async fn handler(scope: TraceScope) -> String {
    tracing::info!("Handling request in handler");
    call_service(&scope).await;
    format!("Hello! Your trace ID is: {}", scope.trace_id())
}

/// Simulated downstream call through the outbound client layer
async fn call_service(scope: &TraceScope) {
    let backend = service_fn(|req: Request<Body>| async move {
        // A real client would send the request over the wire here
        tracing::info!(
            traceparent = ?req.headers().get("traceparent"),
            "Calling external service"
        );
        Ok::<_, Infallible>(Response::new(Body::empty()))
    });

    let client = TraceClientLayer::new().layer(backend);
    let mut request = Request::builder()
        .uri("http://downstream/")
        .body(Body::empty())
        .unwrap();
    // Forward the current scope explicitly onto the outbound request
    request.extensions_mut().insert(scope.clone());

    if let Err(err) = client.oneshot(request).await {
        tracing::warn!(error = ?err, "downstream call failed");
    }
}
