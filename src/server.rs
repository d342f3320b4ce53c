//! Portal HTTP server
//!
//! Endpoints:
//!   GET /open?id=..&password=..  - Load a project, then return the host page
//!   GET /healthz                 - Liveness probe
//!   {scope prefix}{session}/*    - Answered by the interceptor
//!
//! Each successful `/open` gets its own session token; the host page is the
//! only place that token is disclosed.
//!
//! Every request passes the interception middleware first; only requests
//! outside the scope reach normal routing.

use crate::config::{Config, HandoffConfig};
use crate::error::{Error, Result};
use crate::interceptor::{Interception, Interceptor, InterceptorHandle, VirtualResponse};
use crate::pipeline::{Pipeline, PortalSession};
use crate::source::ConfiguredSource;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode, Uri},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Header set by a TLS-terminating proxy
const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Shared state for the portal server
#[derive(Clone)]
pub struct PortalState {
    source: Arc<ConfiguredSource>,
    interceptor: InterceptorHandle,
    handoff: HandoffConfig,
    trust_forwarded_proto: bool,
}

impl PortalState {
    pub fn new(
        source: Arc<ConfiguredSource>,
        interceptor: InterceptorHandle,
        handoff: HandoffConfig,
        trust_forwarded_proto: bool,
    ) -> Self {
        PortalState {
            source,
            interceptor,
            handoff,
            trust_forwarded_proto,
        }
    }
}

/// Construct the router with all portal routes and the interception layer
pub fn build_router(state: PortalState) -> Router {
    Router::new()
        .route("/open", get(open_handler))
        .route("/healthz", get(healthz_handler))
        .fallback(fallback_handler)
        .layer(middleware::from_fn_with_state(state.clone(), intercept_layer))
        .with_state(state)
}

/// Serve the portal on the configured address until interrupted
pub async fn serve(config: Config) -> Result<()> {
    let scope = config.scope()?;
    let source = ConfiguredSource::from_config(&config.source)?;
    let (interceptor, task) = Interceptor::spawn(scope);

    let state = PortalState::new(
        Arc::new(source),
        interceptor,
        config.handoff.clone(),
        config.server.trust_forwarded_proto,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .map_err(|e| Error::Config(format!("bind {}: {}", config.server.listen, e)))?;

    info!(
        "Portal listening on {} (scope {}, source {})",
        config.server.listen, config.scope.prefix, config.source.location
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    task.abort();
    info!("Portal stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received interrupt, shutting down");
    }
}

async fn intercept_layer(State(state): State<PortalState>, request: Request, next: Next) -> Response {
    match state.interceptor.intercept(request.uri().path()).await {
        Interception::Passthrough => next.run(request).await,
        Interception::Respond(response) => virtual_response(response),
    }
}

fn virtual_response(response: VirtualResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}

async fn open_handler(State(state): State<PortalState>, headers: HeaderMap, uri: Uri) -> Response {
    let url = page_url(&headers, &uri, state.trust_forwarded_proto);
    let pipeline = Pipeline::new(state.source.clone(), state.interceptor.clone(), state.handoff.clone());

    match pipeline.run(&url).await {
        Ok(session) => host_page(&session),
        Err(e) => error_page(&e),
    }
}

/// Liveness probe: returns 200 while the interceptor task is running
async fn healthz_handler(State(state): State<PortalState>) -> impl IntoResponse {
    if state.interceptor.is_alive() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "interceptor stopped")
    }
}

async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    debug!("No route for {}", uri.path());
    (StatusCode::NOT_FOUND, "Not found")
}

/// Reconstruct the URL the viewer loaded
///
/// The scheme comes from `X-Forwarded-Proto` only when the proxy is trusted;
/// otherwise the connection itself is plain HTTP.
fn page_url(headers: &HeaderMap, uri: &Uri, trust_forwarded_proto: bool) -> String {
    let forwarded = if trust_forwarded_proto {
        headers
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_ascii_lowercase())
    } else {
        None
    };
    let scheme = forwarded.unwrap_or_else(|| "http".to_string());

    let host = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown.invalid".to_string());

    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}://{}{}", scheme, host, path)
}

fn no_store_headers() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-store"),
        (header::REFERRER_POLICY, "no-referrer"),
    ]
}

fn host_page(session: &PortalSession) -> Response {
    let page = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{project}</title>
<style>html,body{{margin:0;height:100%}}iframe{{border:0;width:100%;height:100%}}</style>
</head>
<body>
<iframe src="{entry}" title="{project}" sandbox="allow-scripts allow-same-origin allow-forms allow-popups"></iframe>
</body>
</html>
"#,
        project = session.project_id,
        entry = session.entry_path,
    );
    (StatusCode::OK, no_store_headers(), Html(page)).into_response()
}

fn error_page(error: &Error) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let page = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Unable to open project</title></head>
<body>
<p role="alert">{}</p>
</body>
</html>
"#,
        error.user_message()
    );
    (status, no_store_headers(), Html(page)).into_response()
}
