use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    anyhow::Context,
    axum::{
        Router,
        body::Body,
        extract::{Query, Request, State},
        http::{HeaderValue, Method, StatusCode, header},
        middleware::{self, Next},
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    bytes::Bytes,
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{debug, info, warn},
};

use {
    sigline_config::SiglineConfig,
    sigline_mcp::{RouteError, RouteReply},
};

use crate::{
    retention::spawn_retention, services::GatewayServices, sink::ChannelSink,
    state::GatewayState,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// A routing failure rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError(pub RouteError);

impl From<RouteError> for ApiError {
    fn from(e: RouteError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0.status(), Json(self.0.to_body())).into_response()
    }
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
///
/// The follow-up path comes from the session router's config so the
/// announced endpoint and the mounted route cannot disagree.
pub fn build_gateway_app(state: Arc<GatewayState>, sse_path: &str) -> Router {
    let message_path = state.router.config().message_path.clone();
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route(sse_path, get(sse_handler))
        .route(&message_path, post(message_handler))
        .route("/health", get(health_handler));

    #[cfg(feature = "prometheus")]
    let router = router.route(
        "/metrics",
        get(crate::metrics_routes::prometheus_metrics_handler),
    );

    #[cfg(feature = "metrics")]
    let router = router.route_layer(middleware::from_fn(
        crate::metrics_middleware::http_metrics_middleware,
    ));

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors_preflight))
        .with_state(AppState { gateway: state })
}

/// Start the HTTP server and run until ctrl-c / SIGTERM.
pub async fn start_gateway(config: SiglineConfig) -> anyhow::Result<()> {
    #[cfg(feature = "metrics")]
    let metrics_handle = sigline_metrics::init_metrics(sigline_metrics::MetricsRecorderConfig {
        enabled: true,
        global_labels: Vec::new(),
    })?;

    let services = GatewayServices::from_config(&config).await?;
    let router = services.session_router(&config);

    #[cfg(feature = "metrics")]
    let state = GatewayState::with_metrics(Arc::clone(&router), metrics_handle);
    #[cfg(not(feature = "metrics"))]
    let state = GatewayState::new(Arc::clone(&router));

    let background = CancellationToken::new();
    let retention = spawn_retention(
        Arc::clone(&services.history),
        config.history.retention_days,
        Duration::from_secs(config.history.prune_interval_secs.max(1)),
        background.clone(),
    );

    let app = build_gateway_app(state, &config.server.sse_path);
    let bind = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(bind.as_str())
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(
        addr = %listener.local_addr()?,
        sse = %config.server.sse_path,
        message = %config.server.message_path,
        "sigline gateway listening"
    );

    let shutdown_router = Arc::clone(&router);
    let shutdown_background = background.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown requested");
            shutdown_background.cancel();
            // Open event streams never finish on their own; ending them lets
            // the server drain.
            shutdown_router.shutdown();
        })
        .await?;

    background.cancel();
    if let Err(e) = retention.await {
        warn!(error = %e, "retention task ended abnormally");
    }
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Answer every `OPTIONS` with 204 and permissive CORS headers, before
/// routing, so preflights work on any path.
async fn cors_preflight(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }
    let requested_headers = request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned();

    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        requested_headers.unwrap_or_else(|| HeaderValue::from_static("content-type")),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
        "sessions": state.gateway.session_count(),
        "uptime_secs": state.gateway.started_at.elapsed().as_secs(),
    }))
}

/// Open a session. The response body is the session's event stream.
async fn sse_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (sink, body) = ChannelSink::new();
    let sink = Arc::new(sink);
    let session_id = state.gateway.router.open_session(sink.clone())?;
    debug!(%session_id, "event stream attached");

    let mut response = Response::new(Body::from_stream(body));
    *response.headers_mut() = sink.headers();
    Ok(response)
}

/// Route a follow-up to its session.
async fn message_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let session_id = params.get("sessionId").map(String::as_str);
    let reply = state.gateway.router.route_request(session_id, &body)?;
    let status = reply.status();
    Ok(match reply {
        RouteReply::Accepted => (status, "Accepted").into_response(),
        RouteReply::Immediate(value) => (status, Json(value)).into_response(),
    })
}
