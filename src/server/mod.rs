// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP server for the operator console login.
//!
//! # Endpoints
//!
//! - `POST /api/session` - Log in, returns the signed session and sets the cookie
//! - `GET /api/session` - Status of the session named by the cookie
//! - `DELETE /api/session` - Log out, revokes the session and clears the cookie
//! - `GET /health` - Health check
//!
//! Everything else is served from `static_dir` when one is configured.
//!
//! # Example
//!
//! ```no_run
//! use authyntic::config::{AuthConfig, ServerConfig};
//! use authyntic::server::Server;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = Server::new(ServerConfig::default(), AuthConfig::default());
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, ConnectInfo, DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::clock::{Clock, SystemClock};
use crate::config::{AuthConfig, ServerConfig};
use crate::errors::AuthError;
use crate::login::{LoginOrchestrator, LoginRequest};
use crate::security::csrf::CSRF_HEADER;

/// Requests taking longer than this are answered with 408.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Key used for rate limiting when the peer address is unavailable.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Server state shared across handlers.
#[derive(Debug)]
pub struct AppState {
    pub login: LoginOrchestrator,
}

impl AppState {
    pub fn new(auth: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let users = Arc::new(auth.user_registry());
        Self {
            login: LoginOrchestrator::from_config(auth, users, clock),
        }
    }
}

/// API server configuration.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    auth: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl Server {
    /// By default, binds to 127.0.0.1 (localhost only).
    pub fn new(config: ServerConfig, auth: AuthConfig) -> Self {
        Self {
            config,
            auth,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use "0.0.0.0" to allow network access, "127.0.0.1" (default) for localhost only.
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_address = addr.into();
        self
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn build_state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(&self.auth, self.clock.clone()))
    }

    /// Build the router around fresh state.
    pub fn build_router(&self) -> Router {
        self.build_router_with_state(self.build_state())
    }

    /// Build the router around existing state, so callers can inspect it.
    pub fn build_router_with_state(&self, state: Arc<AppState>) -> Router {
        let api = Router::new()
            .route(
                "/api/session",
                post(login_handler).get(status_handler).delete(logout_handler),
            )
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ))
            .layer(cors_layer(&self.auth.allowed_origins));

        let mut app = Router::new().route("/health", get(health_handler)).merge(api);
        if let Some(dir) = &self.config.static_dir {
            app = app.fallback_service(ServeDir::new(dir));
        }

        app.layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the server with graceful shutdown on SIGINT/SIGTERM.
    pub async fn start(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);

        if self.config.bind_address == "0.0.0.0" {
            tracing::warn!(
                "Server is binding to 0.0.0.0 which exposes the login endpoint to the network. \
                Use 127.0.0.1 (default) for local-only access."
            );
        }

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                anyhow::anyhow!(
                    "Port {} is already in use. \
                    Another authyntic server may be running; stop it or pick a different port with --port <PORT>",
                    self.config.port
                )
            } else {
                anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
            }
        })?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.auth.validate().context("invalid auth configuration")?;
        if self.auth.uses_demo_secrets() {
            tracing::warn!(
                "Using the built-in demo pepper or session secret. \
                Set AUTHYNTIC_PEPPER and AUTHYNTIC_SESSION_SECRET before deploying."
            );
        }
        if !self.auth.cookie_secure {
            tracing::warn!("Session cookie is not marked Secure; enable cookie_secure when serving over TLS");
        }

        let router = self.build_router();
        let local = listener.local_addr().context("listener has no local address")?;
        tracing::info!("Starting server on {}", local);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(CSRF_HEADER)])
}

/// Rate-limit key for the peer.
fn client_key(connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn session_cookie<'a>(state: &AppState, headers: &'a HeaderMap) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|raw| state.login.cookies().read(raw))
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    active_sessions: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionStatus {
    active: bool,
    expires_at: Option<u64>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.login.sessions().active_count(),
    })
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let client_key = client_key(connect_info);
    let csrf_header = headers.get(CSRF_HEADER).and_then(|value| value.to_str().ok());

    // An oversized or truncated body still goes through the rate check.
    let body = match body {
        Ok(bytes) => Some(bytes),
        Err(rejection) => {
            tracing::debug!(status = %rejection.status(), "login body unreadable: {}", rejection);
            None
        }
    };

    let request = LoginRequest {
        client_key: &client_key,
        csrf_header,
        body: body.as_deref(),
    };

    match state.login.login(request).await {
        Ok(success) => match HeaderValue::from_str(&success.cookie) {
            Ok(cookie) => {
                let mut response = Json(&success.signed).into_response();
                response.headers_mut().insert(header::SET_COOKIE, cookie);
                response
            }
            Err(e) => {
                tracing::error!("Session cookie is not a valid header value: {}", e);
                state.login.sessions().revoke(&success.signed.session.session_id);
                AuthError::Internal.into_response()
            }
        },
        Err(err) => err.into_response(),
    }
}

async fn status_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<SessionStatus> {
    let registry = state.login.sessions();
    let entry = session_cookie(&state, &headers)
        .filter(|id| registry.is_active(id))
        .and_then(|id| registry.get(id));

    Json(SessionStatus {
        active: entry.is_some(),
        expires_at: entry.map(|entry| entry.expires_at),
    })
}

async fn logout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(session_id) = session_cookie(&state, &headers) {
        state.login.sessions().revoke(session_id);
    }

    let clear = state.login.cookies().clear();
    match HeaderValue::from_str(&clear) {
        Ok(cookie) => (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Wait for a shutdown signal.
async fn shutdown_signal() {
    // On Unix, listen for SIGINT and SIGTERM
    // On Windows, fall back to Ctrl+C only
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                    }
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Failed to install signal handlers ({}), falling back to Ctrl+C", e);
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown..."),
        Err(e) => {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
