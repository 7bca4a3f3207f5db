use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use session_warden::{AppState, CdpPage, CookieRecord};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn port_from_env() -> Option<u16> {
    for k in ["SESSION_WARDEN_PORT", "PORT"] {
        if let Ok(v) = std::env::var(k) {
            if let Ok(p) = v.trim().parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting session-warden");

    let config = session_warden::load_warden_config();
    let state = Arc::new(AppState::new(&config));

    if let Err(e) = url::Url::parse(&state.login_url) {
        warn!(
            "Configured login URL '{}' is not a valid URL ({}); /login/reopen will fail to navigate",
            state.login_url, e
        );
    }

    if !state.session.browser_available() {
        warn!(
            "No Chrome/Chromium executable found — status queries will run from cookies alone \
             and login-window reopens will fail until CHROME_EXECUTABLE is set"
        );
    }

    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/status", get(status_handler))
        .route("/cookies", post(ingest_cookies_handler))
        .route("/cookies/capture", post(capture_cookies_handler))
        .route("/session/cookies", post(load_session_cookies_handler))
        .route("/login/reopen", post(reopen_login_handler))
        .route("/gate/reset", post(gate_reset_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let port: u16 = parse_port_from_args().or_else(port_from_env).unwrap_or(5600);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/SESSION_WARDEN_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("session-warden listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    state.session.close().await;
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "session-warden",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Unified login status, projected into the shape the UI layer consumes.
/// DOM corroboration is included only when a live page already exists — a
/// status query never launches a browser.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let verdict = match state.session.current_page().await {
        Some(page) => {
            let dom = CdpPage::new(page);
            state.resolver.resolve(Some(&dom)).await
        }
        None => state.resolver.resolve(None).await,
    };
    Json(verdict.to_status())
}

#[derive(Deserialize)]
struct IngestRequest {
    cookies: Vec<CookieRecord>,
}

/// Cookie ingestion: raw name/value (+ optional attribute) records, e.g.
/// pasted from a devtools session. Minimal validation, then a full-replace
/// store save.
async fn ingest_cookies_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    for cookie in &request.cookies {
        if let Err(e) = cookie.validate() {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            ));
        }
    }

    if let Err(e) = state.cookie_store.save(&request.cookies) {
        error!("Cookie ingest save failed: {}", e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ));
    }

    info!("Ingested {} cookies", request.cookies.len());
    Ok(Json(serde_json::json!({ "saved": request.cookies.len() })))
}

/// Persist the live browser context's cookies, replacing the stored set —
/// the "save what the login window just earned" half of the cookie lifecycle.
async fn capture_cookies_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let cookies = state.session.session_cookies().await.map_err(|e| {
        (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;
    state.cookie_store.save(&cookies).map_err(|e| {
        error!("Cookie capture save failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;
    info!("Captured {} cookies from live session", cookies.len());
    Ok(Json(serde_json::json!({ "saved": cookies.len() })))
}

/// Push the stored cookie set into the live browser context (full replace).
async fn load_session_cookies_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let cookies = state.cookie_store.load_or_empty().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;
    let loaded = state.session.load_cookies(&cookies).await.map_err(|e| {
        (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(serde_json::json!({ "loaded": loaded })))
}

#[derive(Deserialize, Default)]
struct ReopenRequest {
    #[serde(default)]
    caller: Option<String>,
    #[serde(default)]
    force_foreground: bool,
}

/// Reopen a visible login window, guarded by the process-wide gate. A caller
/// rejected by the gate treats the window as already being handled.
async fn reopen_login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReopenRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let caller = request.caller.unwrap_or_else(|| "http-api".to_string());

    if !state.gate.try_acquire(&caller) {
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "a login-window reopen is already in progress or cooling down",
                "reopening": state.gate.is_reopening(),
            })),
        ));
    }

    let result = state
        .session
        .ensure_visible_session(&state.login_url, request.force_foreground)
        .await;

    match result {
        Ok(handle) => {
            state.gate.release(&caller, true);
            // A fresh window with the persistent profile may already carry a
            // valid session; report the verdict so the caller can skip login.
            let dom = handle.dom();
            let verdict = state.resolver.resolve(Some(&dom)).await;
            Ok(Json(serde_json::json!({
                "opened": true,
                "loginUrl": state.login_url,
                "status": verdict.to_status(),
            })))
        }
        Err(e) => {
            state.gate.release(&caller, false);
            error!("Login window reopen failed: {}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": e.to_string() })),
            ))
        }
    }
}

/// Administrative escape hatch for a wedged gate.
async fn gate_reset_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.gate.force_reset();
    Json(serde_json::json!({ "reset": true }))
}
