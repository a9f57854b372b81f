use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use link_pilot::core::config;
use link_pilot::session::{CdpSession, SessionOptions};
use link_pilot::types::*;
use link_pilot::{extract, runner, tabular, AppState};

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
    for k in ["LINK_PILOT_PORT", "PORT"] {
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

    info!("Starting link-pilot");

    let pilot_config = config::load_config();
    let state = Arc::new(AppState::new(pilot_config));

    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/analyze", post(analyze_handler))
        .route("/start", post(start_handler))
        .route("/stop", post(stop_handler))
        .route("/status", get(status_handler))
        .layer(DefaultBodyLimit::max(32 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let port: u16 = parse_port_from_args().or_else(port_from_env).unwrap_or(8080);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/LINK_PILOT_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("link-pilot listening on http://{}", bind_addr);

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
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
            _ = async {
                if let Some(ref mut s) = sigint {
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

    // Ask any live run to wind down; the runner closes its own session.
    state.request_stop();
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "link-pilot",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Accept raw spreadsheet bytes, extract links, and stage them for `/start`.
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnalyzeResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.log("📊 analyzing workbook…");
    let workbook = tabular::parse_workbook(&body).map_err(|e| {
        state.log(format!("❌ workbook analysis failed: {e}"));
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let policy = state.config.resolve_match_policy();
    let links = extract::extract_links(&workbook, policy);
    if links.is_empty() {
        state.log("❌ no links found in workbook");
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "no links found in workbook".to_string(),
            }),
        ));
    }

    state.log(format!(
        "🔗 found {} unique links across {} sheets",
        links.len(),
        workbook.sheets.len()
    ));
    let sample: Vec<String> = links.iter().take(5).cloned().collect();
    let count = links.len();
    state.stage_links(links);

    Ok(Json(AnalyzeResponse {
        count,
        links: sample,
    }))
}

/// Kick off a run over the staged links. Single-flight: a second start while
/// one is active is rejected, not queued.
async fn start_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StartResponse>, (StatusCode, Json<ErrorResponse>)> {
    let links = runner::try_begin(&state).map_err(|e| {
        (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let run = state.run_handle();
    let tuning = runner::Tuning::from_config(&state.config);
    let options = SessionOptions::from_config(&state.config);
    tokio::spawn(async move {
        runner::drive(
            move || async move { CdpSession::open(&options).await },
            links,
            run,
            tuning,
        )
        .await;
    });

    Ok(Json(StartResponse { accepted: true }))
}

/// Idempotent: flips the stop flag the runner checks between items.
async fn stop_handler(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    let active = state.run_state.lock().unwrap().status.is_active();
    state.request_stop();
    if active {
        state.log("⏹ stop requested");
    }
    Json(StopResponse { accepted: true })
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<RunSnapshot> {
    Json(state.run_state.lock().unwrap().snapshot())
}
