//! HTTP surface
//!
//! Batch endpoints accept either a bare JSON list or an object wrapping
//! one, so both `["+155..."]` and `{"phones": ["+155..."]}` work.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use account_pool::{AccountsFile, BatchProcessor, IdentifierKind, Pool};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use telegram_bridge::LookupClient;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<Pool>,
    pub processor: Arc<BatchProcessor>,
    pub accounts_file: Arc<AccountsFile>,
    pub client: Arc<dyn LookupClient>,
    pub started_at: Instant,
    pub prometheus: PrometheusHandle,
}

pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/check_phones", post(check_phones))
        .route("/check_usernames", post(check_usernames))
        .route("/health", get(health))
        .route("/accounts/status", get(accounts_status))
        .route("/accounts/reload", post(accounts_reload))
        .route("/accounts/{name}/enable", post(account_enable))
        .route("/metrics", get(serve_metrics))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Ping every enabled account's session and flip its readiness accordingly.
/// Returns the number of accounts that came up ready.
pub async fn verify_sessions(pool: &Arc<Pool>, client: &Arc<dyn LookupClient>) -> usize {
    let mut ready = 0;
    for name in pool.enabled_accounts() {
        let Some(session) = pool.session_of(&name) else {
            continue;
        };
        match client.ping_session(&session).await {
            Ok(true) => {
                pool.set_ready(&name, true);
                ready += 1;
                info!(account = %name, "session verified");
            }
            Ok(false) => {
                pool.set_ready(&name, false);
                warn!(account = %name, "session not authorized");
            }
            Err(e) => {
                pool.set_ready(&name, false);
                warn!(account = %name, error = %e, "session verification failed");
            }
        }
    }
    ready
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum PhonesBody {
    Bare(Vec<String>),
    Object { phones: Vec<String> },
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum UsernamesBody {
    Bare(Vec<String>),
    Object { usernames: Vec<String> },
}

async fn check_phones(
    State(state): State<AppState>,
    Json(body): Json<PhonesBody>,
) -> Json<serde_json::Value> {
    let identifiers = match body {
        PhonesBody::Bare(ids) | PhonesBody::Object { phones: ids } => ids,
    };
    run_batch(&state, IdentifierKind::Phone, identifiers).await
}

async fn check_usernames(
    State(state): State<AppState>,
    Json(body): Json<UsernamesBody>,
) -> Json<serde_json::Value> {
    let identifiers = match body {
        UsernamesBody::Bare(ids) | UsernamesBody::Object { usernames: ids } => ids,
    };
    run_batch(&state, IdentifierKind::Username, identifiers).await
}

async fn run_batch(
    state: &AppState,
    kind: IdentifierKind,
    identifiers: Vec<String>,
) -> Json<serde_json::Value> {
    let batch_id = Uuid::new_v4();
    let mut seen = HashSet::new();
    let identifiers: Vec<String> = identifiers
        .into_iter()
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.clone()))
        .collect();

    info!(
        %batch_id,
        kind = kind.label(),
        count = identifiers.len(),
        "batch accepted"
    );

    let results = state.processor.process(kind, identifiers).await;
    let results: serde_json::Map<String, serde_json::Value> = results
        .into_iter()
        .map(|(id, outcome)| (id, outcome.to_json()))
        .collect();

    Json(json!({
        "batch_id": batch_id.to_string(),
        "count": results.len(),
        "results": results,
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.pool.status();
    let healthy = status.ready > 0;
    let body = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "accounts_total": status.total,
        "accounts_ready": status.ready,
        "accounts_available": status.available,
    });
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

async fn accounts_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(status_json(&state.pool))
}

/// Persist the in-memory counters, then re-read the accounts file and
/// replace the pool contents with it. Sessions of the new set are verified
/// before the response goes out.
async fn accounts_reload(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state
        .accounts_file
        .save(&state.pool.snapshot_for_save())
        .await
    {
        warn!(error = %e, "failed to persist accounts before reload");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("failed to persist accounts: {e}")})),
        );
    }

    match state.accounts_file.load().await {
        Ok(accounts) => {
            let count = accounts.len();
            state.pool.replace_accounts(accounts);
            let ready = verify_sessions(&state.pool, &state.client).await;
            info!(accounts = count, ready, "accounts reloaded");
            (StatusCode::OK, Json(status_json(&state.pool)))
        }
        Err(e) => {
            warn!(error = %e, "failed to reload accounts file");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("failed to reload accounts: {e}")})),
            )
        }
    }
}

async fn account_enable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.pool.set_enabled(&name, true) {
        Ok(()) => {
            info!(account = %name, "account re-enabled");
            (StatusCode::OK, Json(json!({"account": name, "enabled": true})))
        }
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({"error": format!("{e}")}))),
    }
}

async fn serve_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}

fn status_json(pool: &Arc<Pool>) -> serde_json::Value {
    serde_json::to_value(pool.status()).unwrap_or_else(|_| json!({"error": "internal error"}))
}
