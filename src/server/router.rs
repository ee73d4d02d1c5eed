//! HTTP router and handlers

use std::sync::Arc;

use alpha_core::{AnalysisRequest, Grade, TokenRecord};
use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use crate::Error;
use crate::jobs::{AnalysisService, SubmitOutcome};
use crate::monitor::{FilterState, Monitor};
use crate::storage::TokenFeedReader;

/// Shared application state
pub struct AppState {
    /// Overlap feed reader
    pub reader: TokenFeedReader,
    /// Token monitor
    pub monitor: Arc<Monitor>,
    /// Whether the monitor refreshes on its own; otherwise every
    /// `/api/monitor` request refreshes it
    pub monitor_background: bool,
    /// Analysis submission, jobs and history
    pub analyses: Arc<AnalysisService>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tokens", get(tokens_handler))
        .route("/api/tokens/stats", get(stats_handler))
        .route("/api/monitor", get(monitor_handler))
        .route("/api/monitor/control", post(control_handler))
        .route(
            "/api/trader-roi",
            get(analyses_handler).post(submit_handler),
        )
        .route("/api/trader-roi/jobs", get(jobs_handler))
        .route("/api/trader-roi/jobs/{id}", get(job_handler))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body for write endpoints
fn error_response(err: &Error) -> Response {
    let status = err.status_code();
    let body = match err {
        Error::Backend { status, message } => json!({
            "error": err.to_string(),
            "backend_status": status,
            "message": message,
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, Json(body)).into_response()
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/tokens - the overlap feed as stored
async fn tokens_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.reader.load().await;
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(json!({
            "total_count": snapshot.tokens.len(),
            "tokens": snapshot.tokens,
            "last_updated": snapshot.last_updated,
            "data_source": snapshot.data_source,
        })),
    )
}

/// Grade counts over a feed
fn grade_stats(tokens: &[TokenRecord]) -> Value {
    let count = |g: Grade| tokens.iter().filter(|t| t.grade == g).count();
    #[allow(clippy::cast_precision_loss)]
    let avg_overlap = if tokens.is_empty() {
        0.0
    } else {
        tokens.iter().map(|t| t.overlap_percentage).sum::<f64>() / tokens.len() as f64
    };
    json!({
        "total_tokens": tokens.len(),
        "critical_alerts": count(Grade::Critical),
        "high_alerts": count(Grade::High),
        "medium_alerts": count(Grade::Medium),
        "low_alerts": count(Grade::Low),
        "ungraded": count(Grade::None),
        "avg_overlap_score": (avg_overlap * 10.0).round() / 10.0,
    })
}

/// GET /api/tokens/stats
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.reader.load().await;
    let mut stats = grade_stats(&snapshot.tokens);
    stats["monitoring_active"] = json!(state.monitor.control().is_active());
    stats["last_scan"] = json!(snapshot.last_updated);
    stats["data_source"] = json!(snapshot.data_source);
    ([(header::CACHE_CONTROL, "no-store")], Json(stats))
}

#[derive(Debug, Default, Deserialize)]
struct MonitorQuery {
    search: Option<String>,
    grades: Option<String>,
    sort: Option<String>,
    order: Option<String>,
}

impl MonitorQuery {
    /// Unknown values fall back to defaults
    fn to_filter(&self) -> FilterState {
        let mut filter = FilterState::default();
        if let Some(search) = &self.search {
            filter.search = search.trim().to_string();
        }
        if let Some(grades) = &self.grades {
            match FilterState::parse_grades(grades) {
                Ok(g) => filter.grades = g,
                Err(e) => debug!(error = %e, "Ignoring grade filter"),
            }
        }
        if let Some(sort) = &self.sort {
            match sort.parse() {
                Ok(key) => filter.sort = key,
                Err(e) => debug!(error = %e, "Ignoring sort key"),
            }
        }
        if let Some(order) = &self.order {
            filter.descending = !order.eq_ignore_ascii_case("asc");
        }
        filter
    }
}

/// GET /api/monitor - filtered, enriched view
async fn monitor_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonitorQuery>,
) -> impl IntoResponse {
    if !state.monitor_background {
        state.monitor.refresh().await;
    }
    let view = state.monitor.view(&query.to_filter());
    ([(header::CACHE_CONTROL, "no-store")], Json(view))
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    paused: Option<bool>,
    visible: Option<bool>,
}

/// POST /api/monitor/control - pause/resume and visibility
async fn control_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return error_response(&Error::Validation(e.body_text())),
    };
    state.monitor.set_control(req.paused, req.visible);
    Json(state.monitor.status()).into_response()
}

/// GET /api/trader-roi - saved and in-process analyses, newest first
async fn analyses_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let analyses = state.analyses.history().await;
    ([(header::CACHE_CONTROL, "no-store")], Json(json!({ "analyses": analyses })))
}

/// POST /api/trader-roi - validate and submit an analysis
async fn submit_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(e) => return error_response(&Error::Validation(e.body_text())),
    };

    match state.analyses.submit(request).await {
        Ok(SubmitOutcome::Completed(analysis)) => {
            Json(json!({ "analysis": analysis })).into_response()
        }
        Ok(SubmitOutcome::Queued(job)) => {
            (StatusCode::ACCEPTED, Json(json!({ "job": job }))).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Analysis submission rejected");
            error_response(&e)
        }
    }
}

/// GET /api/trader-roi/jobs
async fn jobs_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tracker = state.analyses.tracker();
    Json(json!({
        "jobs": tracker.list(),
        "active": tracker.active_count(),
    }))
}

/// GET /api/trader-roi/jobs/{id}
async fn job_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.analyses.tracker().get(&id) {
        Some(job) => Json(json!({ "job": job })).into_response(),
        None => error_response(&Error::NotFound(format!("job {id}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_stats() {
        let tokens: Vec<TokenRecord> = [Grade::Critical, Grade::High, Grade::High, Grade::None]
            .into_iter()
            .enumerate()
            .map(|(i, g)| {
                let mut t = TokenRecord::new(format!("T{i}"));
                t.grade = g;
                t.overlap_percentage = 10.0;
                t
            })
            .collect();
        let stats = grade_stats(&tokens);
        assert_eq!(stats["total_tokens"], 4);
        assert_eq!(stats["critical_alerts"], 1);
        assert_eq!(stats["high_alerts"], 2);
        assert_eq!(stats["medium_alerts"], 0);
        assert_eq!(stats["ungraded"], 1);
        assert_eq!(stats["avg_overlap_score"], 10.0);
    }

    #[test]
    fn test_monitor_query_is_lenient() {
        let query = MonitorQuery {
            search: Some(" wif ".into()),
            grades: Some("HIGH,nonsense".into()),
            sort: Some("volume".into()),
            order: Some("asc".into()),
        };
        let filter = query.to_filter();
        assert_eq!(filter.search, "wif");
        assert_eq!(filter.grades.len(), 5);
        assert_eq!(filter.sort, crate::monitor::SortKey::Volume24h);
        assert!(!filter.descending);
    }

    #[test]
    fn test_error_response_status() {
        let resp = error_response(&Error::backend(503, "busy"));
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let resp = error_response(&Error::Validation("bad".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
