//! Daemon HTTP surface.
//!
//! - `GET /metrics/e2e`: Prometheus text exposition of the `e2emet_*` families
//! - `GET /health`: liveness plus a summary of the last reconciliation
//! - `GET /coverage`: the latest `PipelineCoverage` record as JSON

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use prometheus::Registry;
use serde_json::json;

use crate::metrics;
use crate::trigger::CoverageState;

#[derive(Clone)]
pub struct ApiState {
    pub coverage: Arc<CoverageState>,
    pub registry: Registry,
    pub version: &'static str,
    pub started_at: Instant,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/metrics/e2e", get(serve_metrics))
        .route("/health", get(serve_health))
        .route("/coverage", get(serve_coverage))
        .with_state(Arc::new(state))
}

async fn serve_metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match metrics::encode_metrics(&state.registry) {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, metrics::CONTENT_TYPE)],
            output,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Metrics exposition failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Always 200 while the daemon runs.
async fn serve_health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let latest = state.coverage.latest();

    Json(json!({
        "status": "ok",
        "version": state.version,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "reconcile_count": state.coverage.run_count(),
        "last_phase": state.coverage.latest_phase(),
        "last_trigger": latest.as_ref().map(|s| s.trigger),
        "last_reconciled_at": latest.as_ref().map(|s| s.reconciled_at.to_rfc3339()),
    }))
}

/// 503 until the first reconciliation completes.
async fn serve_coverage(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.coverage.latest() {
        Some(snapshot) => (StatusCode::OK, Json(snapshot.record)).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "reason": "no_reconciliation_yet",
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PrometheusSink;
    use crate::trigger::{CoverageSnapshot, TriggerSource};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use pcov::{ControllerLabels, CoverageOutcome, MetricsSink, ReconcileStatus, TestCaseSets};
    use pcov_common::RecordIdentity;
    use tower::ServiceExt;

    fn api_state() -> ApiState {
        ApiState {
            coverage: Arc::new(CoverageState::new()),
            registry: Registry::new(),
            version: "9.9.9",
            started_at: Instant::now(),
        }
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn as_json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint_before_first_run() {
        let (status, body) = get_body(router(api_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json = as_json(&body);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], "9.9.9");
        assert_eq!(json["reconcile_count"], 0);
        assert!(json["last_phase"].is_null());
    }

    #[tokio::test]
    async fn test_coverage_endpoint_not_ready() {
        let (status, body) = get_body(router(api_state()), "/coverage").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let json = as_json(&body);
        assert_eq!(json["reason"], "no_reconciliation_yet");
    }

    #[tokio::test]
    async fn test_coverage_endpoint_serves_latest_record() {
        let state = api_state();
        let record = CoverageOutcome::compute(&TestCaseSets::default(), None)
            .to_record(&RecordIdentity::default());
        state.coverage.store(CoverageSnapshot {
            record,
            reconciled_at: Utc::now(),
            trigger: TriggerSource::Startup,
        });
        let coverage = state.coverage.clone();

        let (status, body) = get_body(router(state.clone()), "/coverage").await;
        assert_eq!(status, StatusCode::OK);
        let json = as_json(&body);
        assert_eq!(json["kind"], "PipelineCoverage");
        assert_eq!(json["result"]["coverage"], "0%");

        let (_, body) = get_body(router(state), "/health").await;
        let json = as_json(&body);
        assert_eq!(json["reconcile_count"], 1);
        assert_eq!(json["last_phase"], "Passed");
        assert_eq!(json["last_trigger"], "startup");
        assert_eq!(coverage.run_count(), 1);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let state = api_state();
        let sink = PrometheusSink::register(&state.registry).unwrap();
        sink.increment_counter(&ControllerLabels::sync(ReconcileStatus::Passed));

        let request = Request::get("/metrics/e2e").body(Body::empty()).unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            metrics::CONTENT_TYPE
        );

        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let exposition = std::str::from_utf8(&bytes).unwrap();
        assert!(exposition.contains("# HELP e2emet_controller_sync_call_count"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _) = get_body(router(api_state()), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
