use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    routing::{get, post},
    Json, Router,
};
use tracing::warn;

use crate::db::SnapshotStore;
use crate::error::AppError;
use crate::ingest::run_ingest;
use crate::metrics::RiskPolicy;
use crate::notify::{Notifier, ShareOutcome};
use crate::simpro::SimproClient;
use crate::types::{Snapshot, SnapshotMode};
use crate::ui;

#[derive(Clone)]
pub struct ApiState {
    pub store: SnapshotStore,
    /// None when Simpro credentials are not configured (demo-only deploy).
    pub client: Option<Arc<SimproClient>>,
    pub notifier: Arc<Notifier>,
    pub policy: RiskPolicy,
    pub webhook_url: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/latest", get(get_latest))
        .route("/api/snapshots", get(get_dates))
        .route("/api/snapshots/:date", get(get_by_date))
        .route("/ingest/demo", post(ingest_demo))
        .route("/ingest/live", post(ingest_live))
        .route("/share/slack", post(share_slack))
        .with_state(state)
}

async fn index(State(state): State<ApiState>) -> Result<Html<String>, AppError> {
    let latest = state.store.get_latest().await?;
    let dates = state.store.list_dates().await?;
    Ok(Html(ui::render_dashboard(latest.as_ref(), &dates)))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_latest(State(state): State<ApiState>) -> Result<Json<Snapshot>, AppError> {
    let snapshot = state
        .store
        .get_latest()
        .await?
        .ok_or_else(|| AppError::NotFound("no snapshots yet".to_string()))?;
    Ok(Json(snapshot))
}

async fn get_dates(State(state): State<ApiState>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.store.list_dates().await?))
}

async fn get_by_date(
    State(state): State<ApiState>,
    Path(date): Path<String>,
) -> Result<Json<Snapshot>, AppError> {
    let snapshot = state
        .store
        .get_by_date(&date)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no snapshot for {date}")))?;
    Ok(Json(snapshot))
}

async fn ingest_demo(State(state): State<ApiState>) -> Result<Redirect, AppError> {
    run_ingest(SnapshotMode::Demo, None, &state.store, &state.policy).await?;
    Ok(Redirect::to("/"))
}

/// Also the entry point for the external daily scheduler — a cron hit on this
/// route is indistinguishable from the dashboard button.
async fn ingest_live(State(state): State<ApiState>) -> Result<Redirect, AppError> {
    run_ingest(
        SnapshotMode::Live,
        state.client.as_deref(),
        &state.store,
        &state.policy,
    )
    .await?;
    Ok(Redirect::to("/"))
}

async fn share_slack(State(state): State<ApiState>) -> Result<Json<ShareOutcome>, AppError> {
    let snapshot = state
        .store
        .get_latest()
        .await?
        .ok_or_else(|| AppError::NotFound("no snapshot to share".to_string()))?;

    let outcome = state
        .notifier
        .send_summary(state.webhook_url.as_deref(), &snapshot)
        .await;
    if let ShareOutcome::Failed(reason) = &outcome {
        warn!("share to Slack failed: {reason}");
    }
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use sqlx::sqlite::SqlitePoolOptions;
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SnapshotStore::new(pool);
        store.init().await.unwrap();
        router(ApiState {
            store,
            client: None,
            notifier: Arc::new(Notifier::new().unwrap()),
            policy: RiskPolicy::default(),
            webhook_url: None,
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_router().await;
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn latest_is_404_until_an_ingest_runs() {
        let app = test_router().await;
        let resp = app
            .clone()
            .oneshot(Request::get("/api/latest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .clone()
            .oneshot(Request::post("/ingest/demo").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let resp = app
            .oneshot(Request::get("/api/latest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let snapshot: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot["mode"], "demo");
    }

    #[tokio::test]
    async fn live_ingest_without_credentials_fails_cleanly() {
        let app = test_router().await;
        let resp = app
            .oneshot(Request::post("/ingest/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn share_without_webhook_reports_not_configured() {
        let app = test_router().await;
        app.clone()
            .oneshot(Request::post("/ingest/demo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let resp = app
            .oneshot(Request::post("/share/slack").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let outcome: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(outcome["status"], "not_configured");
    }
}
