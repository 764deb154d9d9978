//! HTTP API for run monitoring
//!
//! Read-only REST endpoints over the coordinator's current run.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::engine::{Lifecycle, RunSummary};
use crate::service::CoordinatorService;

/// Shared state for HTTP handlers (Arc for thread-safe sharing)
pub type AppState = Arc<CoordinatorService>;

/// Current run for API response
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: Option<Uuid>,
    pub state: Lifecycle,
    pub turn: u64,
    pub target_turns: u64,
    pub height: usize,
    pub width: usize,
    pub alive_cells: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub workers: Vec<String>,
    pub uptime: u64,
    pub last_run: Option<RunSummary>,
}

/// Create the HTTP API router
pub fn create_router(service: Arc<CoordinatorService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/run", get(get_run))
        .layer(cors)
        .with_state(service)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// Get the active (or idle) run
async fn get_run(State(service): State<AppState>) -> Json<RunResponse> {
    Json(run_response(&service))
}

fn run_response(service: &CoordinatorService) -> RunResponse {
    let status = service.run_status();
    RunResponse {
        run_id: status.run_id,
        state: status.state,
        turn: status.turn,
        target_turns: status.target_turns,
        height: status.height,
        width: status.width,
        alive_cells: status.alive_cells,
        started_at: status.started_at,
        workers: service.worker_addresses(),
        uptime: service.uptime_secs(),
        last_run: status.last_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalWorkerPool;
    use life_core::Grid;

    #[tokio::test]
    async fn test_idle_run_response() {
        let service = Arc::new(CoordinatorService::new(Arc::new(LocalWorkerPool::new(2))));

        let Json(run) = get_run(State(service)).await;
        assert_eq!(run.state, Lifecycle::Idle);
        assert!(run.run_id.is_none());
        assert_eq!(run.workers, vec!["local-0", "local-1"]);

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["turn"], 0);
    }

    #[tokio::test]
    async fn test_reports_last_run() {
        let service = Arc::new(CoordinatorService::new(Arc::new(LocalWorkerPool::new(2))));
        let grid = Grid::from_rows(&["....", ".##.", ".##.", "...."]).unwrap();
        service.engine().start_run(grid, 5, 1).await.unwrap();

        let run = run_response(&service);
        let last = run.last_run.unwrap();
        assert_eq!(last.ended, Lifecycle::Completed);
        assert_eq!(last.final_turn, 5);
        assert_eq!(last.target_turns, 5);
    }
}
