use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tokenbot_core::queue::BackgroundQueue;
use tokenbot_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    queue: BackgroundQueue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    /// Detached reporting jobs not yet finished.
    pub pending_jobs: usize,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, queue: BackgroundQueue) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, queue })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "tokenbot-server accepting slack requests".to_string(),
        },
        database,
        pending_jobs: state.queue.pending(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM grant_record").fetch_one(pool).await {
        Ok(grants) => HealthCheck { status: "ready", detail: format!("{grants} grants stored") },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
