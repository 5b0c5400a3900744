use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use merit_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub workflows: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Ready when the database answers. A store without active workflow definitions is reported
/// as `degraded` but still serves, since awards would fail with `no_applicable_workflow`.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let workflows = workflow_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: match (ready, workflows.status) {
            (false, _) => "unavailable",
            (true, "ready") => "ready",
            (true, _) => "degraded",
        },
        database,
        workflows,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn workflow_check(pool: &DbPool) -> HealthCheck {
    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM workflow_definition WHERE is_active = 1",
    )
    .fetch_one(pool)
    .await;

    match active {
        Ok(0) => HealthCheck { status: "degraded", detail: "no active workflow definitions".to_string() },
        Ok(count) => HealthCheck { status: "ready", detail: format!("{count} active workflow definitions") },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("workflow lookup failed: {error}") }
        }
    }
}
