/// Health check endpoints
///
/// - `/health`: status and version, plus the database probe result
/// - `/health/live`: always answers while the process is serving
/// - `/health/ready`: 503 until the account database answers
use crate::{context::AppContext, db};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub version: String,
    pub database: ComponentHealth,
}

/// Health of a single dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
}

pub async fn health(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let database = check_database(&ctx).await;
    let healthy = database.is_healthy();

    let status = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let database = check_database(&ctx).await;
    if !database.is_healthy() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = db::test_connection(&ctx.account_db).await;
    let response_time_ms = Some(start.elapsed().as_millis() as u64);

    match result {
        Ok(()) => ComponentHealth {
            status: "healthy".to_string(),
            response_time_ms,
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "database health check failed");
            ComponentHealth {
                status: "unhealthy".to_string(),
                response_time_ms,
                error: Some("database unavailable".to_string()),
            }
        }
    }
}
