/// Health check endpoints for liveness and readiness probes
///
/// - Liveness: the process answers at all
/// - Readiness: the database is reachable, so requests can be served

use crate::{context::AppContext, jobs};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Instant;

lazy_static! {
    static ref STARTED_AT: Instant = Instant::now();
}

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy", "degraded" or "unhealthy"
    pub status: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub checks: Vec<ComponentHealth>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    lazy_static::initialize(&STARTED_AT);

    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/health/detailed", get(health_detailed))
}

pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 200 when the database answers, 503 otherwise
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = jobs::tasks::health_check(&ctx).await {
        tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// Component-level status for monitoring dashboards
pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let checks = vec![check_database(&ctx).await, check_email(&ctx)];
    let status = determine_overall_status(&checks);

    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: STARTED_AT.elapsed().as_secs_f64(),
            checks,
        }),
    )
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = jobs::tasks::health_check(ctx).await;

    ComponentHealth {
        name: "database".to_string(),
        status: if result.is_ok() { "healthy" } else { "unhealthy" }.to_string(),
        response_time_ms: Some(start.elapsed().as_millis() as u64),
        error: result.err().map(|e| e.to_string()),
    }
}

// Email is optional: missing configuration only degrades notifications
fn check_email(ctx: &AppContext) -> ComponentHealth {
    ComponentHealth {
        name: "email".to_string(),
        status: if ctx.mailer.is_configured() { "healthy" } else { "degraded" }.to_string(),
        response_time_ms: None,
        error: None,
    }
}

fn determine_overall_status(checks: &[ComponentHealth]) -> &'static str {
    if checks.iter().any(|c| c.status == "unhealthy") {
        "unhealthy"
    } else if checks.iter().any(|c| c.status == "degraded") {
        "degraded"
    } else {
        "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(status: &str) -> ComponentHealth {
        ComponentHealth {
            name: "x".to_string(),
            status: status.to_string(),
            response_time_ms: Some(1),
            error: None,
        }
    }

    #[test]
    fn test_determine_overall_status() {
        assert_eq!(determine_overall_status(&[check("healthy"), check("healthy")]), "healthy");
        assert_eq!(determine_overall_status(&[check("healthy"), check("degraded")]), "degraded");
        assert_eq!(determine_overall_status(&[check("degraded"), check("unhealthy")]), "unhealthy");
    }

    #[test]
    fn test_component_health_skips_empty_fields() {
        let json = serde_json::to_string(&ComponentHealth {
            name: "email".to_string(),
            status: "degraded".to_string(),
            response_time_ms: None,
            error: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"name":"email","status":"degraded"}"#);
    }
}
