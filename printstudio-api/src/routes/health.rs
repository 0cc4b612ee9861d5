/// `GET /health`
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "providers": { "replicate": true, "openai": false }
/// }
/// ```
///
/// Running without a database is a supported mode and reports `unconfigured`.
/// Only an unreachable database marks the service `degraded`.

use crate::app::AppState;
use axum::{extract::State, Json};
use printstudio_shared::{db::pool, tools::ProviderKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Connected,
    Disconnected,
    Unconfigured,
}

/// Which providers have credentials
#[derive(Debug, Serialize)]
pub struct ProviderAvailability {
    pub replicate: bool,
    pub openai: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: ServiceStatus,
    pub version: &'static str,
    pub database: DatabaseStatus,
    pub providers: ProviderAvailability,
}

async fn probe_database(state: &AppState) -> DatabaseStatus {
    let Some(db) = &state.db else {
        return DatabaseStatus::Unconfigured;
    };

    match pool::health_check(db).await {
        Ok(()) => DatabaseStatus::Connected,
        Err(e) => {
            tracing::warn!(error = %e, "Database probe failed");
            DatabaseStatus::Disconnected
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = probe_database(&state).await;

    let status = match database {
        DatabaseStatus::Disconnected => ServiceStatus::Degraded,
        _ => ServiceStatus::Healthy,
    };

    Json(HealthResponse {
        status,
        version: printstudio_shared::VERSION,
        database,
        providers: ProviderAvailability {
            replicate: state.providers.get(ProviderKind::Replicate).is_some(),
            openai: state.providers.get(ProviderKind::OpenAi).is_some(),
        },
    })
}
