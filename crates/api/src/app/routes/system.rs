use std::sync::Arc;

use axum::{extract::Extension, Json};
use serde_json::{json, Value};

use eventrelay_infra::{DeduplicationCache, RetryScheduler};

use crate::app::dto::{DedupStatsResponse, StatsResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// GET /api/v1/events/health
pub async fn liveness() -> &'static str {
    "Ok"
}

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "dedup_enabled": services.cache.is_enabled(),
        "retry_enabled": services.scheduler.is_enabled(),
    }))
}

/// GET /stats
///
/// Dedup cache size and retry scheduler counts.
pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let retry = services.scheduler.stats()?;

    Ok(Json(StatsResponse {
        dedup: DedupStatsResponse {
            enabled: services.cache.is_enabled(),
            size: services.cache.size(),
            capacity: services.cache.capacity(),
        },
        retry,
    }))
}
