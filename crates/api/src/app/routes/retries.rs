//! Operator retry trigger.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Json,
};

use eventrelay_core::JobId;

use crate::app::dto::RetryResponse;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// POST /retries/:id
///
/// Retry a scheduled job now, even if its backoff has not elapsed.
/// 404 when the job is not in the scheduled set.
pub async fn retry_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<RetryResponse>, ApiError> {
    let job_id: JobId = id
        .parse()
        .map_err(|err: eventrelay_core::CoreError| ApiError::BadRequest(err.to_string()))?;

    let completion = tokio::task::spawn_blocking(move || services.driver.retry_job(job_id)).await??;

    Ok(Json(RetryResponse::new(job_id, completion)))
}
