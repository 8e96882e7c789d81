//! Event intake.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{debug, info};

use eventrelay_infra::Submission;

use crate::app::dto::{EventAccepted, EventRequest};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// POST /api/v1/events
///
/// Validates the event and hands it to the relay. A valid event is always
/// answered with 202, whatever happens to its delivery.
pub async fn ingest(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<EventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EventAccepted>), ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let received_at = Utc::now();
    let event = request.into_event(received_at)?;
    info!(source = %event.source(), kind = %event.kind(), "event received");

    let accepted = EventAccepted {
        status: "accepted",
        source: event.source().to_string(),
        event_type: event.kind(),
        received_at,
    };

    // Delivery is synchronous and may block on the transport.
    let submission = tokio::task::spawn_blocking(move || services.orchestrator.process(&event)).await?;
    match submission {
        Submission::Delivered => debug!("event delivered"),
        Submission::Duplicate => debug!("event was a duplicate"),
        Submission::Failed { retry_job } => debug!(?retry_job, "event delivery deferred"),
    }

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
