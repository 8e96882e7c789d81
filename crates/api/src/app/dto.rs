use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventrelay_core::JobId;
use eventrelay_events::{Event, EventKind, Payload, ValidationError, Violation};
use eventrelay_infra::retry::{Completion, RetryStats};

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /api/v1/events`.
///
/// Fields are optional so that a missing one is reported as a validation
/// violation rather than a parse failure.
#[derive(Debug, Default, Deserialize)]
pub struct EventRequest {
    pub source: Option<String>,
    pub event_type: Option<String>,
    /// Defaults to the time of receipt.
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Payload,
}

impl EventRequest {
    /// Build the event, reporting every missing or malformed field at once.
    pub fn into_event(self, received_at: DateTime<Utc>) -> Result<Event, ValidationError> {
        let mut violations = Vec::new();

        let kind = match self.event_type.as_deref().map(str::trim) {
            None | Some("") => {
                violations.push(Violation::new("missing.event_type", "event_type is required"));
                None
            }
            Some(raw) => match raw.parse::<EventKind>() {
                Ok(kind) => Some(kind),
                Err(err) => {
                    violations.push(Violation::new("invalid.event_type", err.to_string()));
                    None
                }
            },
        };

        let event = Event::new(
            self.source.unwrap_or_default(),
            kind.unwrap_or(EventKind::Info),
            self.timestamp.unwrap_or(received_at),
            self.payload,
        );

        if let Err(err) = eventrelay_events::validate_event(&event) {
            violations.extend(err.violations);
        }

        if violations.is_empty() {
            Ok(event)
        } else {
            Err(ValidationError { violations })
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub status: &'static str,
    pub source: String,
    pub event_type: EventKind,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DedupStatsResponse {
    pub enabled: bool,
    pub size: usize,
    pub capacity: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub dedup: DedupStatsResponse,
    pub retry: RetryStats,
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub job_id: JobId,
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl RetryResponse {
    pub fn new(job_id: JobId, completion: Completion) -> Self {
        let (result, next_retry_at) = match completion {
            Completion::Succeeded => ("succeeded", None),
            Completion::Rescheduled { next_retry_at } => ("rescheduled", Some(next_retry_at)),
            Completion::Exhausted => ("exhausted", None),
            Completion::Unknown => ("unknown", None),
        };
        Self {
            job_id,
            result,
            next_retry_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> EventRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn builds_event_with_default_timestamp() {
        let now = Utc::now();
        let event = request(json!({
            "source": "sensor-1",
            "event_type": "WARNING",
            "payload": {"t": 25.0}
        }))
        .into_event(now)
        .unwrap();

        assert_eq!(event.kind(), EventKind::Warning);
        assert_eq!(event.timestamp(), now);
        assert_eq!(event.payload()["t"], json!(25.0));
    }

    #[test]
    fn reports_all_missing_fields() {
        let err = request(json!({})).into_event(Utc::now()).unwrap_err();
        let codes: Vec<_> = err.violations.iter().map(|v| v.code).collect();

        assert!(codes.contains(&"missing.event_type"));
        assert!(codes.contains(&"missing.source"));
    }

    #[test]
    fn rejects_unknown_event_type() {
        let err = request(json!({"source": "sensor-1", "event_type": "ALERT"}))
            .into_event(Utc::now())
            .unwrap_err();

        assert_eq!(err.violations[0].code, "invalid.event_type");
    }
}
