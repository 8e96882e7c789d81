use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event payload: string keys to arbitrary JSON values.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Category of an incoming event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    UserAction,
    SystemEvent,
    Error,
    Warning,
    Info,
}

impl EventKind {
    /// Stable wire name (e.g. `"SYSTEM_EVENT"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UserAction => "USER_ACTION",
            EventKind::SystemEvent => "SYSTEM_EVENT",
            EventKind::Error => "ERROR",
            EventKind::Warning => "WARNING",
            EventKind::Info => "INFO",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event type name that is not one of the known kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type {0:?}")]
pub struct UnknownEventKind(pub String);

impl core::str::FromStr for EventKind {
    type Err = UnknownEventKind;

    /// Accepts the wire name in any case, e.g. `"warning"` or `"SYSTEM_EVENT"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER_ACTION" => Ok(EventKind::UserAction),
            "SYSTEM_EVENT" => Ok(EventKind::SystemEvent),
            "ERROR" => Ok(EventKind::Error),
            "WARNING" => Ok(EventKind::Warning),
            "INFO" => Ok(EventKind::Info),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

/// An event submitted for notification.
///
/// Events are immutable facts: fields are only readable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    source: String,
    #[serde(rename = "event_type")]
    kind: EventKind,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: Payload,
}

impl Event {
    pub fn new(
        source: impl Into<String>,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        payload: Payload,
    ) -> Self {
        Self {
            source: source.into(),
            kind,
            timestamp,
            payload,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_uses_screaming_snake_case_on_the_wire() {
        let json = serde_json::to_string(&EventKind::SystemEvent).unwrap();
        assert_eq!(json, "\"SYSTEM_EVENT\"");

        let parsed: EventKind = serde_json::from_str("\"USER_ACTION\"").unwrap();
        assert_eq!(parsed, EventKind::UserAction);
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("warning".parse::<EventKind>(), Ok(EventKind::Warning));
        assert_eq!(" System_Event ".parse::<EventKind>(), Ok(EventKind::SystemEvent));
        assert!("ALERT".parse::<EventKind>().is_err());
    }

    #[test]
    fn event_deserializes_without_payload() {
        let event: Event = serde_json::from_str(
            r#"{"source":"sensor-1","event_type":"INFO","timestamp":"2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(event.source(), "sensor-1");
        assert_eq!(event.kind(), EventKind::Info);
        assert!(event.payload().is_empty());
    }
}
