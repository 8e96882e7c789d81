//! Notification text rendering.

use chrono::SecondsFormat;

use crate::event::Event;
use crate::fingerprint::canonical_payload;

/// Render the notification message delivered for `event`.
///
/// The payload is rendered in canonical (sorted-key) JSON so two renderings of
/// the same event are byte-identical.
pub fn render_message(event: &Event) -> String {
    format!(
        "New event received:\nSource: {}\nType: {}\nTimestamp: {}\nPayload: {}",
        event.source(),
        event.kind(),
        event.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true),
        canonical_payload(event.payload()),
    )
}
