//! Events accepted by the relay and the values derived from them.
//!
//! - [`Event`]: the immutable fact submitted by the intake layer
//! - [`EventFingerprint`]: content hash used for duplicate suppression
//! - [`render_message`]: the notification text delivered downstream
//! - [`validate_event`]: intake-time payload checks

pub mod event;
pub mod fingerprint;
pub mod message;
pub mod validation;

pub use event::{Event, EventKind, Payload, UnknownEventKind};
pub use fingerprint::{canonical_payload, fingerprint, Digest, EventFingerprint};
pub use message::render_message;
pub use validation::{validate_event, ValidationError, Violation};
