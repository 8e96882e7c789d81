//! Content fingerprints for duplicate suppression.
//!
//! A fingerprint identifies an event's *logical content*: source, kind and
//! payload. The event timestamp is not part of it: a sensor re-sending the
//! same reading is a duplicate.
//!
//! # Canonical form
//!
//! The hashed string is `<len(source)>:<source>|<KIND>|<payload>` where the
//! payload is compact JSON with object keys sorted at every depth. The length
//! prefix keeps `("a|b", X)` and `("a", "b|X")` apart.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::event::{Event, EventKind, Payload};

/// Hex-encoded SHA-256 digest of an event's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of an event, stamped with the instant it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFingerprint {
    digest: Digest,
    source: String,
    kind: EventKind,
    created_at: DateTime<Utc>,
}

impl EventFingerprint {
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Same fingerprint, re-stamped at `at`.
    pub fn restamped(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// True once `now - created_at >= ttl`.
    ///
    /// The boundary is inclusive: an entry exactly `ttl` old is expired.
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= ttl
    }
}

/// Compute the fingerprint of `event`, stamped at `at`.
pub fn fingerprint(event: &Event, at: DateTime<Utc>) -> EventFingerprint {
    let source = event.source();
    let kind = event.kind();

    let mut content = String::with_capacity(source.len() + 64);
    let _ = write!(content, "{}:{}|{}|", source.len(), source, kind.as_str());
    content.push_str(&canonical_payload(event.payload()));

    let digest = Digest(hex::encode(Sha256::digest(content.as_bytes())));

    EventFingerprint {
        digest,
        source: source.to_string(),
        kind,
        created_at: at,
    }
}

/// Compact JSON rendering of `payload` with keys sorted at every depth.
pub fn canonical_payload(payload: &Payload) -> String {
    let mut out = String::new();
    write_object(&mut out, payload.iter());
    out
}

fn write_object<'a>(out: &mut String, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => write_object(out, map.iter()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::String(s) => write_string(out, s),
        // Scalars have a single compact JSON form.
        other => {
            let _ = write!(out, "{other}");
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // `Value`'s Display escapes exactly as JSON does.
    let _ = write!(out, "{}", Value::String(s.to_string()));
}
