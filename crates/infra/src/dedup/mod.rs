//! Duplicate event suppression.
//!
//! A [`DeduplicationCache`] remembers event fingerprints for a TTL and answers
//! "have I seen this before". It is an optimization, not a correctness
//! guarantee: under bursts the capacity bound is best-effort, and a disabled
//! cache lets everything through.

pub mod cache;

pub use cache::{DeduplicationCache, InMemoryDeduplicationCache};
