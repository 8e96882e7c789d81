//! HTTP API: event intake, health, stats and operator retries.

pub mod app;
