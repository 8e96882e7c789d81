//! `eventrelay-core`: shared building blocks.
//!
//! Identifiers, the error model and the clock abstraction used by every other
//! crate in the workspace. No IO lives here.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::CoreError;
pub use id::JobId;
