//! Core primitives.
//!
//! Identity, locations and time units shared by every other module.

pub mod id;
pub mod location;
pub mod time;

// Re-export core types
pub use id::PlayerId;
pub use location::{Location, LocationError};
pub use time::{format_hhmmss, format_sentence, to_seconds, to_ticks};
