//! # lostfound-core
//!
//! Core types, traits, and matching rules for the lost & found service.
//!
//! This crate provides the domain model and the repository traits that the
//! storage, notification, and HTTP crates depend on.
//!
//! ## Log Level Contract
//!
//! Every crate logs through `tracing` with `subsystem` and `component`
//! fields ("api", "db", "notify", "media", "identity").
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention (failed email, store down) |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, item state transitions, delivered notifications |
//! | DEBUG | Decision points, match candidate counts, config choices |
//! | TRACE | Per-candidate iteration |

pub mod defaults;
pub mod error;
pub mod matching;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use matching::{contains_ci, is_plausible_email, normalize_email, titles_overlap, MatchQuery};
pub use models::*;
pub use traits::*;

/// Generate a time-ordered UUIDv7 identifier.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
