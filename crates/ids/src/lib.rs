//! Identifier utilities.
//!
//! Two kinds of identifier are used across the biobank crates:
//!
//! - [`ProjectId`]: a canonical UUID (**32 lowercase hexadecimal characters**, no hyphens) naming
//!   a project. Project files live under a sharded directory derived from it:
//!   `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`, for example
//!   `data/projects/55/0e/550e8400e29b41d4a716446655440000/`.
//! - [`CodeId`]: a synthetic identifier attached to every generated sample code. Codes can be
//!   edited after generation and two previews may briefly hold the same text, so rows are
//!   addressed by `CodeId` rather than by the code string. [`CodeIdGenerator`] hands them out in
//!   strictly increasing order.
//!
//! Canonical form is *required* for externally supplied project identifiers (CLI or API input).
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected.

mod service;

pub use service::{CodeId, CodeIdGenerator, ProjectId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type IdResult<T> = Result<T, IdError>;
