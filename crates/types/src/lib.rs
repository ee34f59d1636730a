//! Validated primitive types shared across the DCR workspace.
//!
//! DCR (Dental Clinical Records) stores every record under a sharded directory derived
//! from a canonical identifier, and treats free-text fields that must not be blank as a
//! distinct type rather than a convention. This crate provides those foundations:
//!
//! - [`CanonicalId`] — an identifier guaranteed to be in canonical form (32 lowercase
//!   hexadecimal characters, no hyphens), with shared sharding logic for storage paths.
//! - [`NonEmptyText`] — a string guaranteed to contain at least one non-whitespace
//!   character, trimmed on construction.
//!
//! ## Canonical identifier form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! This is the same value produced by `Uuid::new_v4().simple().to_string()`. Externally
//! supplied identifiers (CLI or API inputs) must already be canonical; non-canonical
//! values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`CanonicalId::parse`].
//!
//! ## Sharded directory layout
//! For a canonical identifier `u`, data lives under `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`,
//! for example `dcr_data/records/55/0e/550e8400e29b41d4a716446655440000/`. Sharding
//! bounds directory fan-out so the store scales to large record counts.

mod id;
mod text;

pub use id::CanonicalId;
pub use text::NonEmptyText;

/// Errors that can occur when constructing validated types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// The input text was empty or contained only whitespace.
    #[error("text cannot be empty")]
    EmptyText,
    /// The input was not a canonical identifier.
    #[error("identifier must be 32 lowercase hex characters without hyphens, got: '{0}'")]
    NonCanonicalId(String),
}

/// Result type for validated-type construction.
pub type TypeResult<T> = Result<T, TypeError>;
