//! Trade Journal Core: domain types and remote journal plumbing.
//!
//! This crate contains everything the reconciliation jobs build on:
//! - Domain types (trade records, title keys, versioned metadata, statuses)
//! - Canonical field projection shared by payloads and diffs
//! - The `JournalClient` trait with HTTP and in-memory implementations
//! - Per-run bulk indexes (existence of trades, dimension page ids)
//! - The pure field-level diff engine

pub mod diff;
pub mod domain;
pub mod fields;
pub mod index;
pub mod remote;

pub use diff::{diff, diff_fields, FieldDiff, Mismatch};
pub use fields::{project, Field, FieldMap, FieldValue};
