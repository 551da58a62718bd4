//! Remote journal client trait and structured error types.
//!
//! The `JournalClient` trait is the only way the reconciliation engine talks
//! to the remote journal, so the HTTP client can be swapped for the in-memory
//! one in tests.

use crate::domain::{CollectionId, RemoteId};
use crate::fields::FieldMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured errors from the remote journal.
///
/// Not-found is its own variant because "the record doesn't exist" is a
/// normal answer for existence checks, never a failure.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("network unreachable: {0}")]
    Transport(String),

    #[error("rate limited by remote journal (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("remote journal server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("authentication required: {0}")]
    Unauthorized(String),

    #[error("response format changed: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Transport(_) | RemoteError::RateLimited { .. } | RemoteError::Server { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// A record (page) as returned by the remote journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RemoteId,
    pub collection: CollectionId,
    /// Page title. Trade pages use the TitleKey, dimension pages the
    /// dimension key (ticker symbol or `YYYY-MM-DD`).
    pub title: String,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub relations: Option<RelationIds>,
}

/// Ids of the dimension pages a trade page links to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationIds {
    pub ticker: RemoteId,
    pub date: RemoteId,
}

/// Query filter for `query_by_filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Every record in the collection (bulk listing).
    All,
    /// Records whose title equals the given string (point lookup).
    TitleEquals(String),
}

impl Filter {
    pub fn accepts(&self, title: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::TitleEquals(t) => t == title,
        }
    }
}

/// Minimal capability set the engine needs from the remote journal.
///
/// All calls are blocking. Paging, auth and wire encoding are the
/// implementation's business.
pub trait JournalClient: Send {
    /// Human-readable name of this client.
    fn name(&self) -> &str;

    fn query_by_filter(
        &self,
        collection: &CollectionId,
        filter: &Filter,
    ) -> Result<Vec<RemoteRecord>, RemoteError>;

    fn create_record(
        &self,
        collection: &CollectionId,
        relations: &RelationIds,
        fields: &FieldMap,
    ) -> Result<RemoteRecord, RemoteError>;

    fn retrieve_record(&self, id: &RemoteId) -> Result<RemoteRecord, RemoteError>;

    /// Replace the record's fields with `fields`; returns the record as
    /// stored after the update.
    fn update_record(&self, id: &RemoteId, fields: &FieldMap) -> Result<RemoteRecord, RemoteError>;
}

impl<C: JournalClient + Sync> JournalClient for std::sync::Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn query_by_filter(
        &self,
        collection: &CollectionId,
        filter: &Filter,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        (**self).query_by_filter(collection, filter)
    }

    fn create_record(
        &self,
        collection: &CollectionId,
        relations: &RelationIds,
        fields: &FieldMap,
    ) -> Result<RemoteRecord, RemoteError> {
        (**self).create_record(collection, relations, fields)
    }

    fn retrieve_record(&self, id: &RemoteId) -> Result<RemoteRecord, RemoteError> {
        (**self).retrieve_record(id)
    }

    fn update_record(&self, id: &RemoteId, fields: &FieldMap) -> Result<RemoteRecord, RemoteError> {
        (**self).update_record(id, fields)
    }
}
