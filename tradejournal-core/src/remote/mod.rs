//! Remote journal access: the client trait and its implementations.

pub mod client;
pub mod memory;
pub mod notion;

pub use client::{Filter, JournalClient, RelationIds, RemoteError, RemoteRecord};
pub use memory::{CallCounts, InMemoryJournal};
pub use notion::{NotionClient, NotionSettings};
