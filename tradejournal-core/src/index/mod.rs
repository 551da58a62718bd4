//! Per-run bulk indexes over the remote journal

pub mod existence;
pub mod relation_cache;

pub use existence::{load_trademarks, ExistenceIndex};
pub use relation_cache::{
    load_date_ids, load_ticker_ids, Dimension, MissingRelation, RelationCache, RelationLoadError,
};
