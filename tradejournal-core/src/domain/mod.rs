//! Domain types for the trade journal

pub mod ids;
pub mod metadata;
pub mod status;
pub mod title_key;
pub mod trade;

pub use ids::{CollectionId, LocalIndex, RemoteId};
pub use metadata::{MetadataV1, MetadataV2, TradeMetadata, LATEST_VERSION};
pub use status::{Outcome, RowStatus};
pub use title_key::TitleKey;
pub use trade::{dedup, AggregatedSide, NaturalKey, TradeRecord, TradeResult};
