//! Versioned user annotations attached to a trade.
//!
//! Annotations evolved over time: version 1 carried free-form rank/setup/
//! trigger/comment, version 2 added the order type and the behavioural flags.
//! Each version maps to its own remote collection, so the version travels
//! with the record and is never inferred from which fields happen to be set.

use serde::{Deserialize, Serialize};

/// Latest annotation schema version.
pub const LATEST_VERSION: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataV1 {
    pub rank: Option<String>,
    pub setup: Option<String>,
    pub close_trigger: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataV2 {
    pub rank: Option<String>,
    pub setup: Option<String>,
    pub close_trigger: Option<String>,
    pub order_type: Option<String>,
    pub followed_plan: Option<bool>,
    pub revenge_trade: Option<bool>,
    pub fomo: Option<bool>,
    pub comment: Option<String>,
}

/// Annotation payload tagged by schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version", content = "data")]
pub enum TradeMetadata {
    #[serde(rename = "1")]
    V1(MetadataV1),
    #[serde(rename = "2")]
    V2(MetadataV2),
}

impl TradeMetadata {
    pub fn version(&self) -> u32 {
        match self {
            TradeMetadata::V1(_) => 1,
            TradeMetadata::V2(_) => 2,
        }
    }

    /// Upgrade to the latest schema. New fields start out absent.
    pub fn migrate_to_latest(self) -> TradeMetadata {
        match self {
            TradeMetadata::V1(v1) => TradeMetadata::V2(MetadataV2::from(v1)),
            v2 @ TradeMetadata::V2(_) => v2,
        }
    }

    /// View of the annotations in the latest shape without changing the
    /// record's stored version.
    pub fn as_latest(&self) -> MetadataV2 {
        match self {
            TradeMetadata::V1(v1) => MetadataV2::from(v1.clone()),
            TradeMetadata::V2(v2) => v2.clone(),
        }
    }
}

impl From<MetadataV1> for MetadataV2 {
    fn from(v1: MetadataV1) -> Self {
        MetadataV2 {
            rank: v1.rank,
            setup: v1.setup,
            close_trigger: v1.close_trigger,
            comment: v1.comment,
            ..MetadataV2::default()
        }
    }
}
