//! RelationCache: ids of the dimension pages a trade page must link to.
//!
//! Every trade page references one per-ticker page and one per-day page.
//! Both dimension collections are listed once per run, so creating N trades
//! costs two bulk queries instead of 2N lookups.

use crate::domain::{CollectionId, RemoteId, TradeRecord};
use crate::remote::{Filter, JournalClient, RelationIds, RemoteError};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

/// Which dimension a relation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Ticker,
    Date,
}

impl Dimension {
    pub fn label(self) -> &'static str {
        match self {
            Dimension::Ticker => "ticker",
            Dimension::Date => "date",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A trade's relation cannot be resolved. A configuration problem: retrying
/// will not make the page appear.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingRelation {
    #[error("missing {dimension} page for {key}")]
    Page { dimension: Dimension, key: String },

    #[error("trade has no ticker or datetime to resolve relations from")]
    Unkeyed,
}

/// Both dimension listings failed.
#[derive(Debug, Clone, Error)]
#[error("relation pages unavailable (tickers: {tickers}; dates: {dates})")]
pub struct RelationLoadError {
    pub tickers: RemoteError,
    pub dates: RemoteError,
}

fn load_dimension(
    client: &dyn JournalClient,
    collection: &CollectionId,
) -> Result<HashMap<String, RemoteId>, RemoteError> {
    let pages = client.query_by_filter(collection, &Filter::All)?;
    let mut ids = HashMap::with_capacity(pages.len());
    for page in pages {
        let key = page.title.trim().to_string();
        if key.is_empty() {
            continue;
        }
        ids.entry(key).or_insert(page.id);
    }
    Ok(ids)
}

/// One bulk listing of the per-ticker pages, keyed by symbol.
pub fn load_ticker_ids(
    client: &dyn JournalClient,
    collection: &CollectionId,
) -> Result<HashMap<String, RemoteId>, RemoteError> {
    load_dimension(client, collection)
}

/// One bulk listing of the per-day pages, keyed by `YYYY-MM-DD`.
pub fn load_date_ids(
    client: &dyn JournalClient,
    collection: &CollectionId,
) -> Result<HashMap<String, RemoteId>, RemoteError> {
    load_dimension(client, collection)
}

/// Read-only snapshot of both dimension maps for one run.
#[derive(Debug, Clone, Default)]
pub struct RelationCache {
    tickers: HashMap<String, RemoteId>,
    dates: HashMap<String, RemoteId>,
    warnings: Vec<String>,
}

impl RelationCache {
    pub fn from_maps(tickers: HashMap<String, RemoteId>, dates: HashMap<String, RemoteId>) -> Self {
        Self {
            tickers,
            dates,
            warnings: Vec::new(),
        }
    }

    /// Load both dimensions. A single failed listing degrades to an empty
    /// map plus a warning; only a double failure is an error.
    pub fn load(
        client: &dyn JournalClient,
        tickers: &CollectionId,
        dates: &CollectionId,
    ) -> Result<Self, RelationLoadError> {
        let ticker_result = load_ticker_ids(client, tickers);
        let date_result = load_date_ids(client, dates);

        let mut cache = RelationCache::default();
        match (ticker_result, date_result) {
            (Err(tickers), Err(dates)) => return Err(RelationLoadError { tickers, dates }),
            (ticker_result, date_result) => {
                match ticker_result {
                    Ok(map) => cache.tickers = map,
                    Err(e) => {
                        warn!(error = %e, "ticker pages failed to load");
                        cache
                            .warnings
                            .push(format!("ticker pages could not be loaded: {e}"));
                    }
                }
                match date_result {
                    Ok(map) => cache.dates = map,
                    Err(e) => {
                        warn!(error = %e, "day pages failed to load");
                        cache
                            .warnings
                            .push(format!("day pages could not be loaded: {e}"));
                    }
                }
            }
        }

        info!(
            tickers = cache.tickers.len(),
            dates = cache.dates.len(),
            "relation cache loaded"
        );
        Ok(cache)
    }

    pub fn ticker_id(&self, ticker: &str) -> Option<&RemoteId> {
        self.tickers.get(ticker)
    }

    pub fn date_id(&self, date_key: &str) -> Option<&RemoteId> {
        self.dates.get(date_key)
    }

    /// Resolve both relation ids for a trade.
    pub fn resolve(&self, record: &TradeRecord) -> Result<RelationIds, MissingRelation> {
        let (Some(ticker), Some(date)) = (record.ticker_key(), record.date_key()) else {
            return Err(MissingRelation::Unkeyed);
        };
        let ticker_id = self.ticker_id(&ticker).ok_or(MissingRelation::Page {
            dimension: Dimension::Ticker,
            key: ticker.clone(),
        })?;
        let date_id = self.date_id(&date).ok_or(MissingRelation::Page {
            dimension: Dimension::Date,
            key: date.clone(),
        })?;
        Ok(RelationIds {
            ticker: ticker_id.clone(),
            date: date_id.clone(),
        })
    }

    /// Non-fatal problems seen while loading.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
