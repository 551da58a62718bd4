//! ExistenceIndex: every TitleKey already present in a remote collection.
//!
//! Built from one bulk listing per collection so that checking N local trades
//! costs one query, not N.

use crate::domain::{CollectionId, RemoteId, TitleKey};
use crate::remote::{Filter, JournalClient, RemoteError};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One bulk query: `TitleKey → RemoteId` for a collection.
///
/// When the remote holds several pages with the same title the first one
/// listed wins; the duplicates are logged.
pub fn load_trademarks(
    client: &dyn JournalClient,
    collection: &CollectionId,
) -> Result<HashMap<TitleKey, RemoteId>, RemoteError> {
    let pages = client.query_by_filter(collection, &Filter::All)?;
    let mut map = HashMap::with_capacity(pages.len());
    for page in pages {
        if page.title.is_empty() {
            continue;
        }
        let key = TitleKey::from_title(page.title);
        if let Some(existing) = map.get(&key) {
            warn!(title = %key, kept = %existing, dropped = %page.id, "duplicate remote title");
            continue;
        }
        map.insert(key, page.id);
    }
    debug!(collection = %collection, entries = map.len(), "existence index loaded");
    Ok(map)
}

/// Snapshot of remote existence, merged across the collections a run needs.
#[derive(Debug, Clone, Default)]
pub struct ExistenceIndex {
    entries: HashMap<TitleKey, RemoteId>,
}

impl ExistenceIndex {
    pub fn load(client: &dyn JournalClient, collection: &CollectionId) -> Result<Self, RemoteError> {
        Ok(Self {
            entries: load_trademarks(client, collection)?,
        })
    }

    /// Load and merge several collections. Any failure fails the whole load.
    pub fn load_all<'a>(
        client: &dyn JournalClient,
        collections: impl IntoIterator<Item = &'a CollectionId>,
    ) -> Result<Self, RemoteError> {
        let mut index = ExistenceIndex::default();
        for collection in collections {
            for (key, id) in load_trademarks(client, collection)? {
                index.entries.entry(key).or_insert(id);
            }
        }
        Ok(index)
    }

    pub fn get(&self, key: &TitleKey) -> Option<&RemoteId> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &TitleKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TitleKey, &RemoteId)> {
        self.entries.iter()
    }
}

impl FromIterator<(TitleKey, RemoteId)> for ExistenceIndex {
    fn from_iter<I: IntoIterator<Item = (TitleKey, RemoteId)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
