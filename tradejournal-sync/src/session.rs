//! Session: the local trades and what the jobs learned about them.
//!
//! Row status, field diffs and known remote ids outlive a single job: Insert
//! acts on what Check marked missing, Update on what Check found drifted.
//! Steps describe their writes as a [`StepEffects`] and the session applies
//! it in one go.

use std::collections::{HashMap, HashSet};
use tradejournal_core::domain::{LocalIndex, RemoteId, RowStatus, TitleKey, TradeRecord};
use tradejournal_core::FieldDiff;

/// Writes produced by processing one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepEffects {
    pub index: LocalIndex,
    pub status: Option<RowStatus>,
    /// `Some(empty)` clears the stored diff.
    pub diff: Option<FieldDiff>,
    pub link: Option<(TitleKey, RemoteId)>,
    pub unlink: Option<TitleKey>,
    /// Whether a Check saw the row present. Only Check sets this.
    pub confirmed: Option<bool>,
}

impl StepEffects {
    pub fn new(index: LocalIndex) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn status(mut self, status: RowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn diff(mut self, diff: FieldDiff) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn link(mut self, key: TitleKey, id: RemoteId) -> Self {
        self.link = Some((key, id));
        self
    }

    pub fn unlink(mut self, key: TitleKey) -> Self {
        self.unlink = Some(key);
        self
    }

    pub fn confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = Some(confirmed);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    records: Vec<TradeRecord>,
    statuses: HashMap<LocalIndex, RowStatus>,
    diffs: HashMap<LocalIndex, FieldDiff>,
    remote_refs: HashMap<TitleKey, RemoteId>,
    confirmed: HashSet<LocalIndex>,
}

impl Session {
    pub fn new(records: Vec<TradeRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn record(&self, index: LocalIndex) -> Option<&TradeRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn status(&self, index: LocalIndex) -> RowStatus {
        self.statuses.get(&index).copied().unwrap_or_default()
    }

    /// The row is `exists` and the latest Check that covered it saw it
    /// present. Rows Insert created are not confirmed until a Check runs.
    pub fn is_confirmed_present(&self, index: LocalIndex) -> bool {
        self.status(index) == RowStatus::Exists && self.confirmed.contains(&index)
    }

    pub fn diff(&self, index: LocalIndex) -> Option<&FieldDiff> {
        self.diffs.get(&index)
    }

    pub fn has_diff(&self, index: LocalIndex) -> bool {
        self.diffs.get(&index).is_some_and(|d| !d.is_empty())
    }

    pub fn diffs(&self) -> &HashMap<LocalIndex, FieldDiff> {
        &self.diffs
    }

    pub fn remote_id(&self, key: &TitleKey) -> Option<&RemoteId> {
        self.remote_refs.get(key)
    }

    pub fn remote_refs(&self) -> &HashMap<TitleKey, RemoteId> {
        &self.remote_refs
    }

    /// Remote id of a local row, through its title key.
    pub fn remote_id_for(&self, index: LocalIndex) -> Option<&RemoteId> {
        let key = self.records.get(index)?.title_key()?;
        self.remote_refs.get(&key)
    }

    /// Learn remote ids in bulk, e.g. from a freshly loaded existence index.
    pub fn link_all(&mut self, refs: impl IntoIterator<Item = (TitleKey, RemoteId)>) {
        self.remote_refs.extend(refs);
    }

    pub(crate) fn set_status(&mut self, index: LocalIndex, status: RowStatus) {
        self.statuses.insert(index, status);
    }

    pub fn apply(&mut self, effects: StepEffects) {
        let StepEffects {
            index,
            status,
            diff,
            link,
            unlink,
            confirmed,
        } = effects;
        if let Some(status) = status {
            self.statuses.insert(index, status);
        }
        match diff {
            Some(d) if d.is_empty() => {
                self.diffs.remove(&index);
            }
            Some(d) => {
                self.diffs.insert(index, d);
            }
            None => {}
        }
        if let Some(key) = unlink {
            self.remote_refs.remove(&key);
        }
        if let Some((key, id)) = link {
            self.remote_refs.insert(key, id);
        }
        match confirmed {
            Some(true) => {
                self.confirmed.insert(index);
            }
            Some(false) => {
                self.confirmed.remove(&index);
            }
            None => {}
        }
    }
}
