//! DiffEngine: field-level drift between a local trade and its remote page.

use crate::domain::TradeRecord;
use crate::fields::{project, Field, FieldMap, FieldValue};
use crate::remote::RemoteRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fields compared by `diff`. The title is the join key and is never drift.
pub const COMPARED_FIELDS: [Field; 15] = [
    Field::Ticker,
    Field::Side,
    Field::Result,
    Field::RealizedPl,
    Field::Duration,
    Field::EntryTimeslot,
    Field::CloseTimeslot,
    Field::Rank,
    Field::Setup,
    Field::CloseTrigger,
    Field::OrderType,
    Field::FollowedPlan,
    Field::RevengeTrade,
    Field::Fomo,
    Field::Comment,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Local value.
    pub expected: FieldValue,
    /// Remote value.
    pub actual: FieldValue,
}

/// Sparse `{field → {expected, actual}}` map. Empty means in sync.
pub type FieldDiff = BTreeMap<Field, Mismatch>;

/// Compare two field maps. Fields missing on either side are skipped, so a
/// remote page written by an older metadata version is not flagged for the
/// fields it never had.
pub fn diff_fields(local: &FieldMap, remote: &FieldMap) -> FieldDiff {
    COMPARED_FIELDS
        .iter()
        .filter_map(|field| {
            let expected = local.get(field)?;
            let actual = remote.get(field)?;
            (!expected.matches(actual)).then(|| {
                (
                    *field,
                    Mismatch {
                        expected: expected.clone(),
                        actual: actual.clone(),
                    },
                )
            })
        })
        .collect()
}

/// Diff a local trade against a fetched remote record. Pure, no I/O.
pub fn diff(local: &TradeRecord, remote: &RemoteRecord) -> FieldDiff {
    diff_fields(&project(local), &remote.fields)
}

/// Renders a diff as `field: expected → actual` lines.
pub struct DiffDisplay<'a>(pub &'a FieldDiff);

impl fmt::Display for DiffDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, m)) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{field}: {} -> {}", m.expected, m.actual)?;
        }
        Ok(())
    }
}
