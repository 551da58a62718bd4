//! ReconciliationQueue: ordered pending items plus per-item retry counts.

use std::collections::{HashMap, VecDeque};
use tradejournal_core::domain::{LocalIndex, TradeRecord};

/// One unit of work: a local row and the record snapshot taken at start.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedItem {
    pub index: LocalIndex,
    pub record: TradeRecord,
}

impl QueuedItem {
    pub fn new(index: LocalIndex, record: TradeRecord) -> Self {
        Self { index, record }
    }
}

/// FIFO of items still to process. Retried items go to the back.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationQueue {
    pending: VecDeque<QueuedItem>,
    retry_counts: HashMap<LocalIndex, u32>,
}

impl ReconciliationQueue {
    pub fn new(items: impl IntoIterator<Item = QueuedItem>) -> Self {
        Self {
            pending: items.into_iter().collect(),
            retry_counts: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn front(&self) -> Option<&QueuedItem> {
        self.pending.front()
    }

    pub fn pop_front(&mut self) -> Option<QueuedItem> {
        self.pending.pop_front()
    }

    /// Put an item back at the end, behind everything still pending.
    pub fn requeue(&mut self, item: QueuedItem) {
        self.pending.push_back(item);
    }

    /// Drop every pending item, returning them. Retry counts are kept so a
    /// report can still show them.
    pub fn drain(&mut self) -> Vec<QueuedItem> {
        self.pending.drain(..).collect()
    }

    pub fn retry_count(&self, index: LocalIndex) -> u32 {
        self.retry_counts.get(&index).copied().unwrap_or(0)
    }

    /// Increment and return the new retry count for `index`.
    pub fn bump_retry(&mut self, index: LocalIndex) -> u32 {
        let count = self.retry_counts.entry(index).or_insert(0);
        *count += 1;
        *count
    }

    pub fn retry_counts(&self) -> &HashMap<LocalIndex, u32> {
        &self.retry_counts
    }

    pub fn indices(&self) -> impl Iterator<Item = LocalIndex> + '_ {
        self.pending.iter().map(|item| item.index)
    }
}
