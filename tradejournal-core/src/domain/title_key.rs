//! TitleKey: the join key between local trades and remote journal pages.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `ticker@ISO-8601(datetime)`, e.g. `AAPL@2024-01-10T14:30:00Z`.
///
/// Identity is symbol plus instant. Two local rows with the same key are the
/// same logical trade no matter what their local ids are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TitleKey(String);

impl TitleKey {
    pub fn new(ticker: &str, datetime: DateTime<Utc>) -> Self {
        Self(format!(
            "{}@{}",
            ticker.trim(),
            datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }

    /// Wrap a title read back from the remote journal.
    pub fn from_title(title: impl Into<String>) -> Self {
        Self(title.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ticker half of the key.
    pub fn ticker(&self) -> &str {
        self.0.split_once('@').map(|(t, _)| t).unwrap_or(&self.0)
    }
}

impl fmt::Display for TitleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
