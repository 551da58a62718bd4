//! TradeRecord: an aggregated, closed position computed from broker executions.

use super::metadata::TradeMetadata;
use super::title_key::TitleKey;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Net direction of the aggregated position. `Flat` is rendered `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregatedSide {
    #[serde(rename = "LONG")]
    Long,
    #[serde(rename = "SHORT")]
    Short,
    #[serde(rename = "-")]
    Flat,
}

impl AggregatedSide {
    pub fn label(self) -> &'static str {
        match self {
            AggregatedSide::Long => "LONG",
            AggregatedSide::Short => "SHORT",
            AggregatedSide::Flat => "-",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Some(AggregatedSide::Long),
            "SHORT" => Some(AggregatedSide::Short),
            "-" | "" => Some(AggregatedSide::Flat),
            _ => None,
        }
    }
}

impl fmt::Display for AggregatedSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeResult {
    #[serde(rename = "WIN")]
    Win,
    #[serde(rename = "LOSE")]
    Lose,
}

impl TradeResult {
    pub fn label(self) -> &'static str {
        match self {
            TradeResult::Win => "WIN",
            TradeResult::Lose => "LOSE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WIN" => Some(TradeResult::Win),
            "LOSE" | "LOSS" => Some(TradeResult::Lose),
            _ => None,
        }
    }

    /// Zero P/L counts as a loss (commissions were paid).
    pub fn from_pl(pl: Decimal) -> Self {
        if pl > Decimal::ZERO {
            TradeResult::Win
        } else {
            TradeResult::Lose
        }
    }
}

/// A locally computed aggregated trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Local row id; absent for rows that were never persisted.
    #[serde(default)]
    pub id: Option<i64>,
    pub datetime: Option<DateTime<Utc>>,
    pub ticker: Option<String>,
    pub aggregated_side: AggregatedSide,
    pub result: TradeResult,
    pub realized_pl: Decimal,
    /// Seconds between the opening and the closing execution.
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub metadata: Option<TradeMetadata>,
}

impl TradeRecord {
    pub fn metadata_version(&self) -> Option<u32> {
        self.metadata.as_ref().map(TradeMetadata::version)
    }

    /// Realized P/L at the 2-place scale used for every comparison.
    pub fn realized_pl_2dp(&self) -> Decimal {
        self.realized_pl
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    fn ticker_trimmed(&self) -> Option<&str> {
        self.ticker.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// `None` when ticker or datetime is missing: such a row cannot match
    /// anything remotely.
    pub fn title_key(&self) -> Option<TitleKey> {
        Some(TitleKey::new(self.ticker_trimmed()?, self.datetime?))
    }

    pub fn natural_key(&self) -> Option<NaturalKey> {
        Some(NaturalKey {
            ticker: self.ticker_trimmed()?.to_string(),
            datetime: self.datetime?,
            side: self.aggregated_side,
            realized_pl: self.realized_pl_2dp(),
        })
    }

    /// Calendar day the trade belongs to (UTC).
    pub fn trade_date(&self) -> Option<NaiveDate> {
        self.datetime.map(|dt| dt.date_naive())
    }

    /// Key of the per-day relation page, `YYYY-MM-DD`.
    pub fn date_key(&self) -> Option<String> {
        self.trade_date().map(|d| d.format("%Y-%m-%d").to_string())
    }

    /// Key of the per-ticker relation page.
    pub fn ticker_key(&self) -> Option<String> {
        self.ticker_trimmed().map(str::to_string)
    }

    /// Entry time plus the holding duration; `None` when either is absent or
    /// the sum is out of range.
    pub fn close_datetime(&self) -> Option<DateTime<Utc>> {
        let held = chrono::Duration::try_seconds(self.duration_secs?)?;
        self.datetime?.checked_add_signed(held)
    }

    pub fn is_winner(&self) -> bool {
        self.result == TradeResult::Win
    }
}

/// Local deduplication key: symbol, instant, side and P/L at 2 dp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub ticker: String,
    pub datetime: DateTime<Utc>,
    pub side: AggregatedSide,
    pub realized_pl: Decimal,
}

/// Drop records whose natural key was already seen, keeping the first.
///
/// Rows without a natural key are kept as-is; they are reported as
/// unmatchable later instead of being silently discarded here.
pub fn dedup(records: Vec<TradeRecord>) -> Vec<TradeRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| match r.natural_key() {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample_trade() -> TradeRecord {
        TradeRecord {
            id: Some(7),
            datetime: Some(Utc.with_ymd_and_hms(2024, 1, 10, 14, 30, 0).unwrap()),
            ticker: Some("AAPL".into()),
            aggregated_side: AggregatedSide::Long,
            result: TradeResult::Win,
            realized_pl: dec!(125.50),
            duration_secs: Some(900),
            metadata: None,
        }
    }

    #[test]
    fn title_key_ignores_local_id() {
        let a = sample_trade();
        let mut b = sample_trade();
        b.id = None;
        assert_eq!(a.title_key(), b.title_key());
    }

    #[test]
    fn title_key_requires_ticker_and_datetime() {
        let mut no_ticker = sample_trade();
        no_ticker.ticker = Some("  ".into());
        assert!(no_ticker.title_key().is_none());

        let mut no_time = sample_trade();
        no_time.datetime = None;
        assert!(no_time.title_key().is_none());
    }

    #[test]
    fn natural_key_rounds_pl() {
        let a = sample_trade();
        let mut b = sample_trade();
        b.realized_pl = dec!(125.504);
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let first = sample_trade();
        let mut dup = sample_trade();
        dup.id = Some(99);
        let mut other = sample_trade();
        other.aggregated_side = AggregatedSide::Short;

        let out = dedup(vec![first, dup, other]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, Some(7));
        assert_eq!(out[1].aggregated_side, AggregatedSide::Short);
    }

    #[test]
    fn dedup_keeps_unkeyed_rows() {
        let mut broken = sample_trade();
        broken.ticker = None;
        let out = dedup(vec![broken.clone(), broken]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn relation_keys() {
        let t = sample_trade();
        assert_eq!(t.date_key().as_deref(), Some("2024-01-10"));
        assert_eq!(t.ticker_key().as_deref(), Some("AAPL"));
        assert_eq!(
            t.close_datetime(),
            Some(Utc.with_ymd_and_hms(2024, 1, 10, 14, 45, 0).unwrap())
        );
    }

    #[test]
    fn close_datetime_out_of_range_is_none() {
        let mut t = sample_trade();
        t.duration_secs = Some(9_000_000_000_000_000);
        assert_eq!(t.close_datetime(), None);
        t.duration_secs = Some(i64::MIN);
        assert_eq!(t.close_datetime(), None);
    }

    #[test]
    fn side_and_result_parsing() {
        assert_eq!(AggregatedSide::parse("short"), Some(AggregatedSide::Short));
        assert_eq!(AggregatedSide::parse("-"), Some(AggregatedSide::Flat));
        assert_eq!(AggregatedSide::parse("sideways"), None);
        assert_eq!(TradeResult::parse("Loss"), Some(TradeResult::Lose));
        assert_eq!(TradeResult::from_pl(dec!(0)), TradeResult::Lose);
    }

    #[test]
    fn trade_serialization_roundtrip() {
        let trade = sample_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let deser: TradeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, deser);
    }
}
