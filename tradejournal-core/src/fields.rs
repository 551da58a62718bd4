//! Canonical field projection of a trade.
//!
//! Both the create/update payloads and the diff engine work on the same
//! `FieldMap`, so a value that is pushed is exactly the value later compared.

use crate::domain::TradeRecord;
use chrono::{DateTime, Timelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Width of an entry/close timeslot bucket.
pub const TIMESLOT_MINUTES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Ticker,
    Side,
    Result,
    RealizedPl,
    Duration,
    EntryTimeslot,
    CloseTimeslot,
    Rank,
    Setup,
    CloseTrigger,
    OrderType,
    FollowedPlan,
    RevengeTrade,
    Fomo,
    Comment,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::Title,
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

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Ticker => "ticker",
            Field::Side => "side",
            Field::Result => "result",
            Field::RealizedPl => "realized_pl",
            Field::Duration => "duration",
            Field::EntryTimeslot => "entry_timeslot",
            Field::CloseTimeslot => "close_timeslot",
            Field::Rank => "rank",
            Field::Setup => "setup",
            Field::CloseTrigger => "close_trigger",
            Field::OrderType => "order_type",
            Field::FollowedPlan => "followed_plan",
            Field::RevengeTrade => "revenge_trade",
            Field::Fomo => "fomo",
            Field::Comment => "comment",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Select(String),
    Decimal(Decimal),
    Integer(i64),
    Bool(bool),
}

impl FieldValue {
    /// Comparison form: decimals at 2 dp, text trimmed.
    pub fn normalized(&self) -> FieldValue {
        match self {
            FieldValue::Text(s) => FieldValue::Text(s.trim().to_string()),
            FieldValue::Select(s) => FieldValue::Select(s.trim().to_string()),
            FieldValue::Decimal(d) => FieldValue::Decimal(
                d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            ),
            FieldValue::Integer(i) => FieldValue::Integer(*i),
            FieldValue::Bool(b) => FieldValue::Bool(*b),
        }
    }

    /// Equality after normalization. Text and select holding the same string
    /// are equal; remote schemas drift between the two.
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self.normalized(), other.normalized()) {
            (
                FieldValue::Text(a) | FieldValue::Select(a),
                FieldValue::Text(b) | FieldValue::Select(b),
            ) => a == b,
            (a, b) => a == b,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Select(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) | FieldValue::Select(s) => f.write_str(s),
            FieldValue::Decimal(d) => write!(f, "{}", d.round_dp(2)),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

pub type FieldMap = BTreeMap<Field, FieldValue>;

/// `HH:MM` label of the 30-minute bucket containing `dt`.
pub fn timeslot(dt: DateTime<Utc>) -> String {
    let minute = dt.minute() - dt.minute() % TIMESLOT_MINUTES;
    format!("{:02}:{:02}", dt.hour(), minute)
}

/// Project a trade onto its canonical fields. Absent local values are left
/// out rather than encoded as empty.
pub fn project(record: &TradeRecord) -> FieldMap {
    let mut fields = FieldMap::new();

    if let Some(key) = record.title_key() {
        fields.insert(Field::Title, FieldValue::Text(key.to_string()));
    }
    if let Some(ticker) = record.ticker_key() {
        fields.insert(Field::Ticker, FieldValue::Select(ticker));
    }
    fields.insert(
        Field::Side,
        FieldValue::Select(record.aggregated_side.label().to_string()),
    );
    fields.insert(
        Field::Result,
        FieldValue::Select(record.result.label().to_string()),
    );
    fields.insert(Field::RealizedPl, FieldValue::Decimal(record.realized_pl_2dp()));
    if let Some(secs) = record.duration_secs {
        fields.insert(Field::Duration, FieldValue::Integer(secs));
    }
    if let Some(dt) = record.datetime {
        fields.insert(Field::EntryTimeslot, FieldValue::Select(timeslot(dt)));
    }
    if let Some(close) = record.close_datetime() {
        fields.insert(Field::CloseTimeslot, FieldValue::Select(timeslot(close)));
    }

    if let Some(meta) = &record.metadata {
        let m = meta.as_latest();
        let selects = [
            (Field::Rank, m.rank),
            (Field::Setup, m.setup),
            (Field::CloseTrigger, m.close_trigger),
            (Field::OrderType, m.order_type),
        ];
        for (field, value) in selects {
            if let Some(v) = value {
                fields.insert(field, FieldValue::Select(v));
            }
        }
        let flags = [
            (Field::FollowedPlan, m.followed_plan),
            (Field::RevengeTrade, m.revenge_trade),
            (Field::Fomo, m.fomo),
        ];
        for (field, value) in flags {
            if let Some(v) = value {
                fields.insert(field, FieldValue::Bool(v));
            }
        }
        if let Some(comment) = m.comment {
            fields.insert(Field::Comment, FieldValue::Text(comment));
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AggregatedSide, MetadataV1, TradeMetadata, TradeResult};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn trade() -> TradeRecord {
        TradeRecord {
            id: None,
            datetime: Some(Utc.with_ymd_and_hms(2024, 1, 10, 14, 47, 12).unwrap()),
            ticker: Some("AAPL".into()),
            aggregated_side: AggregatedSide::Short,
            result: TradeResult::Lose,
            realized_pl: dec!(-42.129),
            duration_secs: Some(1_200),
            metadata: Some(TradeMetadata::V1(MetadataV1 {
                rank: Some("B".into()),
                comment: Some("chased".into()),
                ..MetadataV1::default()
            })),
        }
    }

    #[test]
    fn timeslot_floors_to_half_hour() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 10, 9, 59, 59).unwrap();
        assert_eq!(timeslot(dt), "09:30");
        let dt = Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap();
        assert_eq!(timeslot(dt), "10:00");
    }

    #[test]
    fn projection_contains_present_values_only() {
        let fields = project(&trade());
        assert_eq!(
            fields.get(&Field::Title),
            Some(&FieldValue::Text("AAPL@2024-01-10T14:47:12Z".into()))
        );
        assert_eq!(fields.get(&Field::RealizedPl), Some(&FieldValue::Decimal(dec!(-42.13))));
        assert_eq!(fields.get(&Field::EntryTimeslot), Some(&FieldValue::Select("14:30".into())));
        assert_eq!(fields.get(&Field::CloseTimeslot), Some(&FieldValue::Select("15:00".into())));
        assert_eq!(fields.get(&Field::Rank), Some(&FieldValue::Select("B".into())));
        assert!(!fields.contains_key(&Field::Setup));
        assert!(!fields.contains_key(&Field::Fomo));
    }

    #[test]
    fn projection_without_datetime_has_no_title_or_slots() {
        let mut t = trade();
        t.datetime = None;
        let fields = project(&t);
        assert!(!fields.contains_key(&Field::Title));
        assert!(!fields.contains_key(&Field::EntryTimeslot));
        assert!(!fields.contains_key(&Field::CloseTimeslot));
        assert!(fields.contains_key(&Field::Side));
    }

    #[test]
    fn decimal_match_uses_two_places() {
        let a = FieldValue::Decimal(dec!(125.5));
        let b = FieldValue::Decimal(dec!(125.500));
        let c = FieldValue::Decimal(dec!(125.51));
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn text_and_select_compare_by_content() {
        let a = FieldValue::Text("A ".into());
        let b = FieldValue::Select("A".into());
        assert!(a.matches(&b));
        assert!(!a.matches(&FieldValue::Bool(true)));
    }
}
