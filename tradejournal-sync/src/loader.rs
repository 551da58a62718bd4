//! Local trade input: CSV or JSON exports of already-aggregated trades.
//!
//! CSV columns (header row required, unknown columns ignored):
//! `id, datetime, ticker, side, result, realized_pl, duration_secs,
//! metadata_version, rank, setup, close_trigger, order_type, followed_plan,
//! revenge_trade, fomo, comment`.
//!
//! JSON input is an array of `TradeRecord` objects.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};
use tradejournal_core::domain::{
    dedup, AggregatedSide, MetadataV1, MetadataV2, TradeMetadata, TradeRecord, TradeResult,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("trade file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported trade file extension: {0} (expected .csv or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("row {row}: {message}")]
    Row { row: usize, message: String },
}

/// Trades read from disk, after natural-key deduplication.
#[derive(Debug, Clone)]
pub struct LoadedTrades {
    pub records: Vec<TradeRecord>,
    pub duplicates_dropped: usize,
}

/// Load trades from `path`, choosing the parser by extension.
pub fn load_trades(path: &Path) -> Result<LoadedTrades, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let raw = match ext.as_deref() {
        Some("csv") => {
            let reader = csv::Reader::from_path(path)?;
            read_csv(reader)?
        }
        Some("json") => {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Vec<TradeRecord>>(&content)?
        }
        _ => return Err(LoadError::UnsupportedFormat(path.to_path_buf())),
    };

    let before = raw.len();
    let records = dedup(raw);
    let duplicates_dropped = before - records.len();
    info!(
        path = %path.display(),
        trades = records.len(),
        duplicates_dropped,
        "loaded local trades"
    );
    Ok(LoadedTrades {
        records,
        duplicates_dropped,
    })
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    id: Option<i64>,
    datetime: Option<String>,
    ticker: Option<String>,
    side: Option<String>,
    result: Option<String>,
    realized_pl: String,
    duration_secs: Option<i64>,
    metadata_version: Option<u32>,
    rank: Option<String>,
    setup: Option<String>,
    close_trigger: Option<String>,
    order_type: Option<String>,
    followed_plan: Option<String>,
    revenge_trade: Option<String>,
    fomo: Option<String>,
    comment: Option<String>,
}

/// Parse CSV rows from any reader. Rows are numbered from 1, header excluded.
pub fn read_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<TradeRecord>, LoadError> {
    let mut out = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row_no = i + 1;
        let row = row?;
        let record = row_to_record(row).map_err(|message| LoadError::Row {
            row: row_no,
            message,
        })?;
        out.push(record);
    }
    debug!(rows = out.len(), "parsed trade CSV");
    Ok(out)
}

fn row_to_record(row: CsvRow) -> Result<TradeRecord, String> {
    let datetime = non_empty(row.datetime).map(|s| parse_datetime(&s)).transpose()?;

    let realized_pl = Decimal::from_str(row.realized_pl.trim())
        .map_err(|e| format!("invalid realized_pl '{}': {e}", row.realized_pl))?;

    let aggregated_side = match non_empty(row.side) {
        Some(s) => AggregatedSide::parse(&s).ok_or_else(|| format!("invalid side '{s}'"))?,
        None => AggregatedSide::Flat,
    };

    let result = match non_empty(row.result) {
        Some(s) => TradeResult::parse(&s).ok_or_else(|| format!("invalid result '{s}'"))?,
        None => TradeResult::from_pl(realized_pl),
    };

    let rank = non_empty(row.rank);
    let setup = non_empty(row.setup);
    let close_trigger = non_empty(row.close_trigger);
    let order_type = non_empty(row.order_type);
    let comment = non_empty(row.comment);
    let followed_plan = parse_flag(row.followed_plan, "followed_plan")?;
    let revenge_trade = parse_flag(row.revenge_trade, "revenge_trade")?;
    let fomo = parse_flag(row.fomo, "fomo")?;

    let any_annotation = rank.is_some()
        || setup.is_some()
        || close_trigger.is_some()
        || order_type.is_some()
        || comment.is_some()
        || followed_plan.is_some()
        || revenge_trade.is_some()
        || fomo.is_some();

    let metadata = match row.metadata_version {
        Some(1) => Some(TradeMetadata::V1(MetadataV1 {
            rank,
            setup,
            close_trigger,
            comment,
        })),
        Some(2) => Some(TradeMetadata::V2(MetadataV2 {
            rank,
            setup,
            close_trigger,
            order_type,
            followed_plan,
            revenge_trade,
            fomo,
            comment,
        })),
        Some(v) => return Err(format!("unknown metadata_version {v}")),
        None if any_annotation => Some(TradeMetadata::V2(MetadataV2 {
            rank,
            setup,
            close_trigger,
            order_type,
            followed_plan,
            revenge_trade,
            fomo,
            comment,
        })),
        None => None,
    };

    Ok(TradeRecord {
        id: row.id,
        datetime,
        ticker: non_empty(row.ticker),
        aggregated_side,
        result,
        realized_pl,
        duration_secs: row.duration_secs,
        metadata,
    })
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("invalid datetime '{s}'"))
}

fn parse_flag(s: Option<String>, column: &str) -> Result<Option<bool>, String> {
    match non_empty(s).map(|s| s.to_ascii_lowercase()).as_deref() {
        None => Ok(None),
        Some("true" | "yes" | "1") => Ok(Some(true)),
        Some("false" | "no" | "0") => Ok(Some(false)),
        Some(other) => Err(format!("invalid {column} '{other}'")),
    }
}
