use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use csv::StringRecord;
use thiserror::Error;
use tracing::debug;

use crate::data::{Candle, CandleSeries};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("input file contains no valid rows")]
    Empty,

    #[error("unable to infer timestamp from record: {0:?}")]
    Timestamp(StringRecord),

    #[error("failed to parse numeric field '{field}' from value '{value}'")]
    ParseNumber { field: &'static str, value: String },

    #[error("header is missing the '{0}' column")]
    MissingColumn(&'static str),
}

/// Where each field lives in a record.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnMap {
    date: usize,
    time: Option<usize>,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl ColumnMap {
    /// `date,open,high,low,close,volume` or `date,time,open,high,low,close,volume`.
    fn positional(field_count: usize) -> Self {
        let (time, offset) = if field_count >= 7 { (Some(1), 2) } else { (None, 1) };
        Self {
            date: 0,
            time,
            open: offset,
            high: offset + 1,
            low: offset + 2,
            close: offset + 3,
            volume: offset + 4,
        }
    }

    fn from_header(header: &StringRecord) -> Result<Self, LoaderError> {
        let names: Vec<String> = header.iter().map(|f| f.trim().to_ascii_lowercase()).collect();
        let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));
        let require = |candidates: &[&'static str]| {
            find(candidates).ok_or(LoaderError::MissingColumn(candidates[0]))
        };

        let date = require(&["date", "datetime", "timestamp", "time"])?;
        let time = find(&["time"]).filter(|&idx| idx != date);
        Ok(Self {
            date,
            time,
            open: require(&["open"])?,
            high: require(&["high"])?,
            low: require(&["low"])?,
            close: require(&["close"])?,
            volume: require(&["volume"])?,
        })
    }
}

/// Read raw candles from a CSV file, interpreting naive timestamps in `tz`.
///
/// A header row, when present, decides the column layout; otherwise columns
/// are taken positionally. The rows are returned sorted but otherwise
/// unrepaired; see [`load_series_from_csv`] for a cleaned series.
pub fn load_candles_from_csv<P: AsRef<Path>>(path: P, tz: Tz) -> Result<Vec<Candle>> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).with_context(|| format!("failed to open {:?}", path_ref))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);

    let mut columns: Option<ColumnMap> = None;
    let mut candles = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        if columns.is_none() && is_header(&record) {
            columns = Some(ColumnMap::from_header(&record)?);
            continue;
        }
        let layout = columns.unwrap_or_else(|| ColumnMap::positional(record.len()));
        if let Some(candle) = parse_record(&record, &layout, tz)? {
            candles.push(candle);
        }
    }

    if candles.is_empty() {
        return Err(LoaderError::Empty.into());
    }

    candles.sort_by_key(|candle| candle.timestamp);
    debug!(path = %path_ref.display(), rows = candles.len(), "loaded candles");
    Ok(candles)
}

/// Load and clean a CSV file into a ready-to-analyse series.
pub fn load_series_from_csv<P: AsRef<Path>>(path: P, tz: Tz) -> Result<CandleSeries> {
    let raw = load_candles_from_csv(path, tz)?;
    let raw_len = raw.len();
    let series = CandleSeries::clean(raw);
    if series.len() < raw_len {
        debug!(dropped = raw_len - series.len(), "cleaning removed invalid candles");
    }
    if series.is_empty() {
        return Err(LoaderError::Empty.into());
    }
    Ok(series)
}

fn is_header(record: &StringRecord) -> bool {
    record
        .get(0)
        .map(|first| {
            let first = first.trim().to_ascii_lowercase();
            matches!(first.as_str(), "date" | "datetime" | "timestamp" | "time")
        })
        .unwrap_or(false)
}

fn parse_record(record: &StringRecord, columns: &ColumnMap, tz: Tz) -> Result<Option<Candle>> {
    let field = |idx: usize| record.get(idx).map(str::trim).filter(|f| !f.is_empty());
    if field(columns.volume).is_none() && field(columns.close).is_none() {
        return Ok(None);
    }

    let date = field(columns.date).unwrap_or_default();
    let timestamp = match columns.time.and_then(field) {
        Some(time) => parse_date_time_pair(date, time, tz),
        None => parse_timestamp(date, tz),
    }
    .ok_or_else(|| LoaderError::Timestamp(record.clone()))?;

    Ok(Some(Candle {
        timestamp,
        open: parse_number(field(columns.open), "open")?,
        high: parse_number(field(columns.high), "high")?,
        low: parse_number(field(columns.low), "low")?,
        close: parse_number(field(columns.close), "close")?,
        volume: parse_number(field(columns.volume), "volume")?,
    }))
}

fn parse_number(value: Option<&str>, field: &'static str) -> Result<f64> {
    let value = value.ok_or_else(|| LoaderError::ParseNumber {
        field,
        value: String::from("<missing>"),
    })?;
    value
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| LoaderError::ParseNumber {
            field,
            value: value.to_string(),
        })
        .map_err(anyhow::Error::from)
}

fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => tz.from_utc_datetime(&naive),
    }
}

fn parse_timestamp(value: &str, tz: Tz) -> Option<DateTime<Tz>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&tz));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&tz));
    }

    let patterns = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    for pattern in &patterns {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, pattern) {
            return Some(localize(datetime, tz));
        }
    }

    parse_date(value)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| localize(datetime, tz))
}

fn parse_date_time_pair(date_str: &str, time_str: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let date = parse_date(date_str)?;
    let time = parse_time(time_str)?;
    Some(localize(NaiveDateTime::new(date, time), tz))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let patterns = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];
    patterns
        .iter()
        .find_map(|pattern| NaiveDate::parse_from_str(value, pattern).ok())
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let patterns = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];
    patterns
        .iter()
        .find_map(|pattern| NaiveTime::parse_from_str(value, pattern).ok())
}
