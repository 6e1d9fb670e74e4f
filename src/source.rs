use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use chrono_tz::Tz;
use thiserror::Error;
use tracing::debug;

use crate::data::{CandleSeries, Timeframe};
use crate::loader::load_series_from_csv;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to load series for {symbol}: {source}")]
    Load {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unsupported period '{0}'")]
    Period(String),

    #[error("unsupported exchange '{0}'")]
    Exchange(String),
}

/// How much history to request, counted back from the latest candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Day1,
    Day5,
    Month1,
    Month3,
    Month6,
    Year1,
    Year2,
    Year5,
    Year10,
    Max,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day1 => "1d",
            Period::Day5 => "5d",
            Period::Month1 => "1mo",
            Period::Month3 => "3mo",
            Period::Month6 => "6mo",
            Period::Year1 => "1y",
            Period::Year2 => "2y",
            Period::Year5 => "5y",
            Period::Year10 => "10y",
            Period::Max => "max",
        }
    }

    pub fn lookback(&self) -> Option<Duration> {
        let days = match self {
            Period::Day1 => 1,
            Period::Day5 => 5,
            Period::Month1 => 30,
            Period::Month3 => 91,
            Period::Month6 => 182,
            Period::Year1 => 365,
            Period::Year2 => 730,
            Period::Year5 => 1826,
            Period::Year10 => 3652,
            Period::Max => return None,
        };
        Some(Duration::days(days))
    }

    /// Period used when fetching a coarser timeframe for confluence, so weekly
    /// and monthly series still carry enough candles.
    pub fn widened_for(&self, timeframe: Timeframe) -> Period {
        if !matches!(timeframe, Timeframe::W1 | Timeframe::Mo1) {
            return *self;
        }
        match self {
            Period::Day1 | Period::Day5 => Period::Year1,
            Period::Month1 | Period::Month3 => Period::Year2,
            other => *other,
        }
    }

    /// Trim `series` to the candles inside this period.
    pub fn apply(&self, series: CandleSeries) -> CandleSeries {
        let start = self
            .lookback()
            .zip(series.last())
            .map(|(lookback, last)| last.timestamp - lookback);
        match start {
            Some(start) => series.since(start),
            None => series,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = SourceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "1d" => Ok(Period::Day1),
            "5d" => Ok(Period::Day5),
            "1mo" => Ok(Period::Month1),
            "3mo" => Ok(Period::Month3),
            "6mo" => Ok(Period::Month6),
            "1y" => Ok(Period::Year1),
            "2y" => Ok(Period::Year2),
            "5y" => Ok(Period::Year5),
            "10y" => Ok(Period::Year10),
            "max" => Ok(Period::Max),
            other => Err(SourceError::Period(other.to_string())),
        }
    }
}

/// Market-data provider boundary. `Ok(None)` means the symbol has no data.
pub trait SeriesSource: Send + Sync {
    fn get_series(
        &self,
        symbol: &str,
        period: Period,
        interval: Timeframe,
    ) -> Result<Option<CandleSeries>, SourceError>;
}

/// Reads `<dir>/<SYMBOL>_<interval>.csv`, falling back to `<dir>/<SYMBOL>.csv`.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
    tz: Tz,
}

impl CsvDirectorySource {
    pub fn new(root: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            root: root.into(),
            tz,
        }
    }

    fn locate(&self, symbol: &str, interval: Timeframe) -> Option<PathBuf> {
        [
            format!("{symbol}_{interval}.csv"),
            format!("{symbol}.csv"),
        ]
        .into_iter()
        .map(|name| self.root.join(name))
        .find(|path| path.is_file())
    }
}

impl SeriesSource for CsvDirectorySource {
    fn get_series(
        &self,
        symbol: &str,
        period: Period,
        interval: Timeframe,
    ) -> Result<Option<CandleSeries>, SourceError> {
        let Some(path) = self.locate(symbol, interval) else {
            debug!(symbol, %interval, root = %self.root.display(), "no csv found");
            return Ok(None);
        };
        let series = load_series_from_csv(&path, self.tz).map_err(|source| SourceError::Load {
            symbol: symbol.to_string(),
            source,
        })?;
        let series = period.apply(series);
        Ok((!series.is_empty()).then_some(series))
    }
}

/// In-memory source keyed by symbol and interval.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: HashMap<(String, Timeframe), CandleSeries>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, interval: Timeframe, series: CandleSeries) {
        self.series.insert((symbol.into(), interval), series);
    }
}

impl SeriesSource for MemorySource {
    fn get_series(
        &self,
        symbol: &str,
        period: Period,
        interval: Timeframe,
    ) -> Result<Option<CandleSeries>, SourceError> {
        Ok(self
            .series
            .get(&(symbol.to_string(), interval))
            .map(|series| period.apply(series.clone()))
            .filter(|series| !series.is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Nse,
    Us,
}

impl FromStr for Exchange {
    type Err = SourceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nse" => Ok(Exchange::Nse),
            "us" => Ok(Exchange::Us),
            other => Err(SourceError::Exchange(other.to_string())),
        }
    }
}

/// Normalise a ticker for the exchange: `.NS` suffix for NSE, none for US listings.
pub fn format_symbol(symbol: &str, exchange: Exchange) -> String {
    let upper = symbol.trim().to_ascii_uppercase();
    match exchange {
        Exchange::Nse if upper.ends_with(".NS") => upper,
        Exchange::Nse => format!("{upper}.NS"),
        Exchange::Us => upper.strip_suffix(".NS").map(str::to_string).unwrap_or(upper),
    }
}

/// Wraps a source so bare tickers are looked up under their exchange symbol.
#[derive(Debug, Clone)]
pub struct ExchangeSource<S> {
    inner: S,
    exchange: Exchange,
}

impl<S: SeriesSource> ExchangeSource<S> {
    pub fn new(inner: S, exchange: Exchange) -> Self {
        Self { inner, exchange }
    }
}

impl<S: SeriesSource> SeriesSource for ExchangeSource<S> {
    fn get_series(
        &self,
        symbol: &str,
        period: Period,
        interval: Timeframe,
    ) -> Result<Option<CandleSeries>, SourceError> {
        self.inner
            .get_series(&format_symbol(symbol, self.exchange), period, interval)
    }
}
