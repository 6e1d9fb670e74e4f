use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Single OHLCV candle sampled at a uniform interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub timestamp: DateTime<Tz>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("candle {index} has a non-positive or non-finite price")]
    NonPositivePrice { index: usize },

    #[error("candle {index} has a high/low range that does not cover its open and close")]
    InvertedRange { index: usize },

    #[error("candle {index} is degenerate (high equals low)")]
    DegenerateCandle { index: usize },

    #[error("candle {index} has a negative or non-finite volume")]
    NegativeVolume { index: usize },

    #[error("candle {index} is not strictly after its predecessor")]
    OutOfOrder { index: usize },
}

/// Validated, time-ordered candle sequence. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series from candles that are expected to be clean already.
    ///
    /// Fails fast on the first malformed candle instead of repairing it; use
    /// [`CandleSeries::clean`] for raw provider data.
    pub fn new(candles: Vec<Candle>) -> Result<Self, SeriesError> {
        for (index, candle) in candles.iter().enumerate() {
            let prices = [candle.open, candle.high, candle.low, candle.close];
            if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
                return Err(SeriesError::NonPositivePrice { index });
            }
            if !candle.volume.is_finite() || candle.volume < 0.0 {
                return Err(SeriesError::NegativeVolume { index });
            }
            if candle.high < candle.open.max(candle.close).max(candle.low)
                || candle.low > candle.open.min(candle.close)
            {
                return Err(SeriesError::InvertedRange { index });
            }
            if candle.high == candle.low {
                return Err(SeriesError::DegenerateCandle { index });
            }
        }

        for (offset, pair) in candles.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(SeriesError::OutOfOrder { index: offset + 1 });
            }
        }

        Ok(Self { candles })
    }

    /// Repair raw provider data into a valid series.
    ///
    /// Rows with missing or non-positive prices are dropped, high/low are
    /// widened to cover open and close, flat candles are removed, volume is
    /// made non-negative and the result is sorted with duplicate timestamps
    /// collapsed onto the first occurrence.
    pub fn clean(candles: Vec<Candle>) -> Self {
        let mut cleaned: Vec<Candle> = candles
            .into_iter()
            .filter(|c| {
                [c.open, c.high, c.low, c.close]
                    .iter()
                    .all(|p| p.is_finite() && *p > 0.0)
            })
            .map(|mut c| {
                let high = c.high.max(c.open).max(c.close).max(c.low);
                let low = c.low.min(c.open).min(c.close).min(c.high);
                c.high = high;
                c.low = low;
                c.volume = if c.volume.is_finite() { c.volume.abs() } else { 0.0 };
                c
            })
            .filter(|c| c.high != c.low)
            .collect();

        cleaned.sort_by_key(|c| c.timestamp);
        cleaned.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);
        Self { candles: cleaned }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Keep only candles at or after `start`.
    pub fn since(&self, start: DateTime<Tz>) -> Self {
        Self {
            candles: self
                .candles
                .iter()
                .filter(|c| c.timestamp >= start)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
#[error("unsupported timeframe '{0}'")]
pub struct ParseTimeframeError(String);

/// Candle interval used to tune pivot sensitivity and pick higher timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1wk")]
    W1,
    #[serde(rename = "1mo")]
    Mo1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1wk",
            Timeframe::Mo1 => "1mo",
        }
    }

    /// Pivot half-window before it is scaled by series length.
    pub fn base_pivot_window(&self) -> usize {
        match self {
            Timeframe::M1 | Timeframe::M5 => 2,
            Timeframe::M15 | Timeframe::H1 => 3,
            Timeframe::H4 => 4,
            Timeframe::D1 => 5,
            Timeframe::W1 => 3,
            Timeframe::Mo1 => 2,
            _ => 3,
        }
    }

    /// Coarser intervals consulted for confluence, nearest first.
    pub fn higher_timeframes(&self) -> &'static [Timeframe] {
        match self {
            Timeframe::M1 => &[Timeframe::M5, Timeframe::M15, Timeframe::H1],
            Timeframe::M5 => &[Timeframe::M15, Timeframe::H1, Timeframe::H4],
            Timeframe::M15 => &[Timeframe::H1, Timeframe::H4, Timeframe::D1],
            Timeframe::H1 => &[Timeframe::H4, Timeframe::D1, Timeframe::W1],
            Timeframe::H4 => &[Timeframe::D1, Timeframe::W1, Timeframe::Mo1],
            Timeframe::D1 => &[Timeframe::W1, Timeframe::Mo1],
            _ => &[],
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" | "60m" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            "1wk" => Ok(Timeframe::W1),
            "1mo" => Ok(Timeframe::Mo1),
            other => Err(ParseTimeframeError(other.to_string())),
        }
    }
}

/// Local extremum found by the pivot scanner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    Demand,
    Supply,
}

impl ZoneType {
    pub fn title(&self) -> &'static str {
        match self {
            ZoneType::Demand => "Demand",
            ZoneType::Supply => "Supply",
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneType::Demand => f.write_str("demand"),
            ZoneType::Supply => f.write_str("supply"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStrength {
    Weak,
    Medium,
    Strong,
}

impl ZoneStrength {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            ZoneStrength::Strong
        } else if score >= 45.0 {
            ZoneStrength::Medium
        } else {
            ZoneStrength::Weak
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ZoneStrength::Weak => "Weak",
            ZoneStrength::Medium => "Medium",
            ZoneStrength::Strong => "Strong",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneQuality {
    Medium,
    High,
}

impl ZoneQuality {
    pub fn title(&self) -> &'static str {
        match self {
            ZoneQuality::Medium => "Medium",
            ZoneQuality::High => "High",
        }
    }
}

/// Demand or supply region detected in a single analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    pub level: f64,
    pub touches: usize,
    pub latest_touch_index: usize,
    pub pivot_indices: Vec<usize>,
    strength: ZoneStrength,
    strength_score: f64,
    pub reaction_strength: f64,
    pub is_fresh: bool,
    pub zone_quality: ZoneQuality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htf_confluence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_htf_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
    pub is_htf: bool,
}

impl Zone {
    /// Zone formed at an unrevisited pivot.
    pub fn fresh(zone_type: ZoneType, level: f64, index: usize, reaction_strength: f64) -> Self {
        let zone_quality = if reaction_strength >= 5.0 {
            ZoneQuality::High
        } else {
            ZoneQuality::Medium
        };
        Self::build(zone_type, level, index, 1, reaction_strength, true, zone_quality)
    }

    /// Zone at a level that price came back to `retests` times.
    pub fn tested(
        zone_type: ZoneType,
        level: f64,
        index: usize,
        retests: usize,
        reaction_strength: f64,
    ) -> Self {
        let zone_quality = if reaction_strength >= 6.0 {
            ZoneQuality::High
        } else {
            ZoneQuality::Medium
        };
        Self::build(
            zone_type,
            level,
            index,
            retests + 1,
            reaction_strength,
            false,
            zone_quality,
        )
    }

    fn build(
        zone_type: ZoneType,
        level: f64,
        index: usize,
        touches: usize,
        reaction_strength: f64,
        is_fresh: bool,
        zone_quality: ZoneQuality,
    ) -> Self {
        Self {
            zone_type,
            level,
            touches,
            latest_touch_index: index,
            pivot_indices: vec![index],
            strength: ZoneStrength::from_score(0.0),
            strength_score: 0.0,
            reaction_strength,
            is_fresh,
            zone_quality,
            htf_confluence: None,
            has_htf_support: None,
            timeframe: None,
            is_htf: false,
        }
    }

    pub fn strength(&self) -> ZoneStrength {
        self.strength
    }

    pub fn strength_score(&self) -> f64 {
        self.strength_score
    }

    /// The strength class always follows the score.
    pub(crate) fn set_strength_score(&mut self, score: f64) {
        self.strength_score = score;
        self.strength = ZoneStrength::from_score(score);
    }

    pub fn is_high_quality(&self) -> bool {
        self.zone_quality == ZoneQuality::High
    }

    /// Percentage distance between the zone level and `price`, relative to price.
    pub fn distance_pct(&self, price: f64) -> f64 {
        (self.level - price).abs() / price * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeSignal {
    Buy,
    Sell,
    Watch,
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSignal::Buy => f.write_str("BUY"),
            TradeSignal::Sell => f.write_str("SELL"),
            TradeSignal::Watch => f.write_str("WATCH"),
        }
    }
}

/// The breakout pattern that matched, with its pattern-specific details.
///
/// Serializes as a map with `type`, the human-readable `pattern` label and
/// any variant fields, so it flattens into [`BreakoutEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum BreakoutPattern {
    ResistanceBreakout,
    SupportBreakdown,
    MaBreakoutBullish,
    VolumeBreakout { volume_increase: f64 },
    AthBreakout { ath_distance: f64, attempts: usize },
}

impl BreakoutPattern {
    pub fn type_name(&self) -> &'static str {
        match self {
            BreakoutPattern::ResistanceBreakout => "resistance_breakout",
            BreakoutPattern::SupportBreakdown => "support_breakdown",
            BreakoutPattern::MaBreakoutBullish => "ma_breakout_bullish",
            BreakoutPattern::VolumeBreakout { .. } => "volume_breakout",
            BreakoutPattern::AthBreakout { .. } => "ath_breakout",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BreakoutPattern::ResistanceBreakout => "Resistance Breakout",
            BreakoutPattern::SupportBreakdown => "Support Breakdown",
            BreakoutPattern::MaBreakoutBullish => "Moving Average Breakout",
            BreakoutPattern::VolumeBreakout { .. } => "Volume Breakout",
            BreakoutPattern::AthBreakout { .. } => "ATH Breakout Attempt",
        }
    }

    /// Reliability points the pattern contributes to confirmation.
    pub fn reliability_bonus(&self) -> u32 {
        match self {
            BreakoutPattern::AthBreakout { .. } => 30,
            BreakoutPattern::ResistanceBreakout => 25,
            BreakoutPattern::SupportBreakdown => 20,
            BreakoutPattern::MaBreakoutBullish => 15,
            BreakoutPattern::VolumeBreakout { .. } => 10,
        }
    }

    pub fn signal(&self) -> TradeSignal {
        match self {
            BreakoutPattern::ResistanceBreakout
            | BreakoutPattern::MaBreakoutBullish
            | BreakoutPattern::AthBreakout { .. } => TradeSignal::Buy,
            BreakoutPattern::SupportBreakdown => TradeSignal::Sell,
            BreakoutPattern::VolumeBreakout { .. } => TradeSignal::Watch,
        }
    }
}

impl Serialize for BreakoutPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.type_name())?;
        map.serialize_entry("pattern", self.label())?;
        match self {
            BreakoutPattern::VolumeBreakout { volume_increase } => {
                map.serialize_entry("volume_increase", volume_increase)?;
            }
            BreakoutPattern::AthBreakout {
                ath_distance,
                attempts,
            } => {
                map.serialize_entry("ath_distance", ath_distance)?;
                map.serialize_entry("attempts", attempts)?;
            }
            _ => {}
        }
        map.end()
    }
}

/// The single breakout reported for a series, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakoutEvent {
    #[serde(flatten)]
    pub pattern: BreakoutPattern,
    pub level: f64,
    pub current_price: f64,
    pub breakout_strength: f64,
    pub confirmation_strength: u32,
    pub price_change_pct: f64,
    pub volume_ratio: f64,
    pub timeframe: Timeframe,
}

impl BreakoutEvent {
    pub fn summary(&self) -> String {
        let strength = self.breakout_strength;
        let strength_label = if strength >= 5.0 {
            "Strong"
        } else if strength >= 3.0 {
            "Moderate"
        } else {
            "Weak"
        };
        let confidence_label = if self.confirmation_strength >= 70 {
            "High"
        } else if self.confirmation_strength >= 40 {
            "Medium"
        } else {
            "Low"
        };
        format!(
            "{} - {} ({:.1}%) - {} Confidence",
            self.pattern.label(),
            strength_label,
            strength,
            confidence_label
        )
    }
}
