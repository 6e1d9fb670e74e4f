use tracing::debug;

use crate::analysis::rolling::{rolling_max, rolling_mean, rolling_min};
use crate::data::{BreakoutEvent, BreakoutPattern, Candle, CandleSeries, Timeframe};

pub const MIN_CANDLES: usize = 20;

const LOOKBACK: usize = 20;
const SLOW_MA: usize = 50;
const MIN_PRICE_MOVE: f64 = 2.0;
const MIN_MA_MOVE: f64 = 1.0;
const MIN_VOLUME_INCREASE: f64 = 1.5;
const MIN_VOLUME_MOVE: f64 = 3.0;
const ATH_THRESHOLD: f64 = 0.95;
const ATH_ATTEMPT_WINDOW: usize = 10;
const ATH_ATTEMPT_PCT: f64 = 2.0;
const ATH_MIN_ATTEMPTS: usize = 2;
const ATH_VOLUME_INCREASE: f64 = 1.3;
const ATH_CLOSE_RATIO: f64 = 0.98;

/// Rolling aggregates and current values shared by every pattern rule.
struct BreakoutContext<'a> {
    candles: &'a [Candle],
    current: &'a Candle,
    previous: &'a Candle,
    sma_fast: Vec<Option<f64>>,
    sma_slow: Vec<Option<f64>>,
    high_band: Vec<Option<f64>>,
    low_band: Vec<Option<f64>>,
    avg_volume: f64,
    volume_ratio: f64,
}

impl<'a> BreakoutContext<'a> {
    fn new(candles: &'a [Candle]) -> Option<Self> {
        let (current, rest) = candles.split_last()?;
        let previous = rest.last()?;

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let avg_volume = rolling_mean(&volumes, LOOKBACK).last().copied().flatten()?;
        let volume_ratio = if avg_volume > 0.0 {
            current.volume / avg_volume
        } else {
            1.0
        };

        Some(Self {
            candles,
            current,
            previous,
            sma_fast: rolling_mean(&closes, LOOKBACK),
            sma_slow: rolling_mean(&closes, SLOW_MA),
            high_band: rolling_max(&highs, LOOKBACK),
            low_band: rolling_min(&lows, LOOKBACK),
            avg_volume,
            volume_ratio,
        })
    }

    fn last(&self) -> usize {
        self.candles.len() - 1
    }

    /// Value of a rolling series at the candle before the current one.
    fn at_previous(series: &[Option<f64>]) -> Option<f64> {
        series.len().checked_sub(2).and_then(|idx| series[idx])
    }

    fn price_change_pct(&self) -> f64 {
        (self.current.close - self.previous.close) / self.previous.close * 100.0
    }
}

struct PatternMatch {
    pattern: BreakoutPattern,
    level: f64,
    breakout_strength: f64,
}

type PatternRule = fn(&BreakoutContext) -> Option<PatternMatch>;

/// Evaluated in order; the first rule that matches wins.
const PATTERN_RULES: [PatternRule; 5] = [
    resistance_breakout,
    support_breakdown,
    ma_breakout_bullish,
    volume_breakout,
    ath_breakout,
];

/// Scan the latest candle of `series` for a breakout.
///
/// Returns `None` when fewer than [`MIN_CANDLES`] candles are available or
/// when no pattern matches.
pub fn detect_breakout(series: &CandleSeries, timeframe: Timeframe) -> Option<BreakoutEvent> {
    if series.len() < MIN_CANDLES {
        debug!(len = series.len(), "series too short for breakout detection");
        return None;
    }

    let ctx = BreakoutContext::new(series.candles())?;
    let found = PATTERN_RULES.iter().find_map(|rule| rule(&ctx))?;
    let confirmation =
        confirmation_strength(ctx.volume_ratio, found.breakout_strength, &found.pattern);

    debug!(
        pattern = found.pattern.type_name(),
        level = found.level,
        strength = found.breakout_strength,
        confirmation,
        "breakout detected"
    );

    Some(BreakoutEvent {
        pattern: found.pattern,
        level: found.level,
        current_price: ctx.current.close,
        breakout_strength: found.breakout_strength,
        confirmation_strength: confirmation,
        price_change_pct: ctx.price_change_pct(),
        volume_ratio: ctx.volume_ratio,
        timeframe,
    })
}

/// Additive 0-100 confidence from volume, move size and pattern reliability.
pub fn confirmation_strength(volume_ratio: f64, breakout_strength: f64, pattern: &BreakoutPattern) -> u32 {
    let volume_points = if volume_ratio >= 2.0 {
        40
    } else if volume_ratio >= 1.5 {
        25
    } else if volume_ratio >= 1.2 {
        15
    } else {
        0
    };

    let move_points = if breakout_strength >= 5.0 {
        30
    } else if breakout_strength >= 3.0 {
        20
    } else if breakout_strength >= 2.0 {
        10
    } else {
        0
    };

    (volume_points + move_points + pattern.reliability_bonus()).min(100)
}

fn resistance_breakout(ctx: &BreakoutContext) -> Option<PatternMatch> {
    let level = BreakoutContext::at_previous(&ctx.high_band)?;
    if ctx.current.high <= level {
        return None;
    }
    let price_move = (ctx.current.close - level) / level * 100.0;
    (price_move >= MIN_PRICE_MOVE).then_some(PatternMatch {
        pattern: BreakoutPattern::ResistanceBreakout,
        level,
        breakout_strength: price_move,
    })
}

fn support_breakdown(ctx: &BreakoutContext) -> Option<PatternMatch> {
    let level = BreakoutContext::at_previous(&ctx.low_band)?;
    if ctx.current.close >= level {
        return None;
    }
    let price_move = (level - ctx.current.close) / level * 100.0;
    (price_move >= MIN_PRICE_MOVE).then_some(PatternMatch {
        pattern: BreakoutPattern::SupportBreakdown,
        level,
        breakout_strength: price_move,
    })
}

/// Fresh close above the 20 SMA while the 20 SMA is above the 50 SMA.
fn ma_breakout_bullish(ctx: &BreakoutContext) -> Option<PatternMatch> {
    if ctx.candles.len() < SLOW_MA {
        return None;
    }
    let last = ctx.last();
    let sma_fast = ctx.sma_fast[last]?;
    let sma_slow = ctx.sma_slow[last]?;
    let prev_sma_fast = BreakoutContext::at_previous(&ctx.sma_fast)?;
    let close = ctx.current.close;

    let trending = close > sma_fast && sma_fast > sma_slow;
    let crossed = ctx.previous.close <= prev_sma_fast;
    if !(trending && crossed) {
        return None;
    }
    let price_move = (close - sma_fast) / sma_fast * 100.0;
    (price_move >= MIN_MA_MOVE).then_some(PatternMatch {
        pattern: BreakoutPattern::MaBreakoutBullish,
        level: sma_fast,
        breakout_strength: price_move,
    })
}

fn volume_breakout(ctx: &BreakoutContext) -> Option<PatternMatch> {
    if ctx.current.volume <= ctx.avg_volume * MIN_VOLUME_INCREASE {
        return None;
    }
    let change = ctx.price_change_pct();
    (change.abs() >= MIN_VOLUME_MOVE).then_some(PatternMatch {
        pattern: BreakoutPattern::VolumeBreakout {
            volume_increase: ctx.volume_ratio,
        },
        level: ctx.previous.close,
        breakout_strength: change.abs(),
    })
}

/// Repeated tests of the all-time high with rising volume.
fn ath_breakout(ctx: &BreakoutContext) -> Option<PatternMatch> {
    let ath = ctx.candles.iter().fold(f64::MIN, |acc, c| acc.max(c.high));
    let close = ctx.current.close;
    let ath_distance = (ath - close) / ath * 100.0;
    if ath_distance > 100.0 - ATH_THRESHOLD * 100.0 {
        return None;
    }

    let recent_start = ctx.candles.len().saturating_sub(ATH_ATTEMPT_WINDOW);
    let attempts = ctx.candles[recent_start..]
        .iter()
        .filter(|c| (ath - c.high) / ath * 100.0 <= ATH_ATTEMPT_PCT)
        .count();

    let volume_confirmed = ctx.current.volume > ctx.avg_volume * ATH_VOLUME_INCREASE;
    if attempts < ATH_MIN_ATTEMPTS || !volume_confirmed || close <= ath * ATH_CLOSE_RATIO {
        return None;
    }

    let base = ath * ATH_THRESHOLD;
    let price_move = (close - base) / base * 100.0;
    Some(PatternMatch {
        pattern: BreakoutPattern::AthBreakout {
            ath_distance,
            attempts,
        },
        level: ath,
        breakout_strength: price_move.max(MIN_PRICE_MOVE),
    })
}
