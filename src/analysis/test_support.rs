use chrono::{Duration, TimeZone};

use crate::data::{Candle, CandleSeries};

pub fn candle_at(index: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    let start = chrono_tz::UTC
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .unwrap();
    Candle {
        timestamp: start + Duration::days(index as i64),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Candles with open/close placed inside each high/low range.
pub fn candles_from_highs_lows(highs: &[f64], lows: &[f64]) -> Vec<Candle> {
    highs
        .iter()
        .zip(lows.iter())
        .enumerate()
        .map(|(idx, (&high, &low))| {
            let mid = (high + low) / 2.0;
            candle_at(idx, mid, high, low, mid, 1_000.0)
        })
        .collect()
}

/// Decline into a sharp low at index 30, then a flat shelf above it.
/// Yields a single fresh demand zone at 100 on the daily timeframe.
pub fn valley_candles() -> Vec<Candle> {
    (0..60)
        .map(|idx| {
            if idx < 30 {
                let low = 100.0 * 1.05_f64.powi(30 - idx as i32);
                candle_at(idx, low * 1.008, low * 1.01, low, low * 1.002, 1_000.0)
            } else if idx == 30 {
                candle_at(idx, 102.0, 103.0, 100.0, 102.5, 1_000.0)
            } else {
                let high = if idx == 33 { 108.0 } else { 106.0 };
                candle_at(idx, 104.5, high, 104.0, 105.5, 1_000.0)
            }
        })
        .collect()
}

pub fn series(candles: Vec<Candle>) -> CandleSeries {
    CandleSeries::new(candles).unwrap()
}

/// Candles whose close follows `closes`, with a 0.5% band around each close.
pub fn candles_from_closes(closes: &[f64], volumes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .zip(volumes.iter())
        .enumerate()
        .map(|(idx, (&close, &volume))| {
            let open = if idx == 0 { close } else { closes[idx - 1] };
            let high = open.max(close) * 1.005;
            let low = open.min(close) * 0.995;
            candle_at(idx, open, high, low, close, volume)
        })
        .collect()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
