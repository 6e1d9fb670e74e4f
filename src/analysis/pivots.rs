use crate::data::{Candle, Pivot, Timeframe};

/// Pivot half-window for a timeframe, scaled by how much history is available.
pub fn adaptive_window(timeframe: Timeframe, series_len: usize) -> usize {
    let base = timeframe.base_pivot_window();
    if series_len < 30 {
        base.saturating_sub(1).max(1)
    } else if series_len < 100 {
        base
    } else {
        (base + 1).min(6)
    }
}

/// Candles whose high is strictly above every other high within `window` on both sides.
pub fn find_pivot_highs(candles: &[Candle], window: usize) -> Vec<Pivot> {
    find_pivots(candles, window, |c| c.high, |candidate, other| other < candidate)
}

/// Candles whose low is strictly below every other low within `window` on both sides.
pub fn find_pivot_lows(candles: &[Candle], window: usize) -> Vec<Pivot> {
    find_pivots(candles, window, |c| c.low, |candidate, other| other > candidate)
}

fn find_pivots<P, D>(candles: &[Candle], window: usize, price: P, dominates: D) -> Vec<Pivot>
where
    P: Fn(&Candle) -> f64,
    D: Fn(f64, f64) -> bool,
{
    if candles.len() <= 2 * window {
        return Vec::new();
    }

    (window..candles.len() - window)
        .filter_map(|idx| {
            let current = price(&candles[idx]);
            let is_pivot = candles[idx - window..=idx + window]
                .iter()
                .enumerate()
                .filter(|(offset, _)| *offset != window)
                .all(|(_, other)| dominates(current, price(other)));
            is_pivot.then_some(Pivot {
                index: idx,
                price: current,
            })
        })
        .collect()
}
