use tracing::debug;

use crate::analysis::pivots::{adaptive_window, find_pivot_highs, find_pivot_lows};
use crate::analysis::scoring::{apply_htf_confluence, score_zones};
use crate::data::{Candle, CandleSeries, Pivot, Timeframe, Zone, ZoneType};

pub const MAX_ZONES: usize = 12;

const FRESH_TOLERANCE: f64 = 0.01;
const FRESH_MIN_REACTION: f64 = 3.0;
const TESTED_MIN_REACTION: f64 = 4.0;
const TESTED_TOLERANCE: f64 = 0.02;
const TESTED_EDGE: usize = 10;
const TESTED_LOOKAHEAD: usize = 20;
const REACTION_HORIZON: usize = 10;
const REACTION_MIN_TAIL: usize = 5;

/// Detect, rank and score demand/supply zones for one series.
///
/// `htf_zones` are zones already detected on coarser timeframes; when
/// non-empty they feed the confluence part of the score and the
/// `htf_confluence`/`has_htf_support` fields.
pub fn detect_zones(series: &CandleSeries, timeframe: Timeframe, htf_zones: &[Zone]) -> Vec<Zone> {
    let candles = series.candles();
    let window = adaptive_window(timeframe, candles.len());
    if candles.len() < 2 * window + 1 {
        debug!(len = candles.len(), window, "series too short for zone detection");
        return Vec::new();
    }

    let pivot_highs = find_pivot_highs(candles, window);
    let pivot_lows = find_pivot_lows(candles, window);

    let mut zones = fresh_zones(candles, &pivot_highs, ZoneType::Supply);
    zones.extend(fresh_zones(candles, &pivot_lows, ZoneType::Demand));
    let fresh_count = zones.len();
    zones.extend(tested_zones(candles));

    debug!(
        %timeframe,
        window,
        pivot_highs = pivot_highs.len(),
        pivot_lows = pivot_lows.len(),
        fresh = fresh_count,
        tested = zones.len() - fresh_count,
        "collected zone candidates"
    );

    let mut zones = rank_zones(zones);
    score_zones(&mut zones, candles, htf_zones);
    if !htf_zones.is_empty() {
        apply_htf_confluence(&mut zones, htf_zones);
    }
    zones
}

/// One zone per pivot that was never revisited and produced a sufficient move away.
fn fresh_zones(candles: &[Candle], pivots: &[Pivot], zone_type: ZoneType) -> Vec<Zone> {
    pivots
        .iter()
        .filter(|pivot| is_fresh(candles, pivot.index, pivot.price, zone_type))
        .filter_map(|pivot| {
            let reaction = reaction_strength(candles, pivot.index, zone_type);
            (reaction >= FRESH_MIN_REACTION)
                .then(|| Zone::fresh(zone_type, pivot.price, pivot.index, reaction))
        })
        .collect()
}

/// Levels retested once or twice shortly after forming that still produced a strong move.
fn tested_zones(candles: &[Candle]) -> Vec<Zone> {
    let mut zones = Vec::new();
    let len = candles.len();

    for idx in TESTED_EDGE..len.saturating_sub(TESTED_EDGE) {
        let horizon = &candles[idx + 1..(idx + TESTED_LOOKAHEAD).min(len)];

        let low = candles[idx].low;
        let retests = horizon
            .iter()
            .filter(|c| (c.low - low).abs() / low <= TESTED_TOLERANCE)
            .count();
        if (1..=2).contains(&retests) {
            let reaction = reaction_strength(candles, idx, ZoneType::Demand);
            if reaction >= TESTED_MIN_REACTION {
                zones.push(Zone::tested(ZoneType::Demand, low, idx, retests, reaction));
            }
        }

        let high = candles[idx].high;
        let retests = horizon
            .iter()
            .filter(|c| (c.high - high).abs() / high <= TESTED_TOLERANCE)
            .count();
        if (1..=2).contains(&retests) {
            let reaction = reaction_strength(candles, idx, ZoneType::Supply);
            if reaction >= TESTED_MIN_REACTION {
                zones.push(Zone::tested(ZoneType::Supply, high, idx, retests, reaction));
            }
        }
    }

    zones
}

/// True when no later candle came back within 1% of `price`.
pub fn is_fresh(candles: &[Candle], index: usize, price: f64, zone_type: ZoneType) -> bool {
    let later = candles.get(index + 1..).unwrap_or_default();
    match zone_type {
        ZoneType::Demand => !later.iter().any(|c| c.low <= price * (1.0 + FRESH_TOLERANCE)),
        ZoneType::Supply => !later.iter().any(|c| c.high >= price * (1.0 - FRESH_TOLERANCE)),
    }
}

/// Percentage move away from the candle at `index` over the following candles.
///
/// Demand zones measure the rally from the candle's low, supply zones the
/// drop from its high. Candles too close to the end of the series report 0.
pub fn reaction_strength(candles: &[Candle], index: usize, zone_type: ZoneType) -> f64 {
    if index + REACTION_MIN_TAIL >= candles.len() {
        return 0.0;
    }

    let horizon = (candles.len() - index - 1).min(REACTION_HORIZON);
    let after = &candles[index + 1..=index + horizon];
    let reaction = match zone_type {
        ZoneType::Demand => {
            let level = candles[index].low;
            let max_high = after.iter().fold(f64::MIN, |acc, c| acc.max(c.high));
            (max_high - level) / level * 100.0
        }
        ZoneType::Supply => {
            let level = candles[index].high;
            let min_low = after.iter().fold(f64::MAX, |acc, c| acc.min(c.low));
            (level - min_low) / level * 100.0
        }
    };
    reaction.max(0.0)
}

/// Keep the best `MAX_ZONES` zones: high quality first, then larger reactions,
/// then fresh zones, then earlier formation. Ties keep detection order.
pub fn rank_zones(mut zones: Vec<Zone>) -> Vec<Zone> {
    zones.sort_by(|a, b| {
        b.is_high_quality()
            .cmp(&a.is_high_quality())
            .then_with(|| b.reaction_strength.total_cmp(&a.reaction_strength))
            .then_with(|| b.is_fresh.cmp(&a.is_fresh))
            .then_with(|| a.latest_touch_index.cmp(&b.latest_touch_index))
    });
    zones.truncate(MAX_ZONES);
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{
        assert_close, candles_from_highs_lows, series, valley_candles,
    };
    use crate::data::{ZoneQuality, ZoneStrength};

    fn valley_series() -> CandleSeries {
        series(valley_candles())
    }

    #[test]
    fn test_single_fresh_demand_zone_in_valley() {
        let zones = detect_zones(&valley_series(), Timeframe::D1, &[]);
        let demand: Vec<&Zone> = zones
            .iter()
            .filter(|z| z.zone_type == ZoneType::Demand)
            .collect();

        assert_eq!(demand.len(), 1);
        let zone = demand[0];
        assert_eq!(zone.level, 100.0);
        assert_close(zone.reaction_strength, 8.0);
        assert!(zone.is_fresh);
        assert_eq!(zone.zone_quality, ZoneQuality::High);
        assert_eq!(zone.touches, 1);
        assert_eq!(zone.pivot_indices, vec![30]);
        assert_eq!(zone.strength(), ZoneStrength::Strong);
    }

    #[test]
    fn test_reaction_strength_measures_next_ten() {
        let mut highs = vec![10.0; 20];
        let mut lows = vec![9.0; 20];
        lows[5] = 8.0;
        highs[16] = 20.0;
        let candles = candles_from_highs_lows(&highs, &lows);

        assert_close(reaction_strength(&candles, 5, ZoneType::Demand), 25.0);
        assert_close(reaction_strength(&candles, 6, ZoneType::Demand), (20.0 - 9.0) / 9.0 * 100.0);
        assert_close(reaction_strength(&candles, 15, ZoneType::Demand), 0.0);
        assert_close(reaction_strength(&candles, 3, ZoneType::Supply), 20.0);
    }

    #[test]
    fn test_freshness_uses_one_percent_band() {
        let highs = [12.0, 11.0, 11.5, 11.2];
        let lows = [10.0, 10.2, 10.5, 10.09];
        let candles = candles_from_highs_lows(&highs, &lows);
        assert!(!is_fresh(&candles, 0, 10.0, ZoneType::Demand));
        assert!(is_fresh(&candles, 1, 9.0, ZoneType::Demand));
        assert!(is_fresh(&candles, 0, 12.0, ZoneType::Supply));
        assert!(!is_fresh(&candles, 1, 11.6, ZoneType::Supply));
        assert!(is_fresh(&candles, 3, 1.0, ZoneType::Supply));
    }

    #[test]
    fn test_tested_zone_counts_retests() {
        // Low at 20 retested twice within the lookahead; everything else sits far above.
        let mut lows: Vec<f64> = (0..40).map(|i| 200.0 + i as f64 * 5.0).collect();
        lows[20] = 100.0;
        lows[23] = 99.0;
        lows[25] = 101.0;
        let highs: Vec<f64> = lows.iter().map(|l| l + 10.0).collect();
        let candles = candles_from_highs_lows(&highs, &lows);

        let zones = tested_zones(&candles);
        let zone = zones
            .iter()
            .find(|z| z.zone_type == ZoneType::Demand && z.latest_touch_index == 20)
            .expect("tested demand zone at index 20");
        assert_eq!(zone.touches, 3);
        assert!(!zone.is_fresh);
    }

    /// Rising lows with the given overrides; highs sit 10 above each low.
    fn rising_candles(overrides: &[(usize, f64)]) -> Vec<Candle> {
        let mut lows: Vec<f64> = (0..60).map(|i| 200.0 + i as f64 * 5.0).collect();
        for &(idx, low) in overrides {
            lows[idx] = low;
        }
        let highs: Vec<f64> = lows.iter().map(|l| l + 10.0).collect();
        candles_from_highs_lows(&highs, &lows)
    }

    fn tested_demand_at(candles: &[Candle], index: usize) -> Option<Zone> {
        tested_zones(candles)
            .into_iter()
            .find(|z| z.zone_type == ZoneType::Demand && z.latest_touch_index == index)
    }

    #[test]
    fn test_tested_lookahead_ends_nineteen_candles_out() {
        let candles = rising_candles(&[(20, 100.0), (39, 100.5)]);
        let zone = tested_demand_at(&candles, 20).expect("retest 19 candles later counts");
        assert_eq!(zone.touches, 2);

        let candles = rising_candles(&[(20, 100.0), (40, 100.5)]);
        assert!(tested_demand_at(&candles, 20).is_none());
    }

    #[test]
    fn test_tested_scan_skips_first_and_last_ten() {
        let candles = rising_candles(&[(10, 100.0), (12, 100.5)]);
        assert!(tested_demand_at(&candles, 10).is_some());
        let candles = rising_candles(&[(9, 100.0), (11, 100.5)]);
        assert!(tested_demand_at(&candles, 9).is_none());

        let candles = rising_candles(&[(49, 100.0), (51, 100.5)]);
        assert!(tested_demand_at(&candles, 49).is_some());
        let candles = rising_candles(&[(50, 100.0), (52, 100.5)]);
        assert!(tested_demand_at(&candles, 50).is_none());
    }

    #[test]
    fn test_rank_prefers_quality_then_reaction_then_earlier() {
        let zones = vec![
            Zone::fresh(ZoneType::Demand, 10.0, 40, 4.0),
            Zone::tested(ZoneType::Supply, 11.0, 30, 1, 7.0),
            Zone::fresh(ZoneType::Supply, 12.0, 20, 7.0),
            Zone::fresh(ZoneType::Supply, 12.0, 10, 7.0),
            Zone::fresh(ZoneType::Demand, 9.0, 5, 9.0),
        ];
        let ranked = rank_zones(zones);
        let order: Vec<usize> = ranked.iter().map(|z| z.latest_touch_index).collect();
        assert_eq!(order, vec![5, 10, 20, 30, 40]);
    }

    #[test]
    fn test_rank_truncates_to_twelve() {
        let zones = (0..20)
            .map(|i| Zone::fresh(ZoneType::Demand, 100.0, i, 3.0 + i as f64 * 0.1))
            .collect();
        let ranked = rank_zones(zones);
        assert_eq!(ranked.len(), MAX_ZONES);
        assert_eq!(ranked[0].latest_touch_index, 19);
    }

    #[test]
    fn test_short_and_empty_series_yield_nothing() {
        assert!(detect_zones(&CandleSeries::default(), Timeframe::D1, &[]).is_empty());
        let candles = candles_from_highs_lows(&[10.0, 11.0, 12.0], &[9.0, 10.0, 11.0]);
        assert!(detect_zones(&series(candles), Timeframe::D1, &[]).is_empty());
    }

    #[test]
    fn test_detection_is_idempotent() {
        let series = valley_series();
        let first = detect_zones(&series, Timeframe::D1, &[]);
        let second = detect_zones(&series, Timeframe::D1, &[]);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_fresh_zones_stay_unvisited() {
        let series = valley_series();
        let candles = series.candles();
        for zone in detect_zones(&series, Timeframe::D1, &[]).iter().filter(|z| z.is_fresh) {
            let later = &candles[zone.latest_touch_index + 1..];
            match zone.zone_type {
                ZoneType::Demand => assert!(later.iter().all(|c| c.low > zone.level * 1.01)),
                ZoneType::Supply => assert!(later.iter().all(|c| c.high < zone.level * 0.99)),
            }
        }
    }
}
