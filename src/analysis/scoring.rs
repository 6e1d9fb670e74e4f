use statrs::statistics::Statistics;

use crate::data::{Candle, Zone};

const HTF_TOLERANCE: f64 = 0.02;
const HTF_OPPOSITE_WEIGHT: f64 = 0.3;

/// Volume at the zone's candles relative to the series mean, scaled to 0-25.
pub fn volume_score(zone: &Zone, candles: &[Candle]) -> f64 {
    let pivot_volumes: Vec<f64> = zone
        .pivot_indices
        .iter()
        .filter_map(|&idx| candles.get(idx).map(|c| c.volume))
        .collect();
    if pivot_volumes.is_empty() {
        return 0.0;
    }

    let avg_pivot_volume = pivot_volumes.iter().mean();
    let avg_total_volume = candles.iter().map(|c| c.volume).mean();
    if avg_total_volume > 0.0 {
        (avg_pivot_volume / avg_total_volume * 25.0).min(25.0)
    } else {
        0.0
    }
}

/// Agreement of a zone with higher-timeframe zones within 2% of its level, capped at 1.
pub fn htf_confluence(zone: &Zone, htf_zones: &[Zone]) -> f64 {
    let score: f64 = htf_zones
        .iter()
        .filter(|htf| (zone.level - htf.level).abs() / zone.level <= HTF_TOLERANCE)
        .map(|htf| {
            if htf.zone_type == zone.zone_type {
                1.0
            } else {
                HTF_OPPOSITE_WEIGHT
            }
        })
        .sum();
    score.min(1.0)
}

/// Combined score: reaction (max 40), freshness (20), quality (15),
/// confluence (max 10) and volume (max 15).
pub fn strength_score(zone: &Zone, confluence: f64, volume_score: f64) -> f64 {
    let mut score = (zone.reaction_strength * 5.0).min(40.0);
    if zone.is_fresh {
        score += 20.0;
    }
    if zone.is_high_quality() {
        score += 15.0;
    }
    score += confluence * 10.0;
    score += volume_score.min(15.0);
    score
}

pub fn score_zones(zones: &mut [Zone], candles: &[Candle], htf_zones: &[Zone]) {
    for zone in zones.iter_mut() {
        let confluence = if htf_zones.is_empty() {
            0.0
        } else {
            htf_confluence(zone, htf_zones)
        };
        let volume = volume_score(zone, candles);
        let score = strength_score(zone, confluence, volume);
        zone.set_strength_score(score);
    }
}

pub fn apply_htf_confluence(zones: &mut [Zone], htf_zones: &[Zone]) {
    for zone in zones.iter_mut() {
        let confluence = htf_confluence(zone, htf_zones);
        zone.htf_confluence = Some(confluence);
        zone.has_htf_support = Some(confluence > 0.0);
    }
}
