use itertools::Itertools;
use tabled::{settings::Style, Table, Tabled};

use zone_scout::data::{BreakoutEvent, BreakoutPattern, Zone};
use zone_scout::notify::ProximityAlert;
use zone_scout::scanner::{BreakoutScanResult, ZoneScanResult};

#[derive(Tabled)]
struct ZoneRow {
    #[tabled(rename = "Type")]
    kind: &'static str,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "Strength")]
    strength: String,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Quality")]
    quality: &'static str,
    #[tabled(rename = "Reaction")]
    reaction: String,
    #[tabled(rename = "Touches")]
    touches: usize,
    #[tabled(rename = "HTF")]
    htf: String,
}

#[derive(Tabled)]
struct BreakoutRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Pattern")]
    pattern: &'static str,
    #[tabled(rename = "Signal")]
    signal: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Volume")]
    volume: String,
    #[tabled(rename = "Strength")]
    strength: String,
    #[tabled(rename = "Confidence")]
    confidence: u32,
}

#[derive(Tabled)]
struct ZoneScanRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Zones")]
    zones: usize,
    #[tabled(rename = "Best Score")]
    best_score: String,
    #[tabled(rename = "Nearest")]
    nearest: String,
}

pub fn print_zones(symbol: &str, zones: &[Zone], current_price: f64) {
    println!("\n=== Demand/Supply Zones: {symbol} ===\n");
    println!("Current Price: {current_price:.2}");

    if zones.is_empty() {
        println!("No zones found.");
        return;
    }

    let rows: Vec<ZoneRow> = zones
        .iter()
        .map(|zone| ZoneRow {
            kind: zone.zone_type.title(),
            level: format!("{:.2}", zone.level),
            distance: format!("{:.2}%", zone.distance_pct(current_price)),
            strength: format!("{} ({:.0})", zone.strength().title(), zone.strength_score()),
            status: if zone.is_fresh { "Fresh" } else { "Tested" },
            quality: zone.zone_quality.title(),
            reaction: format!("{:.2}%", zone.reaction_strength),
            touches: zone.touches,
            htf: match (zone.has_htf_support, zone.htf_confluence) {
                (Some(true), Some(confluence)) => format!("{confluence:.1}"),
                (Some(false), _) => "none".to_string(),
                _ => "-".to_string(),
            },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("\n{table}\n");
}

pub fn print_breakout(symbol: &str, event: Option<&BreakoutEvent>) {
    println!("\n=== Breakout Check: {symbol} ===\n");
    let Some(event) = event else {
        println!("No breakout detected.");
        return;
    };

    println!("{}", event.summary());
    match &event.pattern {
        BreakoutPattern::VolumeBreakout { volume_increase } => {
            println!("Volume Increase: {volume_increase:.2}x");
        }
        BreakoutPattern::AthBreakout {
            ath_distance,
            attempts,
        } => {
            println!("ATH Distance: {ath_distance:.2}% | Attempts: {attempts}");
        }
        _ => {}
    }

    let mut table = Table::new([breakout_row(symbol, event)]);
    table.with(Style::rounded());
    println!("\n{table}\n");
}

pub fn print_breakout_scan(results: &[BreakoutScanResult]) {
    println!("\n=== Breakout Scan ===\n");
    if results.is_empty() {
        println!("No breakouts with sufficient confirmation.");
        return;
    }

    let rows = results
        .iter()
        .map(|result| breakout_row(&result.symbol, &result.event));
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("\n{table}\n");
}

pub fn print_zone_scan(results: &[ZoneScanResult]) {
    println!("\n=== Zone Scan ===\n");
    if results.is_empty() {
        println!("No zones found for any symbol.");
        return;
    }

    let rows = results.iter().map(|result| {
        let nearest = result
            .zones
            .iter()
            .min_by(|a, b| {
                a.distance_pct(result.current_price)
                    .total_cmp(&b.distance_pct(result.current_price))
            })
            .map(|zone| {
                format!(
                    "{} {:.2} ({:.2}%)",
                    zone.zone_type.title(),
                    zone.level,
                    zone.distance_pct(result.current_price)
                )
            })
            .unwrap_or_else(|| "-".to_string());
        ZoneScanRow {
            symbol: result.symbol.clone(),
            price: format!("{:.2}", result.current_price),
            zones: result.zones.len(),
            best_score: format!("{:.0}", result.best_score()),
            nearest,
        }
    });
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("\n{table}\n");
}

pub fn print_alerts(alerts: &[ProximityAlert]) {
    if alerts.is_empty() {
        println!("No zones within alert distance.");
        return;
    }
    let lines = alerts
        .iter()
        .map(|alert| format!("[{}] {}", alert.timestamp.format("%H:%M:%S"), alert.message))
        .join("\n");
    println!("{lines}");
}

fn breakout_row(symbol: &str, event: &BreakoutEvent) -> BreakoutRow {
    BreakoutRow {
        symbol: symbol.to_string(),
        pattern: event.pattern.label(),
        signal: event.pattern.signal().to_string(),
        level: format!("{:.2}", event.level),
        price: format!("{:.2}", event.current_price),
        change: format!("{:+.2}%", event.price_change_pct),
        volume: format!("{:.2}x", event.volume_ratio),
        strength: format!("{:.2}%", event.breakout_strength),
        confidence: event.confirmation_strength,
    }
}
