use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::{detect_breakout, detect_zones};
use crate::data::{BreakoutEvent, CandleSeries, Timeframe, Zone};
use crate::source::{Period, SeriesSource};

/// Breakouts below this confirmation are not reported by a scan.
pub const MIN_CONFIRMATION: u32 = 30;

const HTF_COUNT: usize = 2;
const HTF_ZONES_PER_TIMEFRAME: usize = 3;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to build scan worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakoutScanResult {
    pub symbol: String,
    #[serde(flatten)]
    pub event: BreakoutEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneScanResult {
    pub symbol: String,
    pub current_price: f64,
    pub zones: Vec<Zone>,
}

impl ZoneScanResult {
    pub fn best_score(&self) -> f64 {
        self.zones
            .iter()
            .map(Zone::strength_score)
            .fold(f64::MIN, f64::max)
    }
}

/// Top zones from the two nearest coarser timeframes, tagged with their timeframe.
///
/// A timeframe whose data cannot be fetched is skipped.
pub fn higher_timeframe_zones(
    source: &dyn SeriesSource,
    symbol: &str,
    timeframe: Timeframe,
    period: Period,
) -> Vec<Zone> {
    let mut htf_zones = Vec::new();
    for &htf in timeframe.higher_timeframes().iter().take(HTF_COUNT) {
        let series = match source.get_series(symbol, period.widened_for(htf), htf) {
            Ok(Some(series)) => series,
            Ok(None) => {
                debug!(symbol, %htf, "no higher timeframe data");
                continue;
            }
            Err(err) => {
                warn!(symbol, %htf, error = %err, "skipping higher timeframe");
                continue;
            }
        };

        htf_zones.extend(top_htf_zones(&series, htf));
    }
    htf_zones
}

/// The best zones of a coarser-timeframe series, tagged for confluence use.
pub fn top_htf_zones(series: &CandleSeries, htf: Timeframe) -> Vec<Zone> {
    detect_zones(series, htf, &[])
        .into_iter()
        .take(HTF_ZONES_PER_TIMEFRAME)
        .map(|mut zone| {
            zone.timeframe = Some(htf);
            zone.is_htf = true;
            zone
        })
        .collect()
}

/// Run the breakout engine over `symbols`, strongest confirmation first.
pub fn scan_breakouts(
    symbols: &[String],
    timeframe: Timeframe,
    period: Period,
    source: &dyn SeriesSource,
    workers: usize,
) -> Result<Vec<BreakoutScanResult>, ScanError> {
    let mut results: Vec<BreakoutScanResult> = run_pool(workers, || {
        symbols
            .par_iter()
            .filter_map(|symbol| {
                let series = fetch(source, symbol, period, timeframe)?;
                let event = detect_breakout(&series, timeframe)?;
                (event.confirmation_strength >= MIN_CONFIRMATION).then(|| BreakoutScanResult {
                    symbol: symbol.clone(),
                    event,
                })
            })
            .collect()
    })?;

    results.sort_by(|a, b| {
        b.event
            .confirmation_strength
            .cmp(&a.event.confirmation_strength)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    info!(scanned = symbols.len(), found = results.len(), "breakout scan complete");
    Ok(results)
}

/// Run the zone engine, with higher-timeframe confluence, over `symbols`.
///
/// Symbols without zones are left out. Results are ordered by their best
/// zone score.
pub fn scan_zones(
    symbols: &[String],
    timeframe: Timeframe,
    period: Period,
    source: &dyn SeriesSource,
    workers: usize,
) -> Result<Vec<ZoneScanResult>, ScanError> {
    let mut results: Vec<ZoneScanResult> = run_pool(workers, || {
        symbols
            .par_iter()
            .filter_map(|symbol| {
                let series = fetch(source, symbol, period, timeframe)?;
                let current_price = series.last()?.close;
                let htf_zones = higher_timeframe_zones(source, symbol, timeframe, period);
                let zones = detect_zones(&series, timeframe, &htf_zones);
                (!zones.is_empty()).then(|| ZoneScanResult {
                    symbol: symbol.clone(),
                    current_price,
                    zones,
                })
            })
            .collect()
    })?;

    results.sort_by(|a, b| {
        b.best_score()
            .total_cmp(&a.best_score())
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    info!(scanned = symbols.len(), found = results.len(), "zone scan complete");
    Ok(results)
}

fn run_pool<T, F>(workers: usize, job: F) -> Result<T, ScanError>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;
    Ok(pool.install(job))
}

fn fetch(
    source: &dyn SeriesSource,
    symbol: &str,
    period: Period,
    timeframe: Timeframe,
) -> Option<CandleSeries> {
    match source.get_series(symbol, period, timeframe) {
        Ok(Some(series)) => Some(series),
        Ok(None) => {
            debug!(symbol, "no data, skipping");
            None
        }
        Err(err) => {
            warn!(symbol, error = %err, "failed to fetch series, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{assert_close, candles_from_closes, series, valley_candles};
    use crate::source::{Exchange, ExchangeSource, MemorySource};

    fn breakout_series(last_close: f64, last_volume: f64) -> CandleSeries {
        let mut closes = vec![100.0; 31];
        let mut volumes = vec![1_000.0; 31];
        closes[30] = last_close;
        volumes[30] = last_volume;
        series(candles_from_closes(&closes, &volumes))
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_breakout_scan_orders_and_filters() {
        let mut source = MemorySource::new();
        // resistance breakout, confirmation 85
        source.insert("AAA", Timeframe::D1, breakout_series(104.0, 3_000.0));
        // support breakdown, confirmation 30
        source.insert("BBB", Timeframe::D1, breakout_series(97.0, 1_000.0));
        source.insert("CCC", Timeframe::D1, breakout_series(100.0, 1_000.0));
        source.insert("ZZZ", Timeframe::D1, breakout_series(104.0, 3_000.0));

        let results = scan_breakouts(
            &symbols(&["BBB", "ZZZ", "CCC", "MISSING", "AAA"]),
            Timeframe::D1,
            Period::Max,
            &source,
            2,
        )
        .unwrap();

        let order: Vec<&str> = results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["AAA", "ZZZ", "BBB"]);
        assert_eq!(results[0].event.confirmation_strength, 85);
        assert_eq!(results[2].event.confirmation_strength, MIN_CONFIRMATION);
    }

    #[test]
    fn test_breakout_below_threshold_is_dropped() {
        let mut closes: Vec<f64> = (0..48).map(|i| 100.0 + 0.5 * i as f64).collect();
        closes.push(115.0);
        closes.push(121.0);
        let volumes = vec![1_000.0; closes.len()];
        let mut source = MemorySource::new();
        source.insert("MA", Timeframe::D1, series(candles_from_closes(&closes, &volumes)));

        let results =
            scan_breakouts(&symbols(&["MA"]), Timeframe::D1, Period::Max, &source, 1).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_exchange_scan_reports_bare_symbol() {
        let mut memory = MemorySource::new();
        memory.insert("RELIANCE.NS", Timeframe::D1, breakout_series(104.0, 3_000.0));
        let source = ExchangeSource::new(memory, Exchange::Nse);

        let results =
            scan_breakouts(&symbols(&["reliance"]), Timeframe::D1, Period::Max, &source, 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol, "reliance");
    }

    #[test]
    fn test_higher_timeframe_zones_are_tagged() {
        let mut source = MemorySource::new();
        source.insert("AAA", Timeframe::W1, series(valley_candles()));

        let htf = higher_timeframe_zones(&source, "AAA", Timeframe::D1, Period::Max);
        assert!(!htf.is_empty());
        assert!(htf.len() <= HTF_ZONES_PER_TIMEFRAME);
        assert!(htf.iter().all(|z| z.is_htf && z.timeframe == Some(Timeframe::W1)));
        assert!(htf.iter().any(|z| z.level == 100.0));

        assert!(higher_timeframe_zones(&source, "AAA", Timeframe::W1, Period::Max).is_empty());
    }

    #[test]
    fn test_zone_scan_applies_confluence() {
        let mut source = MemorySource::new();
        source.insert("AAA", Timeframe::D1, series(valley_candles()));
        source.insert("AAA", Timeframe::W1, series(valley_candles()));
        source.insert("BBB", Timeframe::D1, series(valley_candles()));
        source.insert("FLAT", Timeframe::D1, breakout_series(100.0, 1_000.0));

        let results = scan_zones(
            &symbols(&["BBB", "FLAT", "AAA"]),
            Timeframe::D1,
            Period::Max,
            &source,
            4,
        )
        .unwrap();

        let order: Vec<&str> = results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["AAA", "BBB"]);
        assert_close(results[0].best_score(), 100.0);
        assert_eq!(results[0].zones[0].htf_confluence, Some(1.0));
        assert_close(results[1].best_score(), 90.0);
        assert_eq!(results[1].zones[0].htf_confluence, None);
        assert_close(results[0].current_price, 105.5);
    }
}
