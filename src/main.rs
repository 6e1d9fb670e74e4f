mod config;
mod output;

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::{AlertArgs, AppConfig, BreakoutArgs, Command, ScanArgs, ScanEngine, ZonesArgs};
use output::{print_alerts, print_breakout, print_breakout_scan, print_zone_scan, print_zones};
use zone_scout::analysis::{detect_breakout, detect_zones};
use zone_scout::data::{CandleSeries, Zone};
use zone_scout::loader::load_series_from_csv;
use zone_scout::notify::{dispatch, AlertBook, LogNotifier};
use zone_scout::scanner::{scan_breakouts, scan_zones, top_htf_zones};
use zone_scout::source::{format_symbol, CsvDirectorySource, ExchangeSource, SeriesSource};

fn main() -> Result<()> {
    let config = AppConfig::parse();
    init_tracing(config.verbose);
    run(&config)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(config: &AppConfig) -> Result<()> {
    let tz: Tz = config
        .timezone
        .parse()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("invalid timezone {:?}", config.timezone))?;

    match &config.command {
        Command::Zones(args) => run_zones(args, tz),
        Command::Breakout(args) => run_breakout(args, tz),
        Command::Scan(args) => run_scan(args, tz),
        Command::Alert(args) => run_alert(args, tz),
    }
}

fn load(path: &Path, tz: Tz) -> Result<CandleSeries> {
    if !path.exists() {
        bail!("input file {:?} does not exist", path);
    }
    let series = load_series_from_csv(path, tz)
        .with_context(|| format!("failed to load input data from {:?}", path))?;

    if let (Some(start), Some(end)) = (series.first(), series.last()) {
        info!(
            candles = series.len(),
            start = %start.timestamp.format("%Y-%m-%d %H:%M"),
            end = %end.timestamp.format("%Y-%m-%d %H:%M"),
            "loaded series"
        );
    }
    Ok(series)
}

fn symbol_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "series".to_string())
}

fn last_close(series: &CandleSeries) -> Result<f64> {
    series
        .last()
        .map(|candle| candle.close)
        .context("series has no candles")
}

fn run_zones(args: &ZonesArgs, tz: Tz) -> Result<()> {
    let series = load(&args.input_path, tz)?;

    let mut htf_zones: Vec<Zone> = Vec::new();
    for (path, htf) in &args.htf_inputs {
        let htf_series = load(path, tz)?;
        let zones = top_htf_zones(&htf_series, *htf);
        debug!(%htf, zones = zones.len(), "higher timeframe zones");
        htf_zones.extend(zones);
    }

    let zones = detect_zones(&series, args.timeframe, &htf_zones);
    let zones = args.filter.to_filter().apply(&zones);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&zones)?);
    } else {
        print_zones(&symbol_of(&args.input_path), &zones, last_close(&series)?);
    }
    Ok(())
}

fn run_breakout(args: &BreakoutArgs, tz: Tz) -> Result<()> {
    let series = load(&args.input_path, tz)?;
    let event = detect_breakout(&series, args.timeframe);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&event)?);
    } else {
        print_breakout(&symbol_of(&args.input_path), event.as_ref());
    }
    Ok(())
}

fn run_scan(args: &ScanArgs, tz: Tz) -> Result<()> {
    if !args.dir.is_dir() {
        bail!("scan directory {:?} does not exist", args.dir);
    }
    let csv = CsvDirectorySource::new(&args.dir, tz);
    let source: Box<dyn SeriesSource> = match args.exchange {
        Some(exchange) => Box::new(ExchangeSource::new(csv, exchange)),
        None => Box::new(csv),
    };
    let source = source.as_ref();

    match args.engine {
        ScanEngine::Breakout => {
            let results =
                scan_breakouts(&args.symbols, args.timeframe, args.period, source, args.workers)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_breakout_scan(&results);
            }
        }
        ScanEngine::Zones => {
            let results =
                scan_zones(&args.symbols, args.timeframe, args.period, source, args.workers)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_zone_scan(&results);
            }
        }
    }
    Ok(())
}

fn run_alert(args: &AlertArgs, tz: Tz) -> Result<()> {
    let series = load(&args.input_path, tz)?;
    let price = match args.price {
        Some(price) => price,
        None => last_close(&series)?,
    };
    if price <= 0.0 {
        bail!("price must be positive, got {price}");
    }

    let symbol = match args.exchange {
        Some(exchange) => format_symbol(&args.symbol, exchange),
        None => args.symbol.clone(),
    };

    let zones = detect_zones(&series, args.timeframe, &[]);
    let mut book = AlertBook::new();
    let alerts = book.check(&symbol, price, &zones, args.alert_distance, Utc::now());
    print_alerts(&alerts);

    let report = dispatch(&LogNotifier, &alerts);
    if !report.failures.is_empty() {
        info!(
            sent = report.sent,
            failed = report.failures.len(),
            "some alerts could not be delivered"
        );
    }
    Ok(())
}
