use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;

use zone_scout::analysis::{ZoneFilter, ZoneStatus};
use zone_scout::data::{Timeframe, ZoneQuality, ZoneStrength, ZoneType};
use zone_scout::source::{Exchange, Period};

/// Command-line configuration for the zone and breakout scanner.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// IANA timezone used to interpret naive CSV timestamps.
    #[arg(long, global = true, default_value = "America/New_York")]
    pub timezone: String,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Detect demand/supply zones in one CSV series.
    Zones(ZonesArgs),
    /// Check the latest candle of one CSV series for a breakout.
    Breakout(BreakoutArgs),
    /// Run an engine across a directory of per-symbol CSV files.
    Scan(ScanArgs),
    /// Evaluate proximity alerts for one series against its zones.
    Alert(AlertArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ZonesArgs {
    /// Input CSV file path containing OHLCV data.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input_path: PathBuf,

    /// Candle interval of the input.
    #[arg(short, long, default_value = "1d")]
    pub timeframe: Timeframe,

    /// Higher-timeframe series for confluence, as FILE:TIMEFRAME.
    #[arg(long = "htf", value_name = "FILE:TF", value_parser = parse_htf_input)]
    pub htf_inputs: Vec<(PathBuf, Timeframe)>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Print zones as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct BreakoutArgs {
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input_path: PathBuf,

    #[arg(short, long, default_value = "1d")]
    pub timeframe: Timeframe,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScanEngine {
    Zones,
    Breakout,
}

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Directory holding <SYMBOL>_<interval>.csv or <SYMBOL>.csv files.
    #[arg(short, long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Comma-separated list of symbols to scan.
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub symbols: Vec<String>,

    #[arg(short, long, default_value = "1d")]
    pub timeframe: Timeframe,

    /// History to analyse, counted back from the latest candle.
    #[arg(short, long, default_value = "6mo")]
    pub period: Period,

    #[arg(short, long, value_enum, default_value_t = ScanEngine::Breakout)]
    pub engine: ScanEngine,

    /// Worker threads for the scan.
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Exchange whose ticker format the files use (nse, us).
    #[arg(long)]
    pub exchange: Option<Exchange>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct AlertArgs {
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input_path: PathBuf,

    /// Symbol named in the alert.
    #[arg(long)]
    pub symbol: String,

    /// Format the alert symbol for this exchange (nse, us).
    #[arg(long)]
    pub exchange: Option<Exchange>,

    #[arg(short, long, default_value = "1d")]
    pub timeframe: Timeframe,

    /// Maximum distance from a zone, in percent of price, that triggers an alert.
    #[arg(long, default_value_t = 1.0)]
    pub alert_distance: f64,

    /// Price to test; defaults to the last close.
    #[arg(long)]
    pub price: Option<f64>,
}

/// Zone display filters. Empty lists accept everything.
#[derive(Debug, Clone, Args)]
pub struct FilterArgs {
    /// Zone types to show (demand, supply).
    #[arg(long = "type", value_delimiter = ',', value_parser = parse_lowercase::<ZoneType>)]
    pub types: Vec<ZoneType>,

    /// Strength classes to show (weak, medium, strong).
    #[arg(long = "strength", value_delimiter = ',', value_parser = parse_lowercase::<ZoneStrength>)]
    pub strengths: Vec<ZoneStrength>,

    /// Zone statuses to show (fresh, tested).
    #[arg(long = "status", value_delimiter = ',', value_parser = parse_lowercase::<ZoneStatus>)]
    pub statuses: Vec<ZoneStatus>,

    /// Zone qualities to show (medium, high).
    #[arg(long = "quality", value_delimiter = ',', value_parser = parse_lowercase::<ZoneQuality>)]
    pub qualities: Vec<ZoneQuality>,

    /// Minimum reaction strength in percent.
    #[arg(long, default_value_t = 0.0)]
    pub min_reaction: f64,

    /// Only show zones confirmed by a higher timeframe.
    #[arg(long)]
    pub htf_only: bool,
}

impl FilterArgs {
    pub fn to_filter(&self) -> ZoneFilter {
        ZoneFilter {
            types: self.types.clone(),
            strengths: self.strengths.clone(),
            statuses: self.statuses.clone(),
            qualities: self.qualities.clone(),
            min_reaction: self.min_reaction,
            htf_only: self.htf_only,
        }
    }
}

fn parse_lowercase<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_lowercase()))
        .map_err(|err| err.to_string())
}

fn parse_htf_input(value: &str) -> Result<(PathBuf, Timeframe), String> {
    let (path, timeframe) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected FILE:TIMEFRAME, got '{value}'"))?;
    let timeframe = timeframe.parse::<Timeframe>().map_err(|err| err.to_string())?;
    Ok((PathBuf::from(path), timeframe))
}
