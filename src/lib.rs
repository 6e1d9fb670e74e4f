pub mod analysis;
pub mod data;
pub mod loader;
pub mod notify;
pub mod scanner;
pub mod source;

pub use analysis::{detect_breakout, detect_zones, ZoneFilter};
pub use data::{BreakoutEvent, BreakoutPattern, Candle, CandleSeries, Timeframe, Zone, ZoneType};
