pub mod breakout;
pub mod filters;
pub mod pivots;
pub mod rolling;
pub mod scoring;
pub mod zones;

#[cfg(test)]
pub mod test_support;

pub use breakout::{confirmation_strength, detect_breakout};
pub use filters::{ZoneFilter, ZoneStatus};
pub use pivots::{adaptive_window, find_pivot_highs, find_pivot_lows};
pub use zones::{detect_zones, MAX_ZONES};
