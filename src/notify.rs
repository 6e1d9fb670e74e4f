use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::data::{Zone, ZoneStrength, ZoneType};

pub const ALERT_COOLDOWN_MINUTES: i64 = 30;
pub const ALERT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),
}

/// Price came within the alert distance of a zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityAlert {
    pub symbol: String,
    pub zone_type: ZoneType,
    pub zone_level: f64,
    pub strength: ZoneStrength,
    pub touches: usize,
    pub current_price: f64,
    pub distance_pct: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl ProximityAlert {
    fn new(symbol: &str, zone: &Zone, current_price: f64, timestamp: DateTime<Utc>) -> Self {
        let distance_pct = zone.distance_pct(current_price);
        Self {
            symbol: symbol.to_string(),
            zone_type: zone.zone_type,
            zone_level: zone.level,
            strength: zone.strength(),
            touches: zone.touches,
            current_price,
            distance_pct,
            timestamp,
            message: format!(
                "ALERT: {symbol} is {distance_pct:.2}% away from {} zone at {:.2}",
                zone.zone_type, zone.level
            ),
        }
    }

    pub fn direction(&self) -> &'static str {
        if self.current_price > self.zone_level {
            "above"
        } else {
            "below"
        }
    }
}

/// Cooldown and history state for proximity alerts.
///
/// The same (symbol, zone level) pair fires at most once per cooldown window.
#[derive(Debug, Clone, Default)]
pub struct AlertBook {
    last_fired: HashMap<(String, u64), DateTime<Utc>>,
    history: VecDeque<ProximityAlert>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts that fire for `price` against `zones` at time `now`. Fired
    /// alerts are recorded in the book.
    pub fn check(
        &mut self,
        symbol: &str,
        price: f64,
        zones: &[Zone],
        alert_distance: f64,
        now: DateTime<Utc>,
    ) -> Vec<ProximityAlert> {
        let cooldown = Duration::minutes(ALERT_COOLDOWN_MINUTES);
        // Entries past the cooldown no longer suppress anything.
        self.last_fired.retain(|_, last| now - *last <= cooldown);
        let mut fired = Vec::new();

        for zone in zones {
            if zone.distance_pct(price) > alert_distance {
                continue;
            }
            let key = (symbol.to_string(), zone.level.to_bits());
            let cooled = self
                .last_fired
                .get(&key)
                .map_or(true, |last| now - *last > cooldown);
            if !cooled {
                continue;
            }

            let alert = ProximityAlert::new(symbol, zone, price, now);
            self.last_fired.insert(key, now);
            self.history.push_back(alert.clone());
            if self.history.len() > ALERT_HISTORY_LIMIT {
                self.history.pop_front();
            }
            fired.push(alert);
        }
        fired
    }

    /// Most recent alerts, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ProximityAlert> {
        self.history.iter()
    }
}

/// Transport boundary for alert delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError>;
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        info!(subject, "{content}");
        Ok(())
    }
}

/// Keeps every delivered message in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Transport("recorder lock poisoned".into()))?
            .push((subject.to_string(), content.to_string()));
        Ok(())
    }
}

pub fn format_subject(alert: &ProximityAlert) -> String {
    format!(
        "Zone Alert: {} - {} Zone",
        alert.symbol,
        alert.zone_type.title()
    )
}

pub fn format_text_body(alert: &ProximityAlert) -> String {
    format!(
        "STOCK TRADING ALERT\n\
         {message}\n\
         \n\
         STOCK INFORMATION:\n\
         Symbol: {symbol}\n\
         Current Price: {price:.2}\n\
         Alert Time: {time}\n\
         \n\
         ZONE INFORMATION:\n\
         Zone Type: {zone_type}\n\
         Zone Level: {level:.2}\n\
         Zone Strength: {strength}\n\
         Number of Touches: {touches}\n\
         \n\
         ANALYSIS:\n\
         Distance from Zone: {distance:.2}%\n\
         Price Direction: {direction} zone level\n",
        message = alert.message,
        symbol = alert.symbol,
        price = alert.current_price,
        time = alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
        zone_type = alert.zone_type.title(),
        level = alert.zone_level,
        strength = alert.strength.title(),
        touches = alert.touches,
        distance = alert.distance_pct,
        direction = alert.direction(),
    )
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub sent: usize,
    pub failures: Vec<(ProximityAlert, NotifyError)>,
}

/// Deliver each alert. A failed delivery is reported; the alert stays recorded.
pub fn dispatch(notifier: &dyn Notifier, alerts: &[ProximityAlert]) -> DispatchReport {
    let mut report = DispatchReport::default();
    for alert in alerts {
        match notifier.notify(&format_subject(alert), &format_text_body(alert)) {
            Ok(()) => report.sent += 1,
            Err(err) => {
                warn!(symbol = %alert.symbol, level = alert.zone_level, error = %err, "alert delivery failed");
                report.failures.push((alert.clone(), err));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _subject: &str, _content: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("connection refused".into()))
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::minutes(minute as i64)
    }

    fn demand_zone() -> Zone {
        let mut zone = Zone::fresh(ZoneType::Demand, 100.0, 30, 8.0);
        zone.set_strength_score(75.0);
        zone
    }

    #[test]
    fn test_cooldown_suppresses_repeat_within_window() {
        let mut book = AlertBook::new();
        let zones = [demand_zone()];

        assert_eq!(book.check("ABC", 100.5, &zones, 1.0, at(0)).len(), 1);
        assert!(book.check("ABC", 100.5, &zones, 1.0, at(10)).is_empty());
        assert!(book.check("ABC", 100.5, &zones, 1.0, at(30)).is_empty());
        assert_eq!(book.check("ABC", 100.5, &zones, 1.0, at(31)).len(), 1);
        assert_eq!(book.history().count(), 2);
    }

    #[test]
    fn test_cooldown_is_per_symbol_and_level() {
        let mut book = AlertBook::new();
        let zones = [demand_zone()];
        assert_eq!(book.check("ABC", 100.5, &zones, 1.0, at(0)).len(), 1);
        assert_eq!(book.check("XYZ", 100.5, &zones, 1.0, at(1)).len(), 1);

        let other = [Zone::fresh(ZoneType::Supply, 101.0, 40, 4.0)];
        assert_eq!(book.check("ABC", 100.5, &other, 1.0, at(2)).len(), 1);
    }

    #[test]
    fn test_expired_cooldowns_are_pruned() {
        let mut book = AlertBook::new();
        let near = [demand_zone()];
        let far = [Zone::fresh(ZoneType::Supply, 150.0, 40, 4.0)];

        book.check("ABC", 100.5, &near, 1.0, at(0));
        book.check("XYZ", 100.5, &near, 1.0, at(20));
        assert_eq!(book.last_fired.len(), 2);

        // Nothing fires here, but the ABC entry has outlived its cooldown.
        assert!(book.check("ABC", 100.5, &far, 1.0, at(45)).is_empty());
        assert_eq!(book.last_fired.len(), 1);
        assert!(book.last_fired.contains_key(&("XYZ".to_string(), 100.0_f64.to_bits())));

        assert!(book.check("XYZ", 100.5, &far, 1.0, at(60)).is_empty());
        assert!(book.last_fired.is_empty());
        assert_eq!(book.history().count(), 2);
    }

    #[test]
    fn test_recorder_keeps_messages_after_poisoning() {
        let recorder = RecordingNotifier::new();
        recorder.notify("subject", "body").unwrap();

        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = recorder.sent.lock().unwrap();
            panic!("poison the recorder");
        }));
        assert!(poisoned.is_err());

        assert_eq!(
            recorder.messages(),
            vec![("subject".to_string(), "body".to_string())]
        );
        assert!(recorder.notify("again", "body").is_err());
    }

    #[test]
    fn test_distance_threshold() {
        let mut book = AlertBook::new();
        let zones = [demand_zone()];
        assert!(book.check("ABC", 102.0, &zones, 1.0, at(0)).is_empty());

        let alerts = book.check("ABC", 101.0, &zones, 1.0, at(0));
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].distance_pct <= 1.0);
        assert_eq!(alerts[0].direction(), "above");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut book = AlertBook::new();
        for step in 0..60 {
            let zone = Zone::fresh(ZoneType::Demand, 100.0 + step as f64 * 0.01, 1, 4.0);
            book.check("ABC", 100.0, &[zone], 1.0, at(0));
        }
        assert_eq!(book.history().count(), ALERT_HISTORY_LIMIT);
        let oldest = book.history().next().unwrap();
        assert!((oldest.zone_level - 100.1).abs() < 1e-9);
    }

    #[test]
    fn test_message_formatting() {
        let mut book = AlertBook::new();
        let alert = book
            .check("ABC", 99.5, &[demand_zone()], 1.0, at(0))
            .remove(0);

        assert_eq!(format_subject(&alert), "Zone Alert: ABC - Demand Zone");
        let body = format_text_body(&alert);
        assert!(body.contains("Zone Level: 100.00"));
        assert!(body.contains("Zone Strength: Strong"));
        assert!(body.contains("Distance from Zone: 0.50%"));
        assert!(body.contains("Price Direction: below zone level"));
        assert!(body.contains("Alert Time: 2024-03-01 10:00:00"));
    }

    #[test]
    fn test_dispatch_reports_failures() {
        let mut book = AlertBook::new();
        let alerts = book.check("ABC", 100.5, &[demand_zone()], 1.0, at(0));

        let recorder = RecordingNotifier::new();
        let report = dispatch(&recorder, &alerts);
        assert_eq!(report.sent, 1);
        assert_eq!(recorder.messages()[0].0, "Zone Alert: ABC - Demand Zone");

        let report = dispatch(&FailingNotifier, &alerts);
        assert_eq!(report.sent, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(book.history().count(), 1);
    }
}
