use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Canonical time source.
///
/// Every subsystem takes an `Arc<dyn Clock>` instead of calling
/// `Utc::now()` directly, so the end-to-end scenarios can pin "now" and the
/// TTL stores can be driven deterministically.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to an explicit instant, advanceable by hand.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward (or backward) by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Default user zone when a user record carries no explicit timezone.
pub const DEFAULT_TIMEZONE: &str = "Asia/Jerusalem";

/// Parse an IANA zone name, falling back to the default zone.
pub fn parse_zone(name: &str) -> Tz {
    name.parse().unwrap_or(chrono_tz::Asia::Jerusalem)
}

/// Render a UTC instant in the user zone as `dd/mm/yyyy HH:MM`.
pub fn format_local(ts: DateTime<Utc>, zone: Tz) -> String {
    ts.with_timezone(&zone).format("%d/%m/%Y %H:%M").to_string()
}

/// Render only the local time portion as `HH:MM`.
pub fn format_local_time(ts: DateTime<Utc>, zone: Tz) -> String {
    ts.with_timezone(&zone).format("%H:%M").to_string()
}

/// The UTC instant of local midnight on the given local date.
pub fn local_midnight_utc(date: chrono::NaiveDate, zone: Tz) -> DateTime<Utc> {
    // `earliest` handles DST gaps by taking the first valid instant.
    zone.from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
        .earliest()
        .unwrap_or_else(|| zone.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()))
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn jerusalem_summer_offset_is_three_hours() {
        let zone = parse_zone("Asia/Jerusalem");
        let date = NaiveDate::from_ymd_opt(2025, 10, 10).unwrap();
        let midnight = local_midnight_utc(date, zone);
        assert_eq!(midnight.to_rfc3339(), "2025-10-09T21:00:00+00:00");
    }

    #[test]
    fn unknown_zone_falls_back_to_jerusalem() {
        let zone = parse_zone("Not/AZone");
        assert_eq!(zone, chrono_tz::Asia::Jerusalem);
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new("2025-10-10T07:00:00Z".parse().unwrap());
        clock.advance(chrono::Duration::minutes(90));
        assert_eq!(clock.now_utc().to_rfc3339(), "2025-10-10T08:30:00+00:00");
    }
}
