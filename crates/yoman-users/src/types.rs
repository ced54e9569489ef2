use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use yoman_core::clock::parse_zone;
use yoman_core::types::{Language, Phone, TimeOfDay, UserId};

/// Morning-summary preferences.
///
/// `days` is a bitset, bit 0 = Sunday … bit 6 = Saturday (Israeli week
/// anchor, same as the date parser).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MorningNotification {
    pub enabled: bool,
    /// Local time "HH:MM".
    pub time: String,
    pub days: u8,
    pub include_memos: bool,
}

impl Default for MorningNotification {
    fn default() -> Self {
        Self {
            enabled: false,
            time: "08:00".to_string(),
            days: 0b0111_1111,
            include_memos: true,
        }
    }
}

impl MorningNotification {
    /// Whether the summary is wanted on the given Sunday-indexed weekday.
    pub fn wants_day(&self, sunday_indexed: u8) -> bool {
        self.enabled && (self.days >> (sunday_indexed % 7)) & 1 == 1
    }

    /// Parse the configured "HH:MM" into hour and minute components.
    pub fn local_time(&self) -> Option<(u32, u32)> {
        let (h, m) = self.time.split_once(':')?;
        let h: u32 = h.parse().ok()?;
        let m: u32 = m.parse().ok()?;
        if h < 24 && m < 60 {
            Some((h, m))
        } else {
            None
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub phone: Phone,
    pub name: String,
    pub pin_hash: String,
    /// IANA zone name, default `Asia/Jerusalem`.
    pub timezone: String,
    pub language: Language,
    pub default_location: String,
    pub preferred_time_of_day: Option<TimeOfDay>,
    pub default_event_duration_minutes: i64,
    /// Free-form learned user patterns.
    pub patterns: serde_json::Value,
    pub morning_notification: MorningNotification,
    pub failed_login_count: u32,
    pub lockout_until_utc: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn zone(&self) -> Tz {
        parse_zone(&self.timezone)
    }
}

/// Ephemeral per-phone authentication session, TTL 48 h.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub authenticated: bool,
    pub user_id: Option<UserId>,
    pub failed_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morning_days_bitset_is_sunday_first() {
        let m = MorningNotification {
            enabled: true,
            time: "07:30".to_string(),
            days: 0b0000_0001,
            include_memos: false,
        };
        assert!(m.wants_day(0)); // Sunday
        assert!(!m.wants_day(1)); // Monday
    }

    #[test]
    fn disabled_wants_no_day() {
        let m = MorningNotification::default();
        assert!(!m.wants_day(0));
    }

    #[test]
    fn local_time_parses() {
        let m = MorningNotification {
            time: "07:45".to_string(),
            ..Default::default()
        };
        assert_eq!(m.local_time(), Some((7, 45)));
    }

    #[test]
    fn bad_local_time_is_none() {
        let m = MorningNotification {
            time: "25:00".to_string(),
            ..Default::default()
        };
        assert_eq!(m.local_time(), None);
    }
}
