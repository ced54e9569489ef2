//! Lead-time phrases: "remind me X before" an event.
//!
//! Output is minutes subtracted from the referenced event's start.

use regex::Regex;
use std::sync::OnceLock;

/// Parse a Hebrew/English lead-time phrase into minutes before the event.
///
/// Returns `None` when the text carries no recognizable "before" phrase.
pub fn parse_lead_time(text: &str) -> Option<i64> {
    let t = text.trim().to_lowercase();
    if !t.contains("לפני") && !t.contains("before") {
        return None;
    }

    // Fixed phrases, longest first.
    const FIXED: &[(&str, i64)] = &[
        ("חצי שעה לפני", 30),
        ("רבע שעה לפני", 15),
        ("שעתיים לפני", 120),
        ("יומיים לפני", 2880),
        ("שבוע לפני", 10_080),
        ("שעה לפני", 60),
        ("יום לפני", 1440),
        ("a week before", 10_080),
        ("a day before", 1440),
        ("half an hour before", 30),
        ("an hour before", 60),
        ("one hour before", 60),
    ];
    for (phrase, minutes) in FIXED {
        if t.contains(phrase) {
            return Some(*minutes);
        }
    }

    static RE_HOURS: OnceLock<Regex> = OnceLock::new();
    let rex = RE_HOURS.get_or_init(|| {
        Regex::new(r"(\d{1,2})\s*(?:שעות לפני|hours? before)").expect("static regex")
    });
    if let Some(caps) = rex.captures(&t) {
        let n: i64 = caps[1].parse().ok()?;
        if (1..=24).contains(&n) {
            return Some(n * 60);
        }
        return None;
    }

    static RE_MINUTES: OnceLock<Regex> = OnceLock::new();
    let rex = RE_MINUTES.get_or_init(|| {
        Regex::new(r"(\d{1,3})\s*(?:דקות לפני|minutes? before)").expect("static regex")
    });
    if let Some(caps) = rex.captures(&t) {
        let n: i64 = caps[1].parse().ok()?;
        if n >= 1 {
            return Some(n);
        }
    }

    static RE_DAYS: OnceLock<Regex> = OnceLock::new();
    let rex = RE_DAYS.get_or_init(|| {
        Regex::new(r"(\d{1,2})\s*(?:ימים לפני|days? before)").expect("static regex")
    });
    if let Some(caps) = rex.captures(&t) {
        let n: i64 = caps[1].parse().ok()?;
        if (1..=31).contains(&n) {
            return Some(n * 1440);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_before() {
        assert_eq!(parse_lead_time("תזכיר לי יום לפני"), Some(1440));
    }

    #[test]
    fn numeric_hours_before() {
        assert_eq!(parse_lead_time("תזכיר לי 5 שעות לפני"), Some(300));
    }

    #[test]
    fn two_hours_fixed_form() {
        assert_eq!(parse_lead_time("שעתיים לפני"), Some(120));
    }

    #[test]
    fn half_hour() {
        assert_eq!(parse_lead_time("חצי שעה לפני"), Some(30));
    }

    #[test]
    fn single_hour_not_shadowed_by_two_hours() {
        assert_eq!(parse_lead_time("שעה לפני"), Some(60));
    }

    #[test]
    fn minutes_form() {
        assert_eq!(parse_lead_time("10 דקות לפני"), Some(10));
    }

    #[test]
    fn week_before() {
        assert_eq!(parse_lead_time("שבוע לפני"), Some(10_080));
    }

    #[test]
    fn hours_out_of_range_rejected() {
        assert_eq!(parse_lead_time("30 שעות לפני"), None);
    }

    #[test]
    fn unrelated_text_is_none() {
        assert_eq!(parse_lead_time("קבע פגישה מחר"), None);
    }
}
