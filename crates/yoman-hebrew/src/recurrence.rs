//! Recurrence rules: natural-phrase parsing, RRULE-style serialization,
//! and occurrence expansion.
//!
//! Supported subset: `FREQ=DAILY|WEEKLY|MONTHLY` with `INTERVAL`, `BYDAY`
//! (single weekday), `BYMONTHDAY`, `COUNT`, `UNTIL` and `EXDATE` (local
//! dates excluded from expansion). Occurrences keep the anchor's local
//! time-of-day, so a daily 15:00 reminder stays at 15:00 across DST.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{HebrewError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freq {
    Daily,
    Weekly,
    Monthly,
}

/// A parsed recurrence rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub freq: Freq,
    pub interval: u32,
    /// Weekday for WEEKLY rules.
    pub by_day: Option<Weekday>,
    /// Day-of-month (1–31) for MONTHLY rules.
    pub by_month_day: Option<u32>,
    pub count: Option<u32>,
    pub until: Option<DateTime<Utc>>,
    /// Local dates excluded from expansion.
    pub exdates: Vec<NaiveDate>,
}

const DAY_CODES: &[(&str, Weekday)] = &[
    ("SU", Weekday::Sun),
    ("MO", Weekday::Mon),
    ("TU", Weekday::Tue),
    ("WE", Weekday::Wed),
    ("TH", Weekday::Thu),
    ("FR", Weekday::Fri),
    ("SA", Weekday::Sat),
];

/// Hebrew weekday names indexed Sunday-first, as in the date parser.
const WEEKDAYS_HE: &[(&str, Weekday)] = &[
    ("ראשון", Weekday::Sun),
    ("שני", Weekday::Mon),
    ("שלישי", Weekday::Tue),
    ("רביעי", Weekday::Wed),
    ("חמישי", Weekday::Thu),
    ("שישי", Weekday::Fri),
    ("שבת", Weekday::Sat),
];

const WEEKDAYS_EN: &[(&str, Weekday)] = &[
    ("sunday", Weekday::Sun),
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
];

fn day_code(day: Weekday) -> &'static str {
    DAY_CODES.iter().find(|(_, d)| *d == day).unwrap().0
}

impl RecurrenceRule {
    fn base(freq: Freq) -> Self {
        Self {
            freq,
            interval: 1,
            by_day: None,
            by_month_day: None,
            count: None,
            until: None,
            exdates: Vec::new(),
        }
    }

    /// Translate a natural Hebrew/English phrase into a rule.
    ///
    /// `כל יום` / `מידי יום` / `every day` → daily;
    /// `כל יום X` / `every X` → weekly on X;
    /// `ב-N לכל חודש` / `every Nth of the month` → monthly on day N.
    pub fn from_phrase(text: &str) -> Option<Self> {
        let t = text.trim().to_lowercase();

        // Monthly: "ב-5 לכל חודש" / "כל 5 לחודש" / "every 5th of the month".
        static RE_MONTH: OnceLock<Regex> = OnceLock::new();
        let rex = RE_MONTH.get_or_init(|| {
            Regex::new(r"(?:ב[-\s]?|כל\s+|every\s+)(\d{1,2})(?:th|st|nd|rd)?\s+(?:לכל חודש|לחודש|of the month|of each month)")
                .expect("static regex")
        });
        if let Some(caps) = rex.captures(&t) {
            let day: u32 = caps[1].parse().ok()?;
            if (1..=31).contains(&day) {
                let mut rule = Self::base(Freq::Monthly);
                rule.by_month_day = Some(day);
                return Some(rule);
            }
            return None;
        }

        // Weekly: "כל יום ראשון" / "ימי ראשון" / "every sunday".
        for (name, day) in WEEKDAYS_HE {
            if t.contains(&format!("כל יום {name}"))
                || t.contains(&format!("כל {name}"))
                || t.contains(&format!("ימי {name}"))
            {
                let mut rule = Self::base(Freq::Weekly);
                rule.by_day = Some(*day);
                return Some(rule);
            }
        }
        for (name, day) in WEEKDAYS_EN {
            if t.contains(&format!("every {name}")) {
                let mut rule = Self::base(Freq::Weekly);
                rule.by_day = Some(*day);
                return Some(rule);
            }
        }

        // Daily.
        if t.contains("כל יום") || t.contains("מידי יום") || t.contains("כל בוקר")
            || t.contains("every day") || t.contains("daily")
        {
            return Some(Self::base(Freq::Daily));
        }

        // Weekly without a named day: "כל שבוע" / "every week".
        if t.contains("כל שבוע") || t.contains("every week") || t.contains("weekly") {
            return Some(Self::base(Freq::Weekly));
        }

        None
    }

    /// Parse an RRULE-style string (`FREQ=WEEKLY;BYDAY=SU;COUNT=10`).
    pub fn parse(s: &str) -> Result<Self> {
        let mut freq = None;
        let mut rule = Self::base(Freq::Daily);

        for part in s.trim().trim_start_matches("RRULE:").split(';') {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| HebrewError::InvalidRecurrence(format!("bad component: {part}")))?;
            match key {
                "FREQ" => {
                    freq = Some(match value {
                        "DAILY" => Freq::Daily,
                        "WEEKLY" => Freq::Weekly,
                        "MONTHLY" => Freq::Monthly,
                        other => {
                            return Err(HebrewError::InvalidRecurrence(format!(
                                "unsupported FREQ: {other}"
                            )))
                        }
                    });
                }
                "INTERVAL" => {
                    rule.interval = value
                        .parse()
                        .map_err(|_| HebrewError::InvalidRecurrence(format!("INTERVAL={value}")))?;
                    if rule.interval == 0 {
                        return Err(HebrewError::InvalidRecurrence("INTERVAL=0".into()));
                    }
                }
                "BYDAY" => {
                    let day = DAY_CODES
                        .iter()
                        .find(|(code, _)| *code == value)
                        .map(|(_, d)| *d)
                        .ok_or_else(|| {
                            HebrewError::InvalidRecurrence(format!("BYDAY={value}"))
                        })?;
                    rule.by_day = Some(day);
                }
                "BYMONTHDAY" => {
                    let day: u32 = value.parse().map_err(|_| {
                        HebrewError::InvalidRecurrence(format!("BYMONTHDAY={value}"))
                    })?;
                    if !(1..=31).contains(&day) {
                        return Err(HebrewError::InvalidRecurrence(format!(
                            "BYMONTHDAY={value}"
                        )));
                    }
                    rule.by_month_day = Some(day);
                }
                "COUNT" => {
                    rule.count = Some(value.parse().map_err(|_| {
                        HebrewError::InvalidRecurrence(format!("COUNT={value}"))
                    })?);
                }
                "UNTIL" => {
                    // Compact UTC form YYYYMMDDTHHMMSSZ.
                    let parsed = chrono::NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")
                        .map_err(|_| {
                            HebrewError::InvalidRecurrence(format!("UNTIL={value}"))
                        })?;
                    rule.until = Some(Utc.from_utc_datetime(&parsed));
                }
                "EXDATE" => {
                    for d in value.split(',') {
                        let date = NaiveDate::parse_from_str(d, "%Y%m%d").map_err(|_| {
                            HebrewError::InvalidRecurrence(format!("EXDATE={d}"))
                        })?;
                        rule.exdates.push(date);
                    }
                }
                other => {
                    return Err(HebrewError::InvalidRecurrence(format!(
                        "unsupported component: {other}"
                    )))
                }
            }
        }

        rule.freq =
            freq.ok_or_else(|| HebrewError::InvalidRecurrence("missing FREQ".to_string()))?;
        Ok(rule)
    }

    /// First occurrence strictly after `after`, anchored at `anchor`
    /// (which fixes the local time-of-day and the expansion origin).
    pub fn next_after(
        &self,
        anchor: DateTime<Utc>,
        after: DateTime<Utc>,
        zone: Tz,
    ) -> Option<DateTime<Utc>> {
        // 400 iterations bounds the scan at ~1 year of daily occurrences.
        self.iter_from(anchor, zone)
            .take(self.count.unwrap_or(400) as usize)
            .take_while(|occ| self.until.is_none_or(|u| *occ <= u))
            .find(|occ| *occ > after)
    }

    /// All occurrences in `[from, to)`.
    pub fn expand_between(
        &self,
        anchor: DateTime<Utc>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        zone: Tz,
    ) -> Vec<DateTime<Utc>> {
        self.iter_from(anchor, zone)
            .take(self.count.unwrap_or(1000) as usize)
            .take_while(|occ| *occ < to)
            .take_while(|occ| self.until.is_none_or(|u| *occ <= u))
            .filter(|occ| *occ >= from)
            .collect()
    }

    /// Occurrences from the anchor onward, exclusions applied.
    fn iter_from(&self, anchor: DateTime<Utc>, zone: Tz) -> impl Iterator<Item = DateTime<Utc>> {
        let local_anchor = anchor.with_timezone(&zone);
        let time = local_anchor.time();
        let start_date = local_anchor.date_naive();
        let freq = self.freq;
        let interval = self.interval;
        let by_month_day = self.by_month_day;
        let exdates = self.exdates.clone();
        let horizon_year = local_anchor.year() + 10;

        let mut date = match freq {
            Freq::Daily => Some(start_date),
            Freq::Weekly => {
                let target = self.by_day.unwrap_or(start_date.weekday());
                let ahead = (target.num_days_from_sunday() as i64
                    - start_date.weekday().num_days_from_sunday() as i64)
                    .rem_euclid(7);
                Some(start_date + Duration::days(ahead))
            }
            Freq::Monthly => {
                let day = by_month_day.unwrap_or(start_date.day());
                let mut candidate =
                    NaiveDate::from_ymd_opt(start_date.year(), start_date.month(), day);
                if candidate.is_none_or(|d| d < start_date) {
                    candidate = next_month_day(start_date, day);
                }
                candidate
            }
        };

        std::iter::from_fn(move || {
            let current = date?;
            if current.year() > horizon_year {
                return None; // runaway guard
            }
            date = match freq {
                Freq::Daily => Some(current + Duration::days(interval as i64)),
                Freq::Weekly => Some(current + Duration::days(7 * interval as i64)),
                Freq::Monthly => {
                    let day = by_month_day.unwrap_or(current.day());
                    let mut next = current;
                    let mut result = None;
                    for _ in 0..interval {
                        match next_month_day(next, day) {
                            Some(d) => {
                                next = d;
                                result = Some(d);
                            }
                            None => {
                                result = None;
                                break;
                            }
                        }
                    }
                    result
                }
            };
            Some(current)
        })
        .filter(move |d| !exdates.contains(d))
        .map(move |d| {
            zone.from_local_datetime(&d.and_time(time))
                .earliest()
                .unwrap_or_else(|| zone.from_utc_datetime(&d.and_time(time)))
                .with_timezone(&Utc)
        })
    }
}

/// `day` of the month after the month of `date`; skips months without it
/// (e.g. the 31st skips February).
fn next_month_day(date: NaiveDate, day: u32) -> Option<NaiveDate> {
    let mut year = date.year();
    let mut month = date.month();
    for _ in 0..48 {
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }
    None
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let freq = match self.freq {
            Freq::Daily => "DAILY",
            Freq::Weekly => "WEEKLY",
            Freq::Monthly => "MONTHLY",
        };
        write!(f, "FREQ={freq}")?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if let Some(day) = self.by_day {
            write!(f, ";BYDAY={}", day_code(day))?;
        }
        if let Some(day) = self.by_month_day {
            write!(f, ";BYMONTHDAY={day}")?;
        }
        if let Some(count) = self.count {
            write!(f, ";COUNT={count}")?;
        }
        if let Some(until) = self.until {
            write!(f, ";UNTIL={}", until.format("%Y%m%dT%H%M%SZ"))?;
        }
        if !self.exdates.is_empty() {
            let dates: Vec<String> = self
                .exdates
                .iter()
                .map(|d| d.format("%Y%m%d").to_string())
                .collect();
            write!(f, ";EXDATE={}", dates.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Tz {
        chrono_tz::Asia::Jerusalem
    }

    #[test]
    fn phrase_every_day() {
        let rule = RecurrenceRule::from_phrase("כל יום").unwrap();
        assert_eq!(rule.freq, Freq::Daily);
        assert_eq!(rule.to_string(), "FREQ=DAILY");
    }

    #[test]
    fn phrase_every_sunday() {
        let rule = RecurrenceRule::from_phrase("כל יום ראשון").unwrap();
        assert_eq!(rule.freq, Freq::Weekly);
        assert_eq!(rule.by_day, Some(Weekday::Sun));
        assert_eq!(rule.to_string(), "FREQ=WEEKLY;BYDAY=SU");
    }

    #[test]
    fn phrase_monthly_day() {
        let rule = RecurrenceRule::from_phrase("ב-5 לכל חודש").unwrap();
        assert_eq!(rule.freq, Freq::Monthly);
        assert_eq!(rule.by_month_day, Some(5));
    }

    #[test]
    fn phrase_english_every_tuesday() {
        let rule = RecurrenceRule::from_phrase("every tuesday").unwrap();
        assert_eq!(rule.by_day, Some(Weekday::Tue));
    }

    #[test]
    fn parse_roundtrip() {
        let s = "FREQ=WEEKLY;BYDAY=MO;COUNT=4";
        let rule = RecurrenceRule::parse(s).unwrap();
        assert_eq!(rule.to_string(), s);
    }

    #[test]
    fn parse_rejects_unknown_freq() {
        assert!(RecurrenceRule::parse("FREQ=HOURLY").is_err());
    }

    #[test]
    fn daily_next_after_preserves_local_time() {
        let rule = RecurrenceRule::parse("FREQ=DAILY").unwrap();
        // Anchor: 2025-10-24 08:00 IDT. Israel leaves DST on 2025-10-26;
        // the occurrence after the transition must still be 08:00 local.
        let anchor: DateTime<Utc> = "2025-10-24T05:00:00Z".parse().unwrap();
        let after: DateTime<Utc> = "2025-10-26T12:00:00Z".parse().unwrap();
        let next = rule.next_after(anchor, after, zone()).unwrap();
        let local = next.with_timezone(&zone());
        assert_eq!(local.format("%H:%M").to_string(), "08:00");
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 10, 27).unwrap());
    }

    #[test]
    fn weekly_expansion_between_bounds() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;BYDAY=SU").unwrap();
        let anchor: DateTime<Utc> = "2025-10-05T07:00:00Z".parse().unwrap(); // Sunday 10:00 local
        let from: DateTime<Utc> = "2025-10-01T00:00:00Z".parse().unwrap();
        let to: DateTime<Utc> = "2025-11-01T00:00:00Z".parse().unwrap();
        let occurrences = rule.expand_between(anchor, from, to, zone());
        assert_eq!(occurrences.len(), 4); // Oct 5, 12, 19, 26
        for occ in &occurrences {
            assert_eq!(occ.with_timezone(&zone()).weekday(), Weekday::Sun);
        }
    }

    #[test]
    fn count_caps_occurrences() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;COUNT=3").unwrap();
        let anchor: DateTime<Utc> = "2025-10-05T07:00:00Z".parse().unwrap();
        let to: DateTime<Utc> = "2025-12-01T00:00:00Z".parse().unwrap();
        let occurrences = rule.expand_between(anchor, anchor, to, zone());
        assert_eq!(occurrences.len(), 3);
    }

    #[test]
    fn exdate_skips_excluded_date() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;EXDATE=20251006").unwrap();
        let anchor: DateTime<Utc> = "2025-10-05T07:00:00Z".parse().unwrap();
        let to: DateTime<Utc> = "2025-10-08T00:00:00Z".parse().unwrap();
        let occurrences = rule.expand_between(anchor, anchor, to, zone());
        let dates: Vec<NaiveDate> = occurrences
            .iter()
            .map(|o| o.with_timezone(&zone()).date_naive())
            .collect();
        assert!(!dates.contains(&NaiveDate::from_ymd_opt(2025, 10, 6).unwrap()));
        assert!(dates.contains(&NaiveDate::from_ymd_opt(2025, 10, 7).unwrap()));
    }

    #[test]
    fn monthly_31st_skips_short_months() {
        let rule = RecurrenceRule::parse("FREQ=MONTHLY;BYMONTHDAY=31").unwrap();
        let anchor: DateTime<Utc> = "2026-01-31T10:00:00Z".parse().unwrap();
        let to: DateTime<Utc> = "2026-06-01T00:00:00Z".parse().unwrap();
        let occurrences = rule.expand_between(anchor, anchor, to, zone());
        let months: Vec<u32> = occurrences
            .iter()
            .map(|o| o.with_timezone(&zone()).month())
            .collect();
        assert_eq!(months, vec![1, 3, 5]); // February and April have no 31st
    }

    #[test]
    fn until_bounds_expansion() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20251007T235959Z").unwrap();
        let anchor: DateTime<Utc> = "2025-10-05T07:00:00Z".parse().unwrap();
        let to: DateTime<Utc> = "2025-11-01T00:00:00Z".parse().unwrap();
        let occurrences = rule.expand_between(anchor, anchor, to, zone());
        assert_eq!(occurrences.len(), 3); // Oct 5, 6, 7
    }
}
