//! Free-text Hebrew/English date and time parsing.
//!
//! The parser is anchored on the caller's "now" and user zone; it never
//! consults the wall clock. Output instants are UTC; the `description`
//! echoes the resolved moment in the user zone.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{HebrewError, Result};

/// Resolved date expression: either a single instant or a half-open range.
#[derive(Debug, Clone, PartialEq)]
pub struct DateQuery {
    pub instant_utc: Option<DateTime<Utc>>,
    pub range_start_utc: Option<DateTime<Utc>>,
    pub range_end_utc: Option<DateTime<Utc>>,
    pub is_week_range: bool,
    pub is_month_range: bool,
    /// Human-readable echo in the user zone.
    pub description: String,
}

impl DateQuery {
    fn instant(at: DateTime<Utc>, zone: Tz) -> Self {
        Self {
            instant_utc: Some(at),
            range_start_utc: None,
            range_end_utc: None,
            is_week_range: false,
            is_month_range: false,
            description: at.with_timezone(&zone).format("%d/%m/%Y %H:%M").to_string(),
        }
    }

    fn day_range(date: NaiveDate, zone: Tz) -> Self {
        let start = local_to_utc(date, NaiveTime::MIN, zone);
        Self {
            instant_utc: None,
            range_start_utc: Some(start),
            range_end_utc: Some(local_to_utc(date + Duration::days(1), NaiveTime::MIN, zone)),
            is_week_range: false,
            is_month_range: false,
            description: date.format("%d/%m/%Y").to_string(),
        }
    }

    /// The local calendar date this query points at, if any.
    pub fn local_date(&self, zone: Tz) -> Option<NaiveDate> {
        if let Some(at) = self.instant_utc {
            return Some(at.with_timezone(&zone).date_naive());
        }
        self.range_start_utc
            .map(|s| s.with_timezone(&zone).date_naive())
    }

    pub fn is_range(&self) -> bool {
        self.range_start_utc.is_some()
    }
}

/// Convert a local date+time in `zone` to UTC, taking the earliest valid
/// instant across DST gaps.
fn local_to_utc(date: NaiveDate, time: NaiveTime, zone: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    zone.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| zone.from_utc_datetime(&naive))
        .with_timezone(&Utc)
}

fn sunday_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// Weekday names, index 0 = Sunday (Israeli week anchor).
const WEEKDAYS_HE: &[&str] = &["ראשון", "שני", "שלישי", "רביעי", "חמישי", "שישי", "שבת"];
const WEEKDAYS_EN: &[&str] = &[
    "sunday", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday",
];

/// Hebrew number words for hours 1–12.
const HOUR_WORDS: &[(&str, u32)] = &[
    ("אחת עשרה", 11),
    ("שתים עשרה", 12),
    ("שתיים עשרה", 12),
    ("אחת", 1),
    ("שתיים", 2),
    ("שתים", 2),
    ("שלוש", 3),
    ("ארבע", 4),
    ("חמש", 5),
    ("שש", 6),
    ("שבע", 7),
    ("שמונה", 8),
    ("תשע", 9),
    ("עשר", 10),
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum DayPeriod {
    Morning,
    Noon,
    Afternoon,
    Evening,
    Night,
}

impl DayPeriod {
    fn apply(&self, hour: u32) -> u32 {
        match self {
            DayPeriod::Morning => hour,
            DayPeriod::Noon => {
                if hour == 12 {
                    12
                } else {
                    hour + 12
                }
            }
            DayPeriod::Afternoon | DayPeriod::Evening | DayPeriod::Night => {
                if hour < 12 {
                    hour + 12
                } else {
                    hour
                }
            }
        }
    }
}

fn period_at(text: &str) -> Option<(DayPeriod, &'static str)> {
    // Longest phrases first so "אחרי הצהריים" wins over "צהריים".
    const PERIODS: &[(&str, DayPeriod)] = &[
        ("אחרי הצהריים", DayPeriod::Afternoon),
        ("אחר הצהריים", DayPeriod::Afternoon),
        ("אחה\"צ", DayPeriod::Afternoon),
        ("בצהריים", DayPeriod::Noon),
        ("צהריים", DayPeriod::Noon),
        ("בבוקר", DayPeriod::Morning),
        ("בוקר", DayPeriod::Morning),
        ("בערב", DayPeriod::Evening),
        ("ערב", DayPeriod::Evening),
        ("בלילה", DayPeriod::Night),
        ("לילה", DayPeriod::Night),
    ];
    for (phrase, period) in PERIODS {
        if text.contains(phrase) {
            return Some((*period, phrase));
        }
    }
    None
}

struct Extraction {
    date: Option<NaiveDate>,
    date_explicit: bool,
    time: Option<NaiveTime>,
}

fn blank_out(text: &mut String, start: usize, end: usize) {
    let replacement: String = text[start..end].chars().map(|_| ' ').collect();
    text.replace_range(start..end, &replacement);
}

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

/// Parse a free Hebrew/English date-time expression.
///
/// Returns `UnrecognizedDate` when neither a date nor a time token is
/// found. Past moments (e.g. `אתמול`) are returned with no error — the
/// caller decides whether to reject them.
pub fn parse_date_query(text: &str, zone: Tz, now_utc: DateTime<Utc>) -> Result<DateQuery> {
    let now_local = now_utc.with_timezone(&zone);
    let today = now_local.date_naive();
    let mut work = text.trim().to_lowercase();

    if let Some(range) = extract_range(&work, today, zone)? {
        return Ok(range);
    }

    let mut ex = Extraction {
        date: None,
        date_explicit: false,
        time: None,
    };

    extract_explicit_date(&mut work, today, &mut ex)?;
    extract_date_keyword(&mut work, today, &mut ex);
    extract_relative_days(&mut work, today, &mut ex)?;
    extract_weekday(&mut work, today, &mut ex);
    extract_clock_time(&mut work, &mut ex)?;
    extract_word_time(&mut work, &mut ex);
    extract_bare_number(&mut work, today, &mut ex)?;

    match (ex.date, ex.time) {
        (Some(date), Some(time)) => Ok(DateQuery::instant(local_to_utc(date, time, zone), zone)),
        (Some(date), None) => Ok(DateQuery::day_range(date, zone)),
        (None, Some(time)) => {
            // Time-only: today, rolling to tomorrow once the moment passed.
            let mut at = local_to_utc(today, time, zone);
            if at <= now_utc {
                at = local_to_utc(today + Duration::days(1), time, zone);
            }
            Ok(DateQuery::instant(at, zone))
        }
        (None, None) => Err(HebrewError::UnrecognizedDate(text.to_string())),
    }
}

fn extract_range(text: &str, today: NaiveDate, zone: Tz) -> Result<Option<DateQuery>> {
    let week_start = sunday_of_week(today);
    let start = if text.contains("שבוע הבא") || text.contains("next week") {
        Some(week_start + Duration::days(7))
    } else if text.contains("השבוע")
        || text.contains("בשבוע")
        || text.contains("this week")
        || text.split_whitespace().any(|t| t == "שבוע")
    {
        Some(week_start)
    } else {
        None
    };

    if let Some(start) = start {
        let end = start + Duration::days(7);
        return Ok(Some(DateQuery {
            instant_utc: None,
            range_start_utc: Some(local_to_utc(start, NaiveTime::MIN, zone)),
            range_end_utc: Some(local_to_utc(end, NaiveTime::MIN, zone)),
            is_week_range: true,
            is_month_range: false,
            description: format!(
                "{} – {}",
                start.format("%d/%m/%Y"),
                (end - Duration::days(1)).format("%d/%m/%Y")
            ),
        }));
    }

    let month_start = if text.contains("חודש הבא") || text.contains("next month") {
        Some(first_of_next_month(today))
    } else if text.contains("החודש") || text.contains("בחודש") || text.contains("this month") {
        Some(NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap())
    } else {
        None
    };

    if let Some(start) = month_start {
        let end = first_of_next_month(start);
        return Ok(Some(DateQuery {
            instant_utc: None,
            range_start_utc: Some(local_to_utc(start, NaiveTime::MIN, zone)),
            range_end_utc: Some(local_to_utc(end, NaiveTime::MIN, zone)),
            is_week_range: false,
            is_month_range: true,
            description: start.format("%m/%Y").to_string(),
        }));
    }

    Ok(None)
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1).unwrap()
    }
}

fn extract_explicit_date(work: &mut String, today: NaiveDate, ex: &mut Extraction) -> Result<()> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let rex = re(&RE, r"(\d{1,2})[./\-](\d{1,2})(?:[./\-](\d{2,4}))?");

    let Some(caps) = rex.captures(work) else {
        return Ok(());
    };
    let m = caps.get(0).unwrap();
    let day: u32 = caps[1].parse().unwrap_or(0);
    let month: u32 = caps[2].parse().unwrap_or(0);
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return Ok(());
    }

    let date = match caps.get(3) {
        Some(y) => {
            let mut year: i32 = y.as_str().parse().unwrap_or(0);
            if year < 100 {
                year += 2000;
            }
            NaiveDate::from_ymd_opt(year, month, day)
                .ok_or_else(|| HebrewError::OutOfRange(format!("{day}/{month}/{year}")))?
        }
        None => {
            // Year omitted: next occurrence on or after today.
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(d) if d >= today => d,
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day)
                    .ok_or_else(|| HebrewError::OutOfRange(format!("{day}/{month}")))?,
            }
        }
    };

    let (start, end) = (m.start(), m.end());
    blank_out(work, start, end);
    ex.date = Some(date);
    ex.date_explicit = true;
    Ok(())
}

fn extract_date_keyword(work: &mut String, today: NaiveDate, ex: &mut Extraction) {
    if ex.date.is_some() {
        return;
    }
    const KEYWORDS: &[(&str, i64)] = &[
        ("מחרתיים", 2),
        ("מחר", 1),
        ("אתמול", -1),
        ("היום", 0),
        ("tomorrow", 1),
        ("yesterday", -1),
        ("today", 0),
    ];
    for (kw, offset) in KEYWORDS {
        if let Some(pos) = work.find(kw) {
            ex.date = Some(today + Duration::days(*offset));
            ex.date_explicit = true;
            blank_out(work, pos, pos + kw.len());
            return;
        }
    }
}

fn extract_relative_days(work: &mut String, today: NaiveDate, ex: &mut Extraction) -> Result<()> {
    if ex.date.is_some() {
        return Ok(());
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let rex = re(
        &RE,
        r"(?:עוד|בעוד|in)\s+(\d{1,3})\s+(?:ימים|יום|days?)",
    );
    let Some(caps) = rex.captures(work) else {
        return Ok(());
    };
    let n: i64 = caps[1].parse().unwrap_or(0);
    if !(0..=365).contains(&n) {
        return Err(HebrewError::OutOfRange(format!("{n} days")));
    }
    let m = caps.get(0).unwrap();
    let (start, end) = (m.start(), m.end());
    blank_out(work, start, end);
    ex.date = Some(today + Duration::days(n));
    ex.date_explicit = true;
    Ok(())
}

fn extract_weekday(work: &mut String, today: NaiveDate, ex: &mut Extraction) {
    if ex.date.is_some() {
        return;
    }
    static RE_HE: OnceLock<Regex> = OnceLock::new();
    let rex = re(
        &RE_HE,
        r"(?:ביום\s+|יום\s+|ימי\s+|ב)?(ראשון|שלישי|שני|רביעי|חמישי|שישי|שבת)(\s+(?:הקרוב|הבא))?",
    );

    let (target, forced_next, span) = if let Some(caps) = rex.captures(work) {
        let name = caps.get(1).unwrap().as_str();
        let idx = WEEKDAYS_HE.iter().position(|w| *w == name).unwrap();
        let m = caps.get(0).unwrap();
        (Some(idx), caps.get(2).is_some(), Some((m.start(), m.end())))
    } else {
        static RE_EN: OnceLock<Regex> = OnceLock::new();
        let rex_en = re(
            &RE_EN,
            r"(next\s+)?(sunday|monday|tuesday|wednesday|thursday|friday|saturday)",
        );
        if let Some(caps) = rex_en.captures(work) {
            let name = caps.get(2).unwrap().as_str();
            let idx = WEEKDAYS_EN.iter().position(|w| *w == name).unwrap();
            let m = caps.get(0).unwrap();
            (Some(idx), caps.get(1).is_some(), Some((m.start(), m.end())))
        } else {
            (None, false, None)
        }
    };

    let Some(target) = target else { return };
    let today_dow = today.weekday().num_days_from_sunday() as i64;
    let mut ahead = (target as i64 - today_dow).rem_euclid(7);
    if ahead == 0 && forced_next {
        ahead = 7;
    }
    let (start, end) = span.unwrap();
    blank_out(work, start, end);
    ex.date = Some(today + Duration::days(ahead));
    ex.date_explicit = true;
}

/// Small "marked" hours (ב-3, לשעה 5) read as afternoon: Hebrew speakers
/// saying "at 3" overwhelmingly mean 15:00. Hours ≥ 8 are left as spoken.
fn resolve_marked_hour(hour: u32) -> u32 {
    if (1..=7).contains(&hour) {
        hour + 12
    } else {
        hour
    }
}

fn extract_clock_time(work: &mut String, ex: &mut Extraction) -> Result<()> {
    // HH:MM is unambiguous and wins over every other time form.
    static RE_HM: OnceLock<Regex> = OnceLock::new();
    let rex = re(&RE_HM, r"(\d{1,2}):(\d{2})");
    if let Some(caps) = rex.captures(work) {
        let h: u32 = caps[1].parse().unwrap_or(99);
        let m: u32 = caps[2].parse().unwrap_or(99);
        if h >= 24 || m >= 60 {
            return Err(HebrewError::OutOfRange(format!("{h}:{m:02}")));
        }
        let mat = caps.get(0).unwrap();
        let (start, end) = (mat.start(), mat.end());
        blank_out(work, start, end);
        ex.time = NaiveTime::from_hms_opt(h, m, 0);
        return Ok(());
    }

    // Prefixed bare hour: "ב-3", "ב 21", "לשעה 5", "at 9".
    static RE_PREFIX: OnceLock<Regex> = OnceLock::new();
    let rex = re(
        &RE_PREFIX,
        r"(?:^|\s)(?:לשעה\s*|בשעה\s*|ל\s|ב[-\s]?|at\s)(\d{1,2})(?:\s|$)",
    );
    if let Some(caps) = rex.captures(work) {
        let h: u32 = caps[1].parse().unwrap_or(99);
        if h < 24 {
            let mat = caps.get(0).unwrap();
            let (start, end) = (mat.start(), mat.end());
            blank_out(work, start, end);
            let h = resolve_marked_hour(h);
            ex.time = NaiveTime::from_hms_opt(h, 0, 0);
        }
    }
    Ok(())
}

fn extract_word_time(work: &mut String, ex: &mut Extraction) {
    let period = period_at(work);

    if ex.time.is_none() {
        for (word, hour) in HOUR_WORDS {
            if let Some(pos) = work.find(word) {
                let half = work.contains("וחצי");
                let hour = match period {
                    Some((p, _)) => p.apply(*hour),
                    None => resolve_marked_hour(*hour),
                };
                blank_out(work, pos, pos + word.len());
                ex.time = NaiveTime::from_hms_opt(hour, if half { 30 } else { 0 }, 0);
                break;
            }
        }
    }

    if let Some((p, phrase)) = period {
        if let Some(pos) = work.find(phrase) {
            blank_out(work, pos, pos + phrase.len());
        }
        // Period word alone ("מחר בערב") falls back to the slot default.
        if ex.time.is_none() {
            let hour = match p {
                DayPeriod::Morning => 9,
                DayPeriod::Noon => 12,
                DayPeriod::Afternoon => 14,
                DayPeriod::Evening => 19,
                DayPeriod::Night => 21,
            };
            ex.time = NaiveTime::from_hms_opt(hour, 0, 0);
        }
    }
}

fn extract_bare_number(work: &mut String, today: NaiveDate, ex: &mut Extraction) -> Result<()> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let rex = re(&RE, r"(?:^|\s)(\d{1,2})(?:\s|$)");
    let Some(caps) = rex.captures(work) else {
        return Ok(());
    };
    let n: u32 = caps[1].parse().unwrap_or(99);
    let mat = caps.get(0).unwrap();
    let (start, end) = (mat.start(), mat.end());

    if (24..=31).contains(&n) && ex.date.is_none() {
        // Day-of-month reading: the current month, or the next one when the
        // day already passed.
        let candidate = NaiveDate::from_ymd_opt(today.year(), today.month(), n);
        let date = match candidate {
            Some(d) if d >= today => d,
            _ => {
                let next = first_of_next_month(today);
                NaiveDate::from_ymd_opt(next.year(), next.month(), n)
                    .ok_or_else(|| HebrewError::OutOfRange(format!("day {n}")))?
            }
        };
        blank_out(work, start, end);
        ex.date = Some(date);
        ex.date_explicit = true;
    } else if n < 24 && ex.time.is_none() {
        blank_out(work, start, end);
        let hour = if ex.date_explicit { resolve_marked_hour(n) } else { n };
        ex.time = NaiveTime::from_hms_opt(hour, 0, 0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Tz {
        chrono_tz::Asia::Jerusalem
    }

    /// Friday 2025-10-10 10:00 Asia/Jerusalem (07:00 UTC, IDT = UTC+3).
    fn now() -> DateTime<Utc> {
        "2025-10-10T07:00:00Z".parse().unwrap()
    }

    #[test]
    fn tomorrow_with_marked_small_hour() {
        let q = parse_date_query("מחר ב-3", zone(), now()).unwrap();
        assert_eq!(
            q.instant_utc.unwrap().to_rfc3339(),
            "2025-10-11T12:00:00+00:00"
        );
        assert!(q.description.contains("11/10/2025 15:00"));
    }

    #[test]
    fn tomorrow_is_next_day_regardless_of_hour() {
        for hour in [0, 5, 12, 23] {
            let at = format!("2025-10-10T{hour:02}:00:00+03:00")
                .parse::<DateTime<Utc>>()
                .unwrap();
            let q = parse_date_query("מחר", zone(), at).unwrap();
            assert_eq!(q.local_date(zone()).unwrap().day(), 11, "hour {hour}");
        }
    }

    #[test]
    fn prefixed_hour_21_is_evening_today() {
        let q = parse_date_query("ב 21", zone(), now()).unwrap();
        assert_eq!(
            q.instant_utc.unwrap().to_rfc3339(),
            "2025-10-10T18:00:00+00:00"
        );
    }

    #[test]
    fn bare_21_is_a_time_not_a_date() {
        let q = parse_date_query("21", zone(), now()).unwrap();
        assert_eq!(
            q.instant_utc.unwrap().to_rfc3339(),
            "2025-10-10T18:00:00+00:00"
        );
    }

    #[test]
    fn bare_25_is_a_day_of_month() {
        let q = parse_date_query("25", zone(), now()).unwrap();
        assert_eq!(
            q.local_date(zone()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 25).unwrap()
        );
    }

    #[test]
    fn bare_small_hour_rolls_to_tomorrow_when_past() {
        // Now is 10:00 local; "8" reads as 08:00 which already passed.
        let q = parse_date_query("8", zone(), now()).unwrap();
        assert_eq!(
            q.instant_utc.unwrap().to_rfc3339(),
            "2025-10-11T05:00:00+00:00"
        );
    }

    #[test]
    fn noon_is_never_midnight() {
        let q = parse_date_query("מחר 12:00", zone(), now()).unwrap();
        let local = q.instant_utc.unwrap().with_timezone(&zone());
        assert_eq!(local.format("%H:%M").to_string(), "12:00");
    }

    #[test]
    fn current_week_is_sunday_anchored() {
        let q = parse_date_query("מה יש לי השבוע?", zone(), now()).unwrap();
        assert!(q.is_week_range);
        assert_eq!(
            q.range_start_utc.unwrap().to_rfc3339(),
            "2025-10-04T21:00:00+00:00"
        );
        assert_eq!(
            q.range_end_utc.unwrap().to_rfc3339(),
            "2025-10-11T21:00:00+00:00"
        );
    }

    #[test]
    fn next_week_starts_following_sunday() {
        let q = parse_date_query("שבוע הבא", zone(), now()).unwrap();
        assert_eq!(
            q.range_start_utc.unwrap().to_rfc3339(),
            "2025-10-11T21:00:00+00:00"
        );
    }

    #[test]
    fn current_month_range() {
        let q = parse_date_query("מה יש לי החודש", zone(), now()).unwrap();
        assert!(q.is_month_range);
        assert_eq!(
            q.local_date(zone()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()
        );
    }

    #[test]
    fn weekday_next_occurrence() {
        // Now is Friday; "ביום שני" is Monday 13/10.
        let q = parse_date_query("ביום שני", zone(), now()).unwrap();
        assert_eq!(
            q.local_date(zone()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 13).unwrap()
        );
    }

    #[test]
    fn same_weekday_with_suffix_skips_to_next_week() {
        // Now is Friday; "שישי הבא" must not resolve to today.
        let q = parse_date_query("שישי הבא", zone(), now()).unwrap();
        assert_eq!(
            q.local_date(zone()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 17).unwrap()
        );
    }

    #[test]
    fn explicit_date_without_year_rolls_forward() {
        // 05/10 already passed (today is 10/10) → next year.
        let q = parse_date_query("05/10", zone(), now()).unwrap();
        assert_eq!(
            q.local_date(zone()).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 5).unwrap()
        );
    }

    #[test]
    fn explicit_date_with_year_and_time() {
        let q = parse_date_query("11/10/2025 15:00", zone(), now()).unwrap();
        assert_eq!(
            q.instant_utc.unwrap().to_rfc3339(),
            "2025-10-11T12:00:00+00:00"
        );
    }

    #[test]
    fn dotted_date_format() {
        let q = parse_date_query("11.10.2025", zone(), now()).unwrap();
        assert_eq!(
            q.local_date(zone()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 11).unwrap()
        );
    }

    #[test]
    fn relative_days_offset() {
        let q = parse_date_query("עוד 3 ימים", zone(), now()).unwrap();
        assert_eq!(
            q.local_date(zone()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 13).unwrap()
        );
    }

    #[test]
    fn relative_days_out_of_range_rejected() {
        assert!(parse_date_query("עוד 400 ימים", zone(), now()).is_err());
    }

    #[test]
    fn word_time_evening() {
        let q = parse_date_query("מחר שמונה בערב", zone(), now()).unwrap();
        let local = q.instant_utc.unwrap().with_timezone(&zone());
        assert_eq!(local.format("%H:%M").to_string(), "20:00");
    }

    #[test]
    fn word_time_afternoon() {
        let q = parse_date_query("שלוש אחרי הצהריים", zone(), now()).unwrap();
        let local = q.instant_utc.unwrap().with_timezone(&zone());
        assert_eq!(local.format("%H:%M").to_string(), "15:00");
    }

    #[test]
    fn yesterday_is_returned_as_past() {
        let q = parse_date_query("אתמול", zone(), now()).unwrap();
        assert_eq!(
            q.local_date(zone()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 9).unwrap()
        );
    }

    #[test]
    fn unrecognized_text_is_an_error() {
        assert!(parse_date_query("סתם טקסט", zone(), now()).is_err());
    }
}
