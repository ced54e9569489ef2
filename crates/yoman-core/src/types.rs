use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a user (UUIDv7 — time-sortable for easier log
/// correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A phone number in canonical E.164 form (`+` followed by digits).
///
/// All auth state and transport addressing is keyed on this form, so the
/// same sender always resolves to the same record regardless of how the
/// transport formats the number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Phone(String);

impl Phone {
    /// Normalize a raw phone string: strip separators, map a leading `00`
    /// or a bare local `0` (Israeli convention) to a country code.
    pub fn normalize(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        let canonical = if raw.trim_start().starts_with('+') {
            digits
        } else if let Some(rest) = digits.strip_prefix("00") {
            rest.to_string()
        } else if let Some(rest) = digits.strip_prefix('0') {
            // Local Israeli number, e.g. 054-1234567 → +972541234567.
            format!("972{rest}")
        } else {
            digits
        };
        if canonical.len() < 8 || canonical.len() > 15 {
            return None;
        }
        Some(Self(format!("+{canonical}")))
    }

    /// Wrap an already-canonical stored value (database round-trip).
    pub fn from_stored(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User interface language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    He,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::He => "he",
            Language::En => "en",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "he" => Ok(Language::He),
            "en" => Ok(Language::En),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// Preferred part of day used when a user message names no explicit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    /// Default local hour for the slot.
    pub fn default_hour(&self) -> u32 {
        match self {
            TimeOfDay::Morning => 9,
            TimeOfDay::Afternoon => 14,
            TimeOfDay::Evening => 19,
        }
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "morning" => Ok(TimeOfDay::Morning),
            "afternoon" => Ok(TimeOfDay::Afternoon),
            "evening" => Ok(TimeOfDay::Evening),
            other => Err(format!("unknown time of day: {other}")),
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
        };
        write!(f, "{s}")
    }
}

/// Generate a fresh UUIDv7 row identifier.
pub fn new_row_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_normalizes_local_israeli_number() {
        let p = Phone::normalize("054-123-4567").expect("valid");
        assert_eq!(p.as_str(), "+972541234567");
    }

    #[test]
    fn phone_keeps_e164_input() {
        let p = Phone::normalize("+972541234567").expect("valid");
        assert_eq!(p.as_str(), "+972541234567");
    }

    #[test]
    fn phone_strips_double_zero_prefix() {
        let p = Phone::normalize("00972541234567").expect("valid");
        assert_eq!(p.as_str(), "+972541234567");
    }

    #[test]
    fn phone_rejects_garbage() {
        assert!(Phone::normalize("abc").is_none());
        assert!(Phone::normalize("12").is_none());
    }
}
