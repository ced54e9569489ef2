//! Script-based language detection for the router's language gate.

/// Detected script/language of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedLanguage {
    Hebrew,
    English,
    Arabic,
    Other,
    Gibberish,
}

fn is_hebrew(ch: char) -> bool {
    ('\u{0590}'..='\u{05FF}').contains(&ch)
}

fn is_arabic(ch: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&ch) || ('\u{0750}'..='\u{077F}').contains(&ch)
}

/// Classify `text` by its dominant script.
///
/// A Latin string with essentially no vowels (keyboard mash like "asdfgh")
/// is classified as gibberish rather than English.
pub fn detect_language(text: &str) -> DetectedLanguage {
    let mut hebrew = 0usize;
    let mut arabic = 0usize;
    let mut latin = 0usize;
    let mut other_letters = 0usize;

    for ch in text.chars() {
        if is_hebrew(ch) {
            hebrew += 1;
        } else if is_arabic(ch) {
            arabic += 1;
        } else if ch.is_ascii_alphabetic() {
            latin += 1;
        } else if ch.is_alphabetic() {
            other_letters += 1;
        }
    }

    let letters = hebrew + arabic + latin + other_letters;
    if letters == 0 {
        return DetectedLanguage::Gibberish;
    }

    if hebrew * 2 >= letters {
        return DetectedLanguage::Hebrew;
    }
    if arabic * 2 >= letters {
        return DetectedLanguage::Arabic;
    }
    if latin * 2 >= letters {
        if looks_like_mash(text) {
            return DetectedLanguage::Gibberish;
        }
        return DetectedLanguage::English;
    }
    DetectedLanguage::Other
}

/// Heuristic for Latin keyboard mash: a long token with almost no vowels,
/// or one character repeated throughout.
fn looks_like_mash(text: &str) -> bool {
    let letters: Vec<char> = text
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if letters.len() < 4 {
        return false;
    }
    let vowels = letters
        .iter()
        .filter(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y'))
        .count();
    if (vowels as f64) / (letters.len() as f64) < 0.15 {
        return true;
    }
    let first = letters[0];
    letters.iter().all(|&c| c == first)
}

const GREETINGS: &[&str] = &[
    "שלום", "היי", "הי", "אהלן", "בוקר טוב", "ערב טוב", "hello", "hi", "hey",
    "shalom", "مرحبا", "سلام", "اهلا",
];

/// Whether `text` is a recognized greeting in any supported language.
/// Greetings from unauthenticated senders start the registration flow.
pub fn is_greeting(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    let t = t.trim_end_matches(['!', '.', '?', ',']);
    GREETINGS.iter().any(|g| t == *g || t.starts_with(&format!("{g} ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hebrew_text_detected() {
        assert_eq!(detect_language("קבע פגישה מחר"), DetectedLanguage::Hebrew);
    }

    #[test]
    fn english_text_detected() {
        assert_eq!(
            detect_language("schedule a meeting tomorrow"),
            DetectedLanguage::English
        );
    }

    #[test]
    fn arabic_text_detected() {
        assert_eq!(detect_language("مرحبا كيف حالك"), DetectedLanguage::Arabic);
    }

    #[test]
    fn keyboard_mash_is_gibberish() {
        assert_eq!(detect_language("asdfghjkl"), DetectedLanguage::Gibberish);
        assert_eq!(detect_language("zzzzzzz"), DetectedLanguage::Gibberish);
    }

    #[test]
    fn punctuation_only_is_gibberish() {
        assert_eq!(detect_language("???!!!"), DetectedLanguage::Gibberish);
    }

    #[test]
    fn greetings_recognized() {
        assert!(is_greeting("שלום"));
        assert!(is_greeting("היי!"));
        assert!(is_greeting("Hello"));
        assert!(is_greeting("مرحبا"));
        assert!(!is_greeting("מה יש לי השבוע"));
    }
}
