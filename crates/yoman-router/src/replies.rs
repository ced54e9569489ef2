//! User-visible reply text, Hebrew first with English fallbacks.
//!
//! Replies never expose stack traces, internal identifiers or vendor
//! names.

use yoman_core::types::Language;
use yoman_hebrew::DetectedLanguage;

pub fn welcome_ask_name() -> &'static str {
    "שלום! אני יומן, העוזר האישי שלך 📅\nאיך קוראים לך?"
}

pub fn ask_pin_new() -> &'static str {
    "נעים מאוד! עכשיו בחר קוד PIN בן 4–8 ספרות (ישמש אותך להתחברות):"
}

pub fn bad_pin_format() -> &'static str {
    "הקוד צריך להיות 4–8 ספרות. נסה שוב:"
}

pub fn registered(name: &str) -> String {
    format!("מעולה {name}, נרשמת בהצלחה! 🎉\nשלח /help כדי לראות מה אני יודע לעשות.")
}

pub fn ask_pin_login() -> &'static str {
    "שלום שוב! 🙂 נא להקליד את קוד ה-PIN שלך:"
}

pub fn wrong_pin(remaining: u32) -> String {
    format!("קוד שגוי. נותרו {remaining} ניסיונות.")
}

pub fn locked_out() -> &'static str {
    "החשבון ננעל ל-15 דקות לאחר שלושה ניסיונות שגויים. נסה שוב מאוחר יותר."
}

pub fn login_ok(name: &str) -> String {
    format!("ברוך שובך, {name}! במה אפשר לעזור?")
}

/// One-time invitation, in the sender's detected language.
pub fn invite_register(lang: DetectedLanguage) -> &'static str {
    match lang {
        DetectedLanguage::English => {
            "Hi! I'm Yoman, a Hebrew calendar assistant. Say שלום to get started."
        }
        DetectedLanguage::Arabic => "مرحبا! أنا يومان، مساعد تقويم. أرسل שלום للبدء.",
        _ => "היי! כדי להתחיל, שלח לי שלום 🙂",
    }
}

pub fn menu() -> &'static str {
    "במה אפשר לעזור?\n\
     • קביעת פגישה או אירוע\n\
     • תזכורות\n\
     • משימות\n\
     • \"מה יש לי היום / השבוע?\"\n\
     שלח /help לפירוט מלא."
}

pub fn help(_lang: Language) -> &'static str {
    "אני מבין עברית חופשית. דוגמאות:\n\
     • \"קבע פגישה עם דני מחר ב-15:00\"\n\
     • \"תזכיר לי מחר בבוקר להתקשר לרופא\"\n\
     • \"מה יש לי השבוע?\"\n\
     • \"תוסיף משימה\" / \"מה המשימות שלי?\"\n\
     • \"מחק את הפגישה עם דני\"\n\
     • \"הוסף הערה לפגישה: להביא מסמכים\"\n\n\
     פקודות:\n\
     /menu — תפריט ראשי\n\
     /cancel — ביטול הפעולה הנוכחית\n\
     /help — ההודעה הזו\n\
     /logout — התנתקות"
}

pub fn cancelled() -> &'static str {
    "בוטל. חזרנו לתפריט הראשי."
}

pub fn logged_out() -> &'static str {
    "התנתקת. להתחברות מחדש שלח שלום."
}

pub fn flow_expired() -> &'static str {
    "הפעולה הקודמת פגה מחוסר פעילות, אז חזרנו להתחלה."
}

pub fn throttled() -> &'static str {
    "רגע, לאט יותר 🙏 יותר מדי הודעות בדקה האחרונה. נסה שוב עוד רגע."
}

pub fn generic_error() -> &'static str {
    "משהו השתבש אצלי 😕 נסה שוב, או שלח /menu לחזרה לתפריט."
}

pub fn not_understood() -> &'static str {
    "לא הצלחתי להבין 😅 אפשר לנסח אחרת, או לשלוח /help לדוגמאות."
}

pub fn past_date() -> &'static str {
    "התאריך הזה כבר עבר. נא לציין מועד עתידי."
}

pub fn bad_date() -> &'static str {
    "לא הצלחתי להבין את התאריך. אפשר למשל: מחר ב-15:00, יום ראשון, 11/10."
}

pub fn need_time() -> &'static str {
    "באיזו שעה?"
}

pub fn ask_event_title() -> &'static str {
    "מה שם האירוע?"
}

pub fn ask_event_date() -> &'static str {
    "מתי האירוע? (למשל: מחר ב-15:00, יום ראשון בבוקר, 11/10)"
}

pub fn ask_event_location() -> &'static str {
    "איפה? (או \"דלג\")"
}

pub fn confirm_event(summary: &str) -> String {
    format!("לקבוע את האירוע?\n{summary}\n(כן / לא)")
}

pub fn event_created(summary: &str) -> String {
    format!("נקבע! ✅\n{summary}")
}

pub fn conflict_confirm(overlaps: &[String]) -> String {
    let mut out = String::from("שים לב, יש חפיפה עם:\n");
    for line in overlaps {
        out.push_str(&format!("• {line}\n"));
    }
    out.push_str("לקבוע בכל זאת? (כן / לא)");
    out
}

pub fn ask_reminder_title() -> &'static str {
    "על מה להזכיר לך?"
}

pub fn ask_reminder_date() -> &'static str {
    "מתי להזכיר? (למשל: מחר ב-9:00)"
}

pub fn ask_reminder_recurrence() -> &'static str {
    "האם התזכורת חוזרת? (כל יום / כל יום ראשון / לא)"
}

pub fn confirm_reminder(summary: &str) -> String {
    format!("לקבוע את התזכורת?\n{summary}\n(כן / לא)")
}

pub fn reminder_created(summary: &str) -> String {
    format!("תזכורת נקבעה ⏰\n{summary}")
}

pub fn reminder_fire(title: &str) -> String {
    format!("⏰ תזכורת: {title}")
}

pub fn ask_task_title() -> &'static str {
    "מה המשימה?"
}

pub fn ask_task_details() -> &'static str {
    "פרטים נוספים? (או \"דלג\")"
}

pub fn ask_task_priority() -> &'static str {
    "עדיפות? (דחוף / גבוה / רגיל / נמוך)"
}

pub fn ask_task_due() -> &'static str {
    "עד מתי? (תאריך, או \"אין\")"
}

pub fn confirm_task(summary: &str) -> String {
    format!("להוסיף את המשימה?\n{summary}\n(כן / לא)")
}

pub fn task_created(title: &str) -> String {
    format!("משימה נוספה ✅ {title}")
}

pub fn nothing_found() -> &'static str {
    "לא מצאתי משהו מתאים."
}

pub fn no_events() -> &'static str {
    "אין אירועים ביומן לתקופה הזו 🎈"
}

pub fn no_reminders() -> &'static str {
    "אין תזכורות פעילות."
}

pub fn no_tasks() -> &'static str {
    "אין משימות פתוחות 🎉"
}

pub fn choose_number(max: usize) -> String {
    format!("נא לבחור מספר בין 1 ל-{max}, או /cancel.")
}

pub fn pick_one_to_delete(lines: &[String]) -> String {
    let mut out = String::from("מצאתי כמה אפשרויות. איזה למחוק?\n");
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!("{}. {line}\n", i + 1));
    }
    out.push_str("(שלח מספר, או /cancel)");
    out
}

pub fn confirm_delete(line: &str) -> String {
    format!("למחוק את \"{line}\"? (כן / לא)")
}

pub fn deleted(line: &str) -> String {
    format!("נמחק 🗑️ {line}")
}

pub fn pick_one_to_update(lines: &[String]) -> String {
    let mut out = String::from("איזה אירוע לעדכן?\n");
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!("{}. {line}\n", i + 1));
    }
    out.push_str("(שלח מספר, או /cancel)");
    out
}

pub fn ask_update_field() -> &'static str {
    "מה לעדכן? (כותרת / תאריך / שעה / מיקום)"
}

pub fn ask_update_value(field: &str) -> String {
    format!("מה הערך החדש עבור {field}?")
}

pub fn updated(summary: &str) -> String {
    format!("עודכן ✅\n{summary}")
}

pub fn comment_added(event_title: &str) -> String {
    format!("ההערה נוספה לאירוע \"{event_title}\" 📝")
}

pub fn comment_deleted() -> &'static str {
    "ההערה נמחקה."
}

pub fn comment_ambiguous(options: &[String]) -> String {
    let mut out = String::from("יש כמה הערות דומות:\n");
    for line in options {
        out.push_str(&format!("• {line}\n"));
    }
    out.push_str("נא לדייק יותר.");
    out
}

pub fn no_comments(event_title: &str) -> String {
    format!("אין הערות לאירוע \"{event_title}\".")
}

pub fn clarify(labels: &[String]) -> String {
    let mut out = String::from("לא בטוח שהבנתי. למה התכוונת?\n");
    for (i, label) in labels.iter().enumerate() {
        out.push_str(&format!("{}. {label}\n", i + 1));
    }
    out.push_str("(שלח מספר, או /cancel)");
    out
}

pub fn intent_label(intent: yoman_nlu::Intent) -> &'static str {
    use yoman_nlu::Intent;
    match intent {
        Intent::CreateEvent => "לקבוע אירוע חדש",
        Intent::CreateReminder => "לקבוע תזכורת",
        Intent::CreateTask => "להוסיף משימה",
        Intent::ListEvents => "להציג את האירועים שלך",
        Intent::ListReminders => "להציג את התזכורות שלך",
        Intent::ListTasks => "להציג את המשימות שלך",
        Intent::SearchEvent => "לחפש אירוע",
        Intent::UpdateEvent => "לעדכן אירוע",
        Intent::UpdateReminder => "לעדכן תזכורת",
        Intent::DeleteEvent => "למחוק אירוע",
        Intent::DeleteReminder => "למחוק תזכורת",
        Intent::AddComment => "להוסיף הערה לאירוע",
        Intent::ViewComments => "להציג הערות",
        Intent::DeleteComment => "למחוק הערה",
        Intent::GenerateDashboard => "לקבל קישור ללוח",
        Intent::Help => "עזרה",
        Intent::Unknown => "משהו אחר",
    }
}

pub fn dashboard_link(url: &str) -> String {
    format!("הנה קישור ללוח האישי שלך (תקף ל-15 דקות):\n{url}")
}

pub fn morning_greeting(name: &str) -> String {
    format!("בוקר טוב, {name}! ☀️")
}

pub fn yes(text: &str) -> bool {
    matches!(
        text.trim(),
        "כן" | "כן." | "אישור" | "בטח" | "יאללה" | "yes" | "y" | "ok" | "אוקיי" | "👍"
    )
}

pub fn no(text: &str) -> bool {
    matches!(text.trim(), "לא" | "לא." | "ביטול" | "no" | "n" | "👎")
}

pub fn skip(text: &str) -> bool {
    matches!(text.trim(), "דלג" | "-" | "אין" | "skip" | "none")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_no_skip_parsing() {
        assert!(yes("כן"));
        assert!(yes(" yes "));
        assert!(no("לא"));
        assert!(skip("דלג"));
        assert!(!yes("אולי"));
        assert!(!no("כן"));
    }

    #[test]
    fn clarify_numbers_candidates() {
        let text = clarify(&["לקבוע אירוע חדש".to_string(), "למחוק אירוע".to_string()]);
        assert!(text.contains("1. לקבוע אירוע חדש"));
        assert!(text.contains("2. למחוק אירוע"));
    }
}
