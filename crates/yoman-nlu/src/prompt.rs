//! Structured prompt construction for the NLU models.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Context the router hands to the ensemble for one classification.
#[derive(Debug, Clone)]
pub struct ClassifyContext {
    pub now_utc: DateTime<Utc>,
    pub zone: Tz,
    /// Up to 3 recent turns, oldest first, as (role, text).
    pub history: Vec<(String, String)>,
    /// The user's known contact names.
    pub contacts: Vec<String>,
}

/// Rendered prompt sent to every model slot.
#[derive(Debug, Clone)]
pub struct NluPrompt {
    pub system: String,
    pub user: String,
}

const SYSTEM_INSTRUCTIONS: &str = r#"אתה מנתח הודעות בעברית עבור עוזר יומן אישי.
החזר אך ורק אובייקט JSON יחיד, ללא טקסט נוסף, במבנה:
{
  "intent": one of [create_event, create_reminder, create_task, list_events,
            list_reminders, list_tasks, search_event, update_event,
            update_reminder, delete_event, delete_reminder, add_comment,
            view_comments, delete_comment, generate_dashboard, help, unknown],
  "confidence": number in [0,1],
  "event":    {"title", "date_text", "date_iso", "time", "duration_minutes",
               "location", "contact_name", "delete_all", "recurrence_text"},
  "reminder": {"title", "date_text", "date_iso", "time", "lead_time_minutes",
               "recurrence_text"},
  "comment":  {"event_title", "text", "priority", "reminder_time",
               "delete_by", "delete_value"}
}
השאר שדות שלא הוזכרו בהודעה כ-null. אל תמציא תאריכים: העתק את ביטוי
הזמן כפי שנכתב אל date_text. title הוא תיאור הפעילות בלבד, בלי מילות
הזמן. אם ההודעה מזכירה איש קשר מהרשימה, מלא contact_name.
ל-create_task ו-list_tasks אין אובייקט ישויות — פרטי המשימה נאספים
בהמשך השיחה."#;

/// Build the single structured prompt shared by all model slots.
pub fn build_prompt(text: &str, ctx: &ClassifyContext) -> NluPrompt {
    let local = ctx.now_utc.with_timezone(&ctx.zone);
    let mut user = format!(
        "התאריך והשעה כעת: {} ({})\n",
        local.format("%d/%m/%Y %H:%M"),
        local.format("%A")
    );

    if !ctx.contacts.is_empty() {
        user.push_str(&format!("אנשי קשר ידועים: {}\n", ctx.contacts.join(", ")));
    }

    if !ctx.history.is_empty() {
        user.push_str("שיחה אחרונה:\n");
        for (role, turn) in &ctx.history {
            user.push_str(&format!("[{role}] {turn}\n"));
        }
    }

    user.push_str(&format!("\nההודעה לניתוח: {text}"));

    NluPrompt {
        system: SYSTEM_INSTRUCTIONS.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ClassifyContext {
        ClassifyContext {
            now_utc: "2025-10-10T07:00:00Z".parse().unwrap(),
            zone: chrono_tz::Asia::Jerusalem,
            history: vec![("user".into(), "מה יש לי מחר".into())],
            contacts: vec!["דני".into(), "דנה".into()],
        }
    }

    #[test]
    fn prompt_carries_local_now() {
        let p = build_prompt("קבע פגישה", &ctx());
        assert!(p.user.contains("10/10/2025 10:00"));
    }

    #[test]
    fn prompt_carries_contacts_and_history() {
        let p = build_prompt("קבע פגישה", &ctx());
        assert!(p.user.contains("דני, דנה"));
        assert!(p.user.contains("מה יש לי מחר"));
        assert!(p.user.contains("ההודעה לניתוח: קבע פגישה"));
    }

    #[test]
    fn system_lists_every_intent() {
        for intent in [
            "create_event",
            "create_task",
            "list_tasks",
            "delete_reminder",
            "generate_dashboard",
            "unknown",
        ] {
            assert!(SYSTEM_INSTRUCTIONS.contains(intent), "missing {intent}");
        }
    }
}
