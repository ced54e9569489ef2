use std::sync::Mutex;

use rusqlite::Connection;
use tracing::warn;

use yoman_core::types::{new_row_id, UserId};

/// One model's observation for the comparison row.
#[derive(Debug, Clone)]
pub struct ModelObservation {
    pub model: String,
    pub intent: String,
    pub confidence: f64,
    pub response_time_ms: i64,
}

/// Shadow-mode comparison log: records every model's verdict per ensemble
/// invocation. Purely observational — nothing user-visible depends on it.
pub struct ComparisonLog {
    db: Mutex<Connection>,
}

impl ComparisonLog {
    pub fn new(conn: Connection) -> Result<Self, rusqlite::Error> {
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Append one comparison row. Failures are logged and swallowed — the
    /// shadow log must never affect the user-facing path.
    pub fn log(
        &self,
        user_id: &UserId,
        message_text: &str,
        observations: &[ModelObservation],
        created_at: chrono::DateTime<chrono::Utc>,
    ) {
        let intent_match = observations.len() > 1
            && observations
                .windows(2)
                .all(|w| w[0].intent == w[1].intent);
        let confidence_diff = match observations.len() {
            0 | 1 => 0.0,
            _ => {
                let max = observations.iter().map(|o| o.confidence).fold(0.0, f64::max);
                let min = observations
                    .iter()
                    .map(|o| o.confidence)
                    .fold(f64::INFINITY, f64::min);
                max - min
            }
        };

        let slot = |i: usize| observations.get(i);
        let db = self.db.lock().unwrap();
        let result = db.execute(
            "INSERT INTO nlp_comparisons
             (id, user_id, message_text,
              model_a, intent_a, confidence_a, response_time_ms_a,
              model_b, intent_b, confidence_b, response_time_ms_b,
              model_c, intent_c, confidence_c, response_time_ms_c,
              intent_match, confidence_diff, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            rusqlite::params![
                new_row_id(),
                user_id.as_str(),
                message_text,
                slot(0).map(|o| o.model.clone()),
                slot(0).map(|o| o.intent.clone()),
                slot(0).map(|o| o.confidence),
                slot(0).map(|o| o.response_time_ms),
                slot(1).map(|o| o.model.clone()),
                slot(1).map(|o| o.intent.clone()),
                slot(1).map(|o| o.confidence),
                slot(1).map(|o| o.response_time_ms),
                slot(2).map(|o| o.model.clone()),
                slot(2).map(|o| o.intent.clone()),
                slot(2).map(|o| o.confidence),
                slot(2).map(|o| o.response_time_ms),
                intent_match as i64,
                confidence_diff,
                created_at.to_rfc3339(),
            ],
        );
        if let Err(e) = result {
            warn!(error = %e, "failed to write nlp comparison row");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(model: &str, intent: &str, confidence: f64) -> ModelObservation {
        ModelObservation {
            model: model.to_string(),
            intent: intent.to_string(),
            confidence,
            response_time_ms: 120,
        }
    }

    #[test]
    fn logs_match_flag_and_diff() {
        let log = ComparisonLog::new(Connection::open_in_memory().unwrap()).unwrap();
        let uid = UserId::from("u-1");
        let now = "2025-10-10T07:00:00Z".parse().unwrap();

        log.log(
            &uid,
            "קבע פגישה",
            &[
                obs("a", "create_event", 0.9),
                obs("b", "create_event", 0.8),
                obs("c", "create_reminder", 0.7),
            ],
            now,
        );

        let db = log.db.lock().unwrap();
        let (matched, diff): (i64, f64) = db
            .query_row(
                "SELECT intent_match, confidence_diff FROM nlp_comparisons",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(matched, 0);
        assert!((diff - 0.2).abs() < 1e-9);
    }

    #[test]
    fn two_model_row_leaves_third_slot_null() {
        let log = ComparisonLog::new(Connection::open_in_memory().unwrap()).unwrap();
        let uid = UserId::from("u-1");
        let now = "2025-10-10T07:00:00Z".parse().unwrap();
        log.log(
            &uid,
            "מחק פגישה",
            &[obs("a", "delete_event", 0.9), obs("b", "delete_event", 0.85)],
            now,
        );
        let db = log.db.lock().unwrap();
        let (matched, model_c): (i64, Option<String>) = db
            .query_row(
                "SELECT intent_match, model_c FROM nlp_comparisons",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(matched, 1);
        assert!(model_c.is_none());
    }
}
