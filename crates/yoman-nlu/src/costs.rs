use std::sync::{Arc, Mutex};

use chrono::Datelike;
use rusqlite::Connection;
use tokio::sync::mpsc;
use tracing::{info, warn};

use yoman_core::clock::Clock;
use yoman_core::config::OperatorConfig;
use yoman_core::types::{new_row_id, UserId};

use crate::provider::ProviderError;

/// Append-only AI cost ledger with threshold-based operator alerts.
///
/// Inserts are serialized by the connection mutex, so the crossed-multiple
/// computation (sum before vs. sum after) is race-free and each $step
/// multiple alerts exactly once.
pub struct CostAccountant {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    config: OperatorConfig,
    /// Operator alert text is pushed here; the gateway routes it to egress.
    alert_tx: Option<mpsc::Sender<String>>,
}

impl CostAccountant {
    pub fn new(
        conn: Connection,
        clock: Arc<dyn Clock>,
        config: OperatorConfig,
        alert_tx: Option<mpsc::Sender<String>>,
    ) -> Result<Self, rusqlite::Error> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            clock,
            config,
            alert_tx,
        })
    }

    /// Cost of one call given per-1M-token pricing.
    pub fn compute_cost(
        tokens_in: u32,
        tokens_out: u32,
        input_cost_per_mtok: f64,
        output_cost_per_mtok: f64,
    ) -> f64 {
        (tokens_in as f64 / 1_000_000.0) * input_cost_per_mtok
            + (tokens_out as f64 / 1_000_000.0) * output_cost_per_mtok
    }

    /// Record one model call. Returns the cost recorded.
    pub fn record(
        &self,
        user_id: Option<&UserId>,
        model: &str,
        operation: &str,
        tokens_in: u32,
        tokens_out: u32,
        cost_usd: f64,
    ) -> Result<f64, ProviderError> {
        let now = self.clock.now_utc();
        let month_start = now
            .date_naive()
            .with_day(1)
            .unwrap_or_else(|| now.date_naive())
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .to_rfc3339();

        let (before, after) = {
            let db = self.db.lock().unwrap();
            let before: f64 = db
                .query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0) FROM ai_cost_log
                     WHERE created_at >= ?1",
                    rusqlite::params![month_start],
                    |row| row.get(0),
                )
                .map_err(|e| ProviderError::Parse(e.to_string()))?;

            db.execute(
                "INSERT INTO ai_cost_log
                 (id, user_id, model, operation, cost_usd, tokens_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    new_row_id(),
                    user_id.map(|u| u.as_str().to_string()),
                    model,
                    operation,
                    cost_usd,
                    (tokens_in + tokens_out) as i64,
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

            (before, before + cost_usd)
        };

        self.maybe_alert(before, after);
        Ok(cost_usd)
    }

    /// Month-to-date total, for diagnostics.
    pub fn month_to_date(&self) -> f64 {
        let now = self.clock.now_utc();
        let month_start = now
            .date_naive()
            .with_day(1)
            .unwrap_or_else(|| now.date_naive())
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .to_rfc3339();
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0) FROM ai_cost_log WHERE created_at >= ?1",
            rusqlite::params![month_start],
            |row| row.get(0),
        )
        .unwrap_or(0.0)
    }

    /// Alert iff the insert crossed a new multiple of the configured step.
    fn maybe_alert(&self, before: f64, after: f64) {
        let step = self.config.cost_alert_step_usd;
        if step <= 0.0 || self.config.alert_phone.is_empty() {
            return;
        }
        let before_multiple = (before / step).floor() as i64;
        let after_multiple = (after / step).floor() as i64;
        if after_multiple > before_multiple {
            let threshold = after_multiple as f64 * step;
            let message = format!(
                "⚠️ עלות מודלי השפה החודש חצתה ${threshold:.0} (סה\"כ ${after:.2})"
            );
            info!(threshold, total = after, "cost alert threshold crossed");
            match &self.alert_tx {
                Some(tx) => {
                    if tx.try_send(message).is_err() {
                        warn!("operator alert channel full or closed — alert dropped");
                    }
                }
                None => warn!("cost threshold crossed but no alert channel configured"),
            }
        }
    }
}
