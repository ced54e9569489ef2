use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (yoman.toml + YOMAN_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct YomanConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub nlu: NluConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub events: EventPolicy,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Token-gated dashboard issuance. The renderer itself is an external
/// surface; this only controls the URL embedded in replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_base_url")]
    pub base_url: String,
    /// Token TTL in minutes.
    #[serde(default = "default_dashboard_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: default_dashboard_base_url(),
            token_ttl_minutes: default_dashboard_token_ttl_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Registration / PIN login parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Consecutive failed PIN entries before lockout.
    #[serde(default = "default_max_failed_logins")]
    pub max_failed_logins: u32,
    /// Lockout duration in minutes.
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: i64,
    /// Authenticated-session TTL in hours.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_failed_logins: default_max_failed_logins(),
            lockout_minutes: default_lockout_minutes(),
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

/// A single NLU model slot. Up to three are invoked in parallel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluModelConfig {
    /// Vendor wire format: "anthropic", "openai", or "openai-compat".
    pub kind: String,
    /// Model identifier sent on the wire.
    pub model: String,
    pub api_key: String,
    /// Base URL override; required for "openai-compat".
    pub base_url: Option<String>,
    /// Pricing, $ per 1M input tokens.
    #[serde(default)]
    pub input_cost_per_mtok: f64,
    /// Pricing, $ per 1M output tokens.
    #[serde(default)]
    pub output_cost_per_mtok: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluConfig {
    /// Model slots, tried in the listed order. Empty ⇒ NLU always returns
    /// `unknown` (the command/state surface keeps working).
    #[serde(default)]
    pub models: Vec<NluModelConfig>,
    /// Overall ensemble deadline in milliseconds.
    #[serde(default = "default_ensemble_deadline_ms")]
    pub deadline_ms: u64,
    /// Minimum confidence for create/list/search intents.
    #[serde(default = "default_create_threshold")]
    pub create_threshold: f64,
    /// Minimum confidence for delete/update intents.
    #[serde(default = "default_destructive_threshold")]
    pub destructive_threshold: f64,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            deadline_ms: default_ensemble_deadline_ms(),
            create_threshold: default_create_threshold(),
            destructive_threshold: default_destructive_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Hour (UTC) at which the daily rollout job fires.
    #[serde(default = "default_daily_hour_utc")]
    pub daily_hour_utc: u8,
    /// Worker pool size.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Global transport dispatch cap, jobs per second.
    #[serde(default = "default_dispatch_per_second")]
    pub dispatch_per_second: u32,
    /// Delivery attempts per job before it is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Retry backoff base in seconds (doubles per attempt, capped below).
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    /// Per-job execution deadline in seconds.
    #[serde(default = "default_job_deadline_secs")]
    pub job_deadline_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_hour_utc: default_daily_hour_utc(),
            worker_concurrency: default_worker_concurrency(),
            dispatch_per_second: default_dispatch_per_second(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            job_deadline_secs: default_job_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-recipient outbound messages per minute.
    #[serde(default = "default_recipient_per_minute")]
    pub recipient_per_minute: u32,
    /// Per-user inbound messages per minute before throttling.
    #[serde(default = "default_inbound_per_minute")]
    pub inbound_per_minute: u32,
    /// Bounded outbound queue size while disconnected; oldest dropped.
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
    /// Reconnect backoff base in seconds (doubles, capped below).
    #[serde(default = "default_send_backoff_base_secs")]
    pub send_backoff_base_secs: u64,
    #[serde(default = "default_send_backoff_cap_secs")]
    pub send_backoff_cap_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recipient_per_minute: default_recipient_per_minute(),
            inbound_per_minute: default_inbound_per_minute(),
            outbound_queue_size: default_outbound_queue_size(),
            send_backoff_base_secs: default_send_backoff_base_secs(),
            send_backoff_cap_secs: default_send_backoff_cap_secs(),
        }
    }
}

/// Event-creation policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPolicy {
    /// Reject events whose start is in the past (beyond the grace window).
    #[serde(default = "bool_true")]
    pub reject_past: bool,
    /// Grace window in minutes for "just now" starts.
    #[serde(default = "default_past_grace_minutes")]
    pub past_grace_minutes: i64,
    /// Default event duration when the user gives no end time.
    #[serde(default = "default_event_duration_minutes")]
    pub default_duration_minutes: i64,
}

impl Default for EventPolicy {
    fn default() -> Self {
        Self {
            reject_past: true,
            past_grace_minutes: default_past_grace_minutes(),
            default_duration_minutes: default_event_duration_minutes(),
        }
    }
}

/// Operator alerting (AI cost thresholds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// E.164 phone that receives operator alerts. Empty ⇒ alerts disabled.
    #[serde(default)]
    pub alert_phone: String,
    /// Alert step in USD: an alert fires when month-to-date cost crosses a
    /// new multiple of this value.
    #[serde(default = "default_cost_alert_step_usd")]
    pub cost_alert_step_usd: f64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            alert_phone: String::new(),
            cost_alert_step_usd: default_cost_alert_step_usd(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.yoman/yoman.db")
}
fn default_max_failed_logins() -> u32 {
    3
}
fn default_lockout_minutes() -> i64 {
    15
}
fn default_session_ttl_hours() -> i64 {
    48
}
fn default_ensemble_deadline_ms() -> u64 {
    5_000
}
fn default_create_threshold() -> f64 {
    0.50
}
fn default_destructive_threshold() -> f64 {
    0.60
}
fn default_daily_hour_utc() -> u8 {
    9
}
fn default_worker_concurrency() -> usize {
    5
}
fn default_dispatch_per_second() -> u32 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_secs() -> u64 {
    1
}
fn default_backoff_cap_secs() -> u64 {
    30
}
fn default_job_deadline_secs() -> u64 {
    30
}
fn default_recipient_per_minute() -> u32 {
    20
}
fn default_inbound_per_minute() -> u32 {
    20
}
fn default_outbound_queue_size() -> usize {
    256
}
fn default_send_backoff_base_secs() -> u64 {
    5
}
fn default_send_backoff_cap_secs() -> u64 {
    60
}
fn default_past_grace_minutes() -> i64 {
    5
}
fn default_event_duration_minutes() -> i64 {
    60
}
fn default_cost_alert_step_usd() -> f64 {
    10.0
}
fn default_dashboard_base_url() -> String {
    "http://localhost:8080/d".to_string()
}
fn default_dashboard_token_ttl_minutes() -> i64 {
    15
}

impl YomanConfig {
    /// Load config from a TOML file with YOMAN_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.yoman/yoman.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: YomanConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("YOMAN_").split("_"))
            .extract()
            .map_err(|e| crate::error::YomanError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.yoman/yoman.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = YomanConfig::default();
        assert_eq!(c.auth.max_failed_logins, 3);
        assert_eq!(c.auth.lockout_minutes, 15);
        assert_eq!(c.nlu.deadline_ms, 5_000);
        assert!((c.nlu.create_threshold - 0.50).abs() < f64::EPSILON);
        assert!((c.nlu.destructive_threshold - 0.60).abs() < f64::EPSILON);
        assert_eq!(c.scheduler.worker_concurrency, 5);
        assert_eq!(c.scheduler.dispatch_per_second, 10);
        assert_eq!(c.transport.recipient_per_minute, 20);
        assert!((c.operator.cost_alert_step_usd - 10.0).abs() < f64::EPSILON);
    }
}
