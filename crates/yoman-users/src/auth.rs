use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use yoman_core::clock::Clock;
use yoman_core::config::AuthConfig;
use yoman_core::types::{Phone, UserId};
use yoman_kv::MemoryKv;

use crate::error::{Result, UserError};
use crate::manager::UserService;
use crate::types::{AuthState, User};

/// Outcome of a PIN login attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Success(UserId),
    /// Wrong PIN; `remaining` attempts left before lockout.
    WrongPin { remaining: u32 },
    LockedOut { until: DateTime<Utc> },
}

/// Registration + PIN login over the users table and the kv AuthState.
///
/// The router derives the acting `user_id` exclusively from here — never
/// from message content.
pub struct AuthManager {
    users: Arc<UserService>,
    kv: Arc<MemoryKv>,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl AuthManager {
    pub fn new(
        users: Arc<UserService>,
        kv: Arc<MemoryKv>,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            kv,
            clock,
            config,
        }
    }

    fn session_ttl(&self) -> Duration {
        Duration::hours(self.config.session_ttl_hours)
    }

    /// Current AuthState for a phone (default: unauthenticated).
    pub fn state(&self, phone: &Phone) -> AuthState {
        self.kv
            .get_json(&yoman_kv::auth_state(phone))
            .unwrap_or_default()
    }

    /// The authenticated user id for this phone, refreshing the session
    /// TTL as a side effect of the interaction.
    pub fn authenticated_user(&self, phone: &Phone) -> Option<UserId> {
        let state = self.state(phone);
        if state.authenticated {
            self.kv
                .touch(&yoman_kv::auth_state(phone), self.session_ttl());
            state.user_id
        } else {
            None
        }
    }

    /// Validate a candidate PIN: 4–8 digits.
    pub fn validate_pin(pin: &str) -> Result<()> {
        let trimmed = pin.trim();
        if trimmed.len() < 4 || trimmed.len() > 8 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(UserError::InvalidPin(
                "PIN must be 4-8 digits".to_string(),
            ));
        }
        Ok(())
    }

    fn hash_pin(pin: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(pin.trim().as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| UserError::Hash(e.to_string()))
    }

    fn verify_pin(pin: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(pin.trim().as_bytes(), &parsed)
            .is_ok()
    }

    /// Complete registration: create the user and authenticate the phone.
    pub fn register(&self, phone: &Phone, name: &str, pin: &str) -> Result<User> {
        Self::validate_pin(pin)?;
        let pin_hash = Self::hash_pin(pin)?;
        let user = self.users.create(phone, name.trim(), &pin_hash)?;
        self.store_authenticated(phone, &user.id);
        Ok(user)
    }

    /// Attempt a PIN login for a registered phone.
    pub fn login(&self, phone: &Phone, pin: &str) -> Result<LoginOutcome> {
        let user = self.users.get_by_phone(phone)?.ok_or(UserError::NotFound)?;
        let now = self.clock.now_utc();

        if let Some(until) = user.lockout_until_utc {
            if until > now {
                return Ok(LoginOutcome::LockedOut { until });
            }
        }

        if Self::verify_pin(pin, &user.pin_hash) {
            self.users.reset_login_failures(&user.id)?;
            self.store_authenticated(phone, &user.id);
            info!(user_id = %user.id, "login succeeded");
            return Ok(LoginOutcome::Success(user.id));
        }

        let (count, lockout) = self.users.record_login_failure(
            &user.id,
            self.config.max_failed_logins,
            Duration::minutes(self.config.lockout_minutes),
        )?;
        match lockout {
            Some(until) => {
                // Mirror the lockout into the ephemeral state so the router
                // can refuse without a DB hit.
                let state = AuthState {
                    authenticated: false,
                    user_id: None,
                    failed_attempts: count,
                    lockout_until: Some(until),
                };
                let _ = self
                    .kv
                    .set_json(&yoman_kv::auth_state(phone), &state, Some(self.session_ttl()));
                warn!(user_id = %user.id, "PIN lockout engaged");
                Ok(LoginOutcome::LockedOut { until })
            }
            None => Ok(LoginOutcome::WrongPin {
                remaining: self.config.max_failed_logins.saturating_sub(count),
            }),
        }
    }

    /// Drop the authenticated session for this phone.
    pub fn logout(&self, phone: &Phone) {
        self.kv.delete(&yoman_kv::auth_state(phone));
    }

    fn store_authenticated(&self, phone: &Phone, user_id: &UserId) {
        let state = AuthState {
            authenticated: true,
            user_id: Some(user_id.clone()),
            failed_attempts: 0,
            lockout_until: None,
        };
        let _ = self
            .kv
            .set_json(&yoman_kv::auth_state(phone), &state, Some(self.session_ttl()));
    }
}
