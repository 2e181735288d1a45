//! Session coordinator: login, two-factor verification, silent refresh, and
//! inactivity expiry.
//!
//! The [`SessionManager`] is the sole owner of the in-memory session and the
//! only writer of the persisted token pair. Consumers read state through
//! [`SessionManager::state`] and funnel every mutation through the methods
//! here; writing tokens behind the manager's back breaks the
//! written-together/cleared-together invariant.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use crate::api::types::{LoginResponse, RefreshResponse, TwoFactorResponse, User};
use crate::api::{ApiClient, ApiError};
use crate::store::{TokenStore, ACCESS_TOKEN_KEY, AUTH_STATE_KEY, REFRESH_TOKEN_KEY};

pub mod guard;
pub mod notify;

pub use guard::{admin_route, RouteDecision};
pub use notify::{Notice, Notifier, TracingNotifier};

#[derive(Debug, Error)]
pub enum AuthError {
    /// `verify_two_factor` was called without a pending challenge (or the
    /// temp token aged out). Local precondition; no network call is made.
    #[error("no pending 2FA session")]
    NoPendingTwoFactor,
    /// A refresh was requested but no refresh token is stored.
    #[error("no refresh token")]
    NoRefreshToken,
    /// The server answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    Decode(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Explicit session state. Partially-authenticated flag combinations are
/// unrepresentable by construction.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Not yet determined (before `initialize` resolves).
    Loading,
    Anonymous,
    /// Password accepted; waiting for the one-time code. The temp token is
    /// held only in memory and is never persisted.
    PendingTwoFactor {
        temp_token: SecretString,
        issued_at: Instant,
    },
    Authenticated { user: User },
}

impl SessionState {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Authenticated { user } if user.is_admin())
    }

    #[must_use]
    pub const fn requires_two_factor(&self) -> bool {
        matches!(self, Self::PendingTwoFactor { .. })
    }
}

/// Outcome of a successful `login` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    TwoFactorRequired,
}

/// Timing knobs. Defaults match production cadence; tests compress them.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cadence of the silent access-token refresh.
    pub refresh_interval: Duration,
    /// Idle time after which an authenticated session is expired.
    pub inactivity_timeout: Duration,
    /// Cadence of the inactivity watchdog check.
    pub inactivity_check_interval: Duration,
    /// Local validity window of the 2FA temp token.
    pub temp_token_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5 * 60),
            inactivity_timeout: Duration::from_secs(30 * 60),
            inactivity_check_interval: Duration::from_secs(60),
            temp_token_ttl: Duration::from_secs(10 * 60),
        }
    }
}

struct Inner {
    state: SessionState,
    error: Option<String>,
}

/// Coordinator for the authenticated session.
pub struct SessionManager {
    client: ApiClient,
    store: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    config: SessionConfig,
    inner: Mutex<Inner>,
    last_activity: Mutex<Instant>,
    init_in_flight: AtomicBool,
}

impl SessionManager {
    #[must_use]
    pub fn new(client: ApiClient, store: Arc<dyn TokenStore>) -> Self {
        Self::with_parts(
            client,
            store,
            Arc::new(TracingNotifier),
            SessionConfig::default(),
        )
    }

    #[must_use]
    pub fn with_parts(
        client: ApiClient,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        config: SessionConfig,
    ) -> Self {
        Self {
            client,
            store,
            notifier,
            config,
            inner: Mutex::new(Inner {
                state: SessionState::Loading,
                error: None,
            }),
            last_activity: Mutex::new(Instant::now()),
            init_in_flight: AtomicBool::new(false),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lock_inner().state.clone()
    }

    /// Error message from the last failed operation, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock_inner().error.clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        match &self.lock_inner().state {
            SessionState::Authenticated { user } => Some(user.clone()),
            _ => None,
        }
    }

    /// User snapshot persisted from the last session. Optimistic UI only;
    /// never trusted as an auth source.
    #[must_use]
    pub fn cached_user(&self) -> Option<User> {
        let raw = self.store.get(AUTH_STATE_KEY)?;
        serde_json::from_str(&raw).ok()
    }

    /// Record a user interaction for the inactivity watchdog.
    pub fn record_activity(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_time(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Restore the session from storage, called once at startup.
    ///
    /// Concurrent invocations collapse into one: a call while another is in
    /// flight is a no-op. If a persisted access token exists, the who-am-i
    /// endpoint is consulted; on failure exactly one refresh-then-retry
    /// cycle runs before the tokens are cleared and the session falls back
    /// to anonymous.
    ///
    /// # Errors
    /// Returns an error when a persisted session existed but could not be
    /// restored. The session is left in a clean anonymous state either way.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), AuthError> {
        if self
            .init_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("initialize already in flight");
            return Ok(());
        }

        let result = self.initialize_inner().await;
        self.init_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn initialize_inner(&self) -> Result<(), AuthError> {
        let Some(access) = self.store.get(ACCESS_TOKEN_KEY) else {
            self.set_state(SessionState::Anonymous, None);
            return Ok(());
        };

        match self.whoami(&access).await {
            Ok(user) => {
                self.set_state(SessionState::Authenticated { user }, None);
                self.record_activity();
                Ok(())
            }
            Err(first_err) => {
                debug!("who-am-i failed, attempting refresh: {first_err}");

                let refreshed = match self.refresh_access_token().await {
                    Ok(access) => access,
                    Err(err) => {
                        self.reset_with_error("session could not be restored");
                        return Err(err);
                    }
                };

                match self.whoami(&refreshed).await {
                    Ok(user) => {
                        info!("Session recovered via token refresh");
                        self.set_state(SessionState::Authenticated { user }, None);
                        self.record_activity();
                        Ok(())
                    }
                    Err(err) => {
                        self.reset_with_error("session could not be restored");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Authenticate with email and password.
    ///
    /// On a full grant the token pair and user snapshot are persisted
    /// together. On a two-factor challenge the temp token is held in memory
    /// only and nothing is written to storage. On failure the stored tokens
    /// are left untouched and the server's error message is recorded.
    ///
    /// # Errors
    /// Propagates the classified API failure or a malformed response body.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        self.clear_error();

        let payload = json!({"email": email, "password": password});
        let body = match self.client.post("/auth/login", &payload, None).await {
            Ok(body) => body,
            Err(err) => {
                self.set_state(SessionState::Anonymous, Some(err.to_string()));
                return Err(err.into());
            }
        };

        let response: LoginResponse =
            serde_json::from_value(body).map_err(|err| self.decode_failure(&err))?;

        if response.requires_2fa {
            let temp_token = response
                .temp_token
                .ok_or_else(|| self.decode_failure(&"missing temp_token"))?;
            self.set_state(
                SessionState::PendingTwoFactor {
                    temp_token: SecretString::from(temp_token),
                    issued_at: Instant::now(),
                },
                None,
            );
            return Ok(LoginOutcome::TwoFactorRequired);
        }

        let access = response
            .access_token
            .ok_or_else(|| self.decode_failure(&"missing access_token"))?;
        let refresh = response
            .refresh_token
            .ok_or_else(|| self.decode_failure(&"missing refresh_token"))?;
        let user = response
            .user
            .ok_or_else(|| self.decode_failure(&"missing user"))?;

        self.establish(&access, &refresh, &user);
        Ok(LoginOutcome::Authenticated)
    }

    /// Complete a pending two-factor challenge.
    ///
    /// Fails fast without a network call when no challenge is pending or the
    /// temp token has aged out. A rejected code keeps the pending state so
    /// the user may retry; a `401` means the temp token itself is spent and
    /// the session falls back to anonymous.
    ///
    /// # Errors
    /// [`AuthError::NoPendingTwoFactor`] locally, otherwise the classified
    /// API failure.
    #[instrument(skip(self, code))]
    pub async fn verify_two_factor(&self, code: &str) -> Result<(), AuthError> {
        let temp_token = {
            let mut inner = self.lock_inner();
            let (token, expired) = match &inner.state {
                SessionState::PendingTwoFactor {
                    temp_token,
                    issued_at,
                } => {
                    if issued_at.elapsed() <= self.config.temp_token_ttl {
                        (Some(temp_token.clone()), false)
                    } else {
                        (None, true)
                    }
                }
                _ => (None, false),
            };

            match token {
                Some(token) => token,
                None => {
                    if expired {
                        // Aged-out challenge: restart from login.
                        inner.state = SessionState::Anonymous;
                    }
                    inner.error = Some("no pending 2FA session".to_string());
                    return Err(AuthError::NoPendingTwoFactor);
                }
            }
        };

        let payload = json!({
            "temp_token": temp_token.expose_secret(),
            "code": code
        });

        match self.client.post("/auth/verify-2fa", &payload, None).await {
            Ok(body) => {
                let response: TwoFactorResponse =
                    serde_json::from_value(body).map_err(|err| self.decode_failure(&err))?;
                self.establish(&response.access_token, &response.refresh_token, &response.user);
                Ok(())
            }
            Err(err) => {
                if err.is_unauthorized() {
                    // Temp token is single-use and is not reissued.
                    self.set_state(SessionState::Anonymous, Some(err.to_string()));
                } else {
                    self.record_error(&err.to_string());
                }
                Err(err.into())
            }
        }
    }

    /// Log out. The server notification is best effort; local logout always
    /// succeeds, clears the token pair and temp token, and emits a
    /// [`Notice::LoggedOut`].
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.logout_with(Notice::LoggedOut).await;
    }

    async fn logout_with(&self, notice: Notice) {
        if let Some(access) = self.store.get(ACCESS_TOKEN_KEY) {
            if let Err(err) = self.client.post("/auth/logout", &json!({}), Some(&access)).await {
                debug!("Ignoring logout notification failure: {err}");
            }
        }

        self.clear_session();
        self.notifier.notify(notice);
    }

    /// Request a password-reset email. Pass-through: the session state is
    /// never touched, but a failure message is recorded for the UI.
    ///
    /// # Errors
    /// Propagates the classified API failure.
    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        match self
            .client
            .post("/auth/forgot-password", &json!({"email": email}), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                self.record_error(&err.to_string());
                Err(err.into())
            }
        }
    }

    /// Exchange the refresh token for a new access token, overwriting only
    /// the access token in storage.
    ///
    /// # Errors
    /// [`AuthError::NoRefreshToken`] when no refresh token is stored,
    /// otherwise the classified API failure.
    pub async fn refresh_access_token(&self) -> Result<String, AuthError> {
        let refresh = self
            .store
            .get(REFRESH_TOKEN_KEY)
            .ok_or(AuthError::NoRefreshToken)?;

        let body = self
            .client
            .post("/auth/refresh", &json!({"refresh_token": refresh}), None)
            .await?;

        let response: RefreshResponse =
            serde_json::from_value(body).map_err(|err| self.decode_failure(&err))?;

        self.store.set(ACCESS_TOKEN_KEY, &response.access_token);
        Ok(response.access_token)
    }

    /// Silent access-token renewal every `refresh_interval` while both
    /// tokens are present. Failures are swallowed: the next real request
    /// surfaces a `401` and drives the normal re-auth flow.
    #[must_use]
    pub fn spawn_refresh_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut tick = interval(manager.config.refresh_interval);
            // interval fires immediately; skip the zeroth tick
            tick.tick().await;

            loop {
                tick.tick().await;

                if manager.store.get(ACCESS_TOKEN_KEY).is_none()
                    || manager.store.get(REFRESH_TOKEN_KEY).is_none()
                {
                    continue;
                }

                match manager.refresh_access_token().await {
                    Ok(_) => debug!("Access token renewed"),
                    Err(err) => warn!("Silent token refresh failed: {err}"),
                }
            }
        })
    }

    /// Inactivity watchdog: every `inactivity_check_interval`, expire the
    /// session when no activity has been recorded for
    /// `inactivity_timeout`, emitting a [`Notice::SessionExpired`].
    #[must_use]
    pub fn spawn_inactivity_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut tick = interval(manager.config.inactivity_check_interval);
            tick.tick().await;

            loop {
                tick.tick().await;

                if !manager.state().is_authenticated() {
                    continue;
                }

                let idle = manager.idle_time();
                if idle >= manager.config.inactivity_timeout {
                    info!("Session idle for {}s, expiring", idle.as_secs());
                    manager.logout_with(Notice::SessionExpired).await;
                }
            }
        })
    }

    async fn whoami(&self, access: &str) -> Result<User, AuthError> {
        let body = self.client.get("/auth/me", Some(access)).await?;
        serde_json::from_value(body).map_err(|err| self.decode_failure(&err))
    }

    /// Persist the token pair and user snapshot together and enter the
    /// authenticated state. Replacing the state also drops any temp token.
    fn establish(&self, access: &str, refresh: &str, user: &User) {
        self.store.set(ACCESS_TOKEN_KEY, access);
        self.store.set(REFRESH_TOKEN_KEY, refresh);
        if let Ok(snapshot) = serde_json::to_string(user) {
            self.store.set(AUTH_STATE_KEY, &snapshot);
        }

        self.set_state(SessionState::Authenticated { user: user.clone() }, None);
        self.record_activity();
    }

    /// Clear the token pair and snapshot together and return to anonymous.
    fn clear_session(&self) {
        self.store.remove(ACCESS_TOKEN_KEY);
        self.store.remove(REFRESH_TOKEN_KEY);
        self.store.remove(AUTH_STATE_KEY);
        self.set_state(SessionState::Anonymous, None);
    }

    fn reset_with_error(&self, message: &str) {
        self.store.remove(ACCESS_TOKEN_KEY);
        self.store.remove(REFRESH_TOKEN_KEY);
        self.store.remove(AUTH_STATE_KEY);
        self.set_state(SessionState::Anonymous, Some(message.to_string()));
    }

    fn decode_failure(&self, err: &dyn std::fmt::Display) -> AuthError {
        let message = format!("invalid response: {err}");
        self.record_error(&message);
        AuthError::Decode(err.to_string())
    }

    fn set_state(&self, state: SessionState, error: Option<String>) {
        let mut inner = self.lock_inner();
        inner.state = state;
        inner.error = error;
    }

    fn record_error(&self, message: &str) {
        self.lock_inner().error = Some(message.to_string());
    }

    fn clear_error(&self) {
        self.lock_inner().error = None;
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_production_cadence() {
        let config = SessionConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(1800));
        assert_eq!(config.inactivity_check_interval, Duration::from_secs(60));
        assert_eq!(config.temp_token_ttl, Duration::from_secs(600));
    }

    #[test]
    fn state_predicates() {
        assert!(!SessionState::Loading.is_authenticated());
        assert!(!SessionState::Anonymous.is_admin());

        let pending = SessionState::PendingTwoFactor {
            temp_token: SecretString::from("X".to_string()),
            issued_at: Instant::now(),
        };
        assert!(pending.requires_two_factor());
        assert!(!pending.is_authenticated());

        let admin = SessionState::Authenticated {
            user: User {
                id: "1".to_string(),
                email: "a@b.com".to_string(),
                display_name: String::new(),
                role: "admin".to_string(),
                totp_enabled: true,
            },
        };
        assert!(admin.is_authenticated());
        assert!(admin.is_admin());
    }
}
