//! # Petasync Auth (Back-office Session Agent)
//!
//! `petasync-auth` maintains an authenticated session against the Petasync
//! admin REST API: password login, TOTP two-factor verification, silent
//! access-token refresh, and client-side inactivity expiry.
//!
//! ## Session lifecycle
//!
//! The [`session::SessionManager`] owns the in-memory session and is the only
//! writer of the persisted token pair. The session is an explicit state
//! machine (`Loading` → `Anonymous` / `PendingTwoFactor` / `Authenticated`);
//! partially-authenticated combinations are unrepresentable.
//!
//! - **Token pair invariant:** the access and refresh tokens are written
//!   together and cleared together. The refresh loop is the one exception:
//!   it overwrites only the access token after a successful exchange.
//! - **Recovery:** a stale access token with a still-valid refresh token is
//!   recovered transparently during [`session::SessionManager::initialize`]
//!   (who-am-i → refresh → retry) without forcing a re-login.
//! - **Degradation:** storage failures are swallowed; the session then simply
//!   does not survive a restart.
//!
//! ## Wire protocol
//!
//! All backend calls go through [`api::ApiClient`], which attaches the bearer
//! token, retries transient failures with linear backoff, and classifies
//! `401` responses separately so callers can drive refresh-and-retry.

pub mod api;
pub mod cli;
pub mod session;
pub mod store;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
