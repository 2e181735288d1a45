//! User-visible notices emitted by the session manager.

use tracing::info;

/// Distinguishes an explicit logout from an inactivity expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    LoggedOut,
    SessionExpired,
}

/// Sink for session notices. Injected so the coordinator stays
/// platform-agnostic; the default implementation logs.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::LoggedOut => info!("Logged out"),
            Notice::SessionExpired => info!("Session expired due to inactivity"),
        }
    }
}
