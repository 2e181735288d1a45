//! Route guard for the protected admin subtree.
//!
//! A pure function of session state: it holds no state of its own and never
//! performs IO. Consumers apply the decision (render, placeholder, or
//! redirect) however their UI layer sees fit.

use super::SessionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Session not yet determined; render a placeholder.
    Pending,
    /// Fully authenticated admin; render the protected subtree.
    Allow,
    /// Unauthenticated (or authenticated without the admin role). The
    /// originally requested path is preserved for post-login return.
    RedirectToLogin { return_to: String },
    /// Password accepted but the one-time code is still outstanding.
    RedirectToTwoFactor,
}

/// Decide what to do with a request for a protected admin path.
#[must_use]
pub fn admin_route(state: &SessionState, requested_path: &str) -> RouteDecision {
    match state {
        SessionState::Loading => RouteDecision::Pending,
        SessionState::PendingTwoFactor { .. } => RouteDecision::RedirectToTwoFactor,
        SessionState::Authenticated { user } if user.is_admin() => RouteDecision::Allow,
        SessionState::Anonymous | SessionState::Authenticated { .. } => {
            RouteDecision::RedirectToLogin {
                return_to: requested_path.to_string(),
            }
        }
    }
}
