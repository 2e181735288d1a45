//! Wire types for the auth endpoints.

use serde::{Deserialize, Serialize};

/// Identity record returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    pub role: String,
    #[serde(default)]
    pub totp_enabled: bool,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// `POST /auth/login` response. Either a full token grant or a pending
/// two-factor challenge (`requires_2fa` + `temp_token`).
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub requires_2fa: bool,
    #[serde(default)]
    pub temp_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// `POST /auth/verify-2fa` response.
#[derive(Debug, Deserialize)]
pub struct TwoFactorResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// `POST /auth/refresh` response.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}
