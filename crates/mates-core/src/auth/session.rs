use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::UserIdentity;

/// Stored session tokens expire 30 days after sign-in.
const TOKEN_EXPIRY_DAYS: i64 = 30;

/// Coarse authentication status, as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Unknown,
    Checking,
    Authenticated,
    Unauthenticated,
}

/// Authentication state. The signed-in identity only exists in `Authenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "status", content = "user", rename_all = "camelCase")]
pub enum SessionState {
    Unknown,
    Checking,
    Authenticated(UserIdentity),
    Unauthenticated,
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Unknown => SessionStatus::Unknown,
            SessionState::Checking => SessionStatus::Checking,
            SessionState::Authenticated(_) => SessionStatus::Authenticated,
            SessionState::Unauthenticated => SessionStatus::Unauthenticated,
        }
    }
}

/// Snapshot of the session published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    pub state: SessionState,
    /// A restore, login or register is in flight
    pub busy: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::Unknown,
            busy: false,
        }
    }
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn current_user(&self) -> Option<&UserIdentity> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }
}

/// A signed-in session as kept by a `SessionStore`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: UserIdentity,
    pub created_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(token: String, user: UserIdentity) -> Self {
        Self {
            token,
            user,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        let expiry = self.created_at + Duration::days(TOKEN_EXPIRY_DAYS);
        Utc::now() > expiry
    }

    pub fn time_until_expiry(&self) -> Duration {
        let expiry = self.created_at + Duration::days(TOKEN_EXPIRY_DAYS);
        expiry - Utc::now()
    }
}
