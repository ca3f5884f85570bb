use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use super::{BackendError, Grant, IdentityBackend};
use crate::auth::{Credentials, StoredSession, UserIdentity};

/// Simulated round-trip time, matching the app's mock.
pub const DEFAULT_LATENCY_MS: u64 = 1000;

/// Length of issued session tokens
const TOKEN_LENGTH: usize = 32;

/// Stand-in for a real identity service.
///
/// Every call waits `latency` and then succeeds, unless a failure was queued
/// with `fail_next` or the token was revoked. Register performs no uniqueness
/// check.
pub struct SimulatedBackend {
    latency: Duration,
    next_failure: Mutex<Option<BackendError>>,
    revoked: Mutex<HashSet<String>>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(DEFAULT_LATENCY_MS))
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            next_failure: Mutex::new(None),
            revoked: Mutex::new(HashSet::new()),
        }
    }

    /// Make the next call fail with `err` (after the usual latency)
    pub fn fail_next(&self, err: BackendError) {
        if let Ok(mut slot) = self.next_failure.lock() {
            *slot = Some(err);
        }
    }

    /// Reject `token` on future `resume` calls
    pub fn revoke(&self, token: &str) {
        if let Ok(mut revoked) = self.revoked.lock() {
            revoked.insert(token.to_string());
        }
    }

    fn issue_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    fn is_well_formed(token: &str) -> bool {
        token.len() == TOKEN_LENGTH && token.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Wait out the simulated latency, then surface a queued failure if any
    async fn round_trip(&self) -> Result<(), BackendError> {
        tokio::time::sleep(self.latency).await;
        let queued = self
            .next_failure
            .lock()
            .map_err(|_| BackendError::Unavailable("simulator state poisoned".into()))?
            .take();
        match queued {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn grant_for(email: &str) -> Grant {
        Grant {
            user: UserIdentity::from_email(email),
            token: Self::issue_token(),
        }
    }
}

#[async_trait]
impl IdentityBackend for SimulatedBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Grant, BackendError> {
        self.round_trip().await?;
        debug!(email = %credentials.email, "Simulated login accepted");
        Ok(Self::grant_for(&credentials.email))
    }

    async fn register(&self, credentials: &Credentials) -> Result<Grant, BackendError> {
        self.round_trip().await?;
        debug!(email = %credentials.email, "Simulated registration accepted");
        Ok(Self::grant_for(&credentials.email))
    }

    async fn resume(&self, stored: &StoredSession) -> Result<Grant, BackendError> {
        self.round_trip().await?;

        let revoked = self
            .revoked
            .lock()
            .map_err(|_| BackendError::Unavailable("simulator state poisoned".into()))?
            .contains(&stored.token);
        if revoked || !Self::is_well_formed(&stored.token) {
            return Err(BackendError::Rejected("session token is no longer valid".into()));
        }

        Ok(Grant {
            user: stored.user.clone(),
            token: stored.token.clone(),
        })
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError> {
        self.round_trip().await?;
        debug!(email = %email, "Simulated password reset sent");
        Ok(())
    }

    async fn update_profile(
        &self,
        _token: &str,
        user: &UserIdentity,
        display_name: &str,
    ) -> Result<UserIdentity, BackendError> {
        self.round_trip().await?;
        Ok(user.with_display_name(display_name))
    }
}
