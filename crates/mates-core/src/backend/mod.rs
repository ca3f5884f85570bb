//! Identity backend seam.
//!
//! The session manager never talks to a server directly. It goes through
//! `IdentityBackend`, which conceptually receives `{email, password}` and
//! answers with `{id, email, displayName}` plus an opaque session token, or an
//! error. No wire protocol is defined here; `SimulatedBackend` reproduces the
//! app's current mock behaviour (fixed latency, always succeeds).

pub mod simulated;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::{Credentials, StoredSession, UserIdentity};

pub use simulated::SimulatedBackend;

/// Failure reported by an identity backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered and refused the request
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The backend could not be reached or failed internally
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Successful sign-in: who the user is and the token that proves it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub user: UserIdentity,
    pub token: String,
}

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Grant, BackendError>;

    /// Create an account and sign it in
    async fn register(&self, credentials: &Credentials) -> Result<Grant, BackendError>;

    /// Re-validate a previously issued session without fresh credentials
    async fn resume(&self, stored: &StoredSession) -> Result<Grant, BackendError>;

    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError>;

    /// Change profile fields of the signed-in user, returning the updated identity
    async fn update_profile(
        &self,
        token: &str,
        user: &UserIdentity,
        display_name: &str,
    ) -> Result<UserIdentity, BackendError>;
}
