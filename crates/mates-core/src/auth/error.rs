use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendError;

/// Maximum length for backend messages carried inside an error
const MAX_ERROR_DETAIL_LENGTH: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authentication timed out after {0:?}")]
    AuthenticationTimeout(Duration),

    #[error("Session restore failed: {0}")]
    SessionRestoreFailed(String),

    #[error("Another sign-in operation is already in progress")]
    OperationInProgress,

    #[error("Operation cancelled by logout")]
    Cancelled,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Already signed in")]
    AlreadyAuthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AuthError {
    /// Truncate backend detail so a misbehaving backend can't flood logs or UI
    fn truncate_detail(detail: &str) -> String {
        if detail.chars().count() <= MAX_ERROR_DETAIL_LENGTH {
            detail.to_string()
        } else {
            let head: String = detail.chars().take(MAX_ERROR_DETAIL_LENGTH).collect();
            format!("{}... (truncated)", head)
        }
    }

    /// Map a backend failure during login/register
    pub fn from_backend(err: BackendError) -> Self {
        match err {
            BackendError::Rejected(msg) | BackendError::Unavailable(msg) => {
                AuthError::AuthenticationFailed(Self::truncate_detail(&msg))
            }
        }
    }

    /// Map a backend failure during session restore
    pub fn restore_failed(err: BackendError) -> Self {
        AuthError::SessionRestoreFailed(Self::truncate_detail(&err.to_string()))
    }

    /// Short message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            AuthError::AuthenticationFailed(_) => "Invalid email or password".to_string(),
            AuthError::AuthenticationTimeout(_) => {
                "Connection timed out. Please try again.".to_string()
            }
            AuthError::SessionRestoreFailed(_) => {
                "Could not restore your session. Please sign in again.".to_string()
            }
            AuthError::OperationInProgress => "Please wait, already signing in".to_string(),
            AuthError::Cancelled => "Signed out".to_string(),
            AuthError::NotAuthenticated => "Please sign in first".to_string(),
            AuthError::AlreadyAuthenticated => "You are already signed in".to_string(),
            AuthError::InvalidInput(reason) => reason.clone(),
        }
    }
}
