use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;

/// Minimum password length accepted when creating an account
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Minimum display name length (after trimming)
pub const MIN_DISPLAY_NAME_LENGTH: usize = 3;

/// Number of leading characters left visible by `masked_email`
const MASK_VISIBLE_CHARS: usize = 2;

/// The signed-in principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

impl UserIdentity {
    /// Build an identity from an email address.
    ///
    /// The id is a UUIDv5 of the normalised email, so the same address always
    /// maps to the same id. The display name is the part before the first `@`.
    pub fn from_email(email: &str) -> Self {
        let email = email.trim();
        let normalized = email.to_lowercase();
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, normalized.as_bytes()).to_string();
        let display_name = email.split('@').next().unwrap_or(email).to_string();

        Self {
            id,
            email: email.to_string(),
            display_name,
        }
    }

    /// Identity used when development auto-login is enabled
    pub fn placeholder() -> Self {
        Self {
            id: "1".to_string(),
            email: "user@example.com".to_string(),
            display_name: "User".to_string(),
        }
    }

    /// Email with most of the local part hidden, e.g. `an**@example.com`
    pub fn masked_email(&self) -> String {
        match self.email.split_once('@') {
            Some((local, domain)) => {
                let len = local.chars().count();
                let masked = if len > MASK_VISIBLE_CHARS {
                    let visible: String = local.chars().take(MASK_VISIBLE_CHARS).collect();
                    format!("{}{}", visible, "*".repeat(len - MASK_VISIBLE_CHARS))
                } else {
                    local.to_string()
                };
                format!("{}@{}", masked, domain)
            }
            None => self.email.clone(),
        }
    }

    /// Copy of this identity with a new display name
    pub fn with_display_name(&self, display_name: &str) -> Self {
        Self {
            display_name: display_name.trim().to_string(),
            ..self.clone()
        }
    }
}

/// Email/password pair submitted to login or register.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        }
    }

    /// Check that an email has a non-empty local part and domain around a single `@`
    pub fn validate_email(email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }
            None => false,
        };

        if valid {
            Ok(())
        } else {
            Err(AuthError::AuthenticationFailed(format!(
                "invalid email address: {:?}",
                email
            )))
        }
    }

    /// Validation applied before a login attempt
    pub fn validate_for_login(&self) -> Result<(), AuthError> {
        Self::validate_email(&self.email)
    }

    /// Validation applied before creating an account
    pub fn validate_for_registration(&self) -> Result<(), AuthError> {
        Self::validate_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::AuthenticationFailed(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }

    pub fn validate_display_name(name: &str) -> Result<(), AuthError> {
        if name.trim().chars().count() < MIN_DISPLAY_NAME_LENGTH {
            return Err(AuthError::InvalidInput(format!(
                "Display name must be at least {} characters",
                MIN_DISPLAY_NAME_LENGTH
            )));
        }
        Ok(())
    }
}
