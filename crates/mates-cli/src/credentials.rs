//! Remembered passwords in the OS keychain.
//!
//! Entries live under the `mates-events` service and are keyed by the
//! normalised email, so `Anna@Example.com` and `anna@example.com ` share one
//! entry, matching how user ids are derived.

use anyhow::{Context, Result};
use keyring::Entry;

use mates_core::config::APP_NAME;

pub struct CredentialStore;

impl CredentialStore {
    /// Keychain account name for an email
    fn account(email: &str) -> String {
        email.trim().to_lowercase()
    }

    fn entry(email: &str) -> Result<Entry> {
        Entry::new(APP_NAME, &Self::account(email)).context("Failed to create keyring entry")
    }

    /// Store the password for an email, replacing any previous one
    pub fn store(email: &str, password: &str) -> Result<()> {
        Self::entry(email)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Retrieve the remembered password for an email
    pub fn get_password(email: &str) -> Result<String> {
        Self::entry(email)?
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Forget the remembered password for an email
    pub fn delete(email: &str) -> Result<()> {
        Self::entry(email)?
            .delete_credential()
            .context("Failed to delete credential from keychain")
    }

    /// Check whether a password is remembered for an email
    pub fn has_credentials(email: &str) -> bool {
        Self::entry(email)
            .and_then(|entry| entry.get_password().map_err(Into::into))
            .is_ok()
    }
}
