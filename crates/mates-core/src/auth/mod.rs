//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionManager`: the single owner of session state and its transitions
//! - `Session`: the observable snapshot (status, current user, busy flag)
//! - `SessionStore`: where a signed-in session is kept between restarts
//! - `UserIdentity` / `Credentials`: the signed-in principal and login input
//!
//! Sessions live in memory by default. A file-backed store can be enabled
//! through configuration; stored tokens expire after 30 days.

pub mod error;
pub mod identity;
pub mod manager;
pub mod session;
pub mod store;

pub use error::AuthError;
pub use identity::{Credentials, UserIdentity};
pub use manager::{SessionConfig, SessionManager};
pub use session::{Session, SessionState, SessionStatus, StoredSession};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
