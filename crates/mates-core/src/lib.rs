//! MatesEvents core library.
//!
//! Owns the client-side authentication state of a running MatesEvents
//! instance. Front ends (the mobile UI, the `mates` terminal client) read
//! session snapshots and call the `SessionManager` operations; they never
//! mutate session state directly.

pub mod auth;
pub mod backend;
pub mod config;

pub use auth::{
    AuthError, Credentials, FileSessionStore, MemorySessionStore, Session, SessionConfig,
    SessionManager, SessionState, SessionStatus, SessionStore, StoredSession, UserIdentity,
};
pub use backend::{BackendError, Grant, IdentityBackend, SimulatedBackend};
pub use config::Config;
