//! Session manager: the single owner of authentication state.
//!
//! All session-mutating operations go through `SessionManager`. State is
//! published through a `tokio::sync::watch` channel, so every transition is
//! visible to `snapshot()` and to subscribers before the mutating call
//! returns.
//!
//! Concurrency rules:
//! - At most one restore/login/register is in flight. Starting another one
//!   while it is pending fails with `AuthError::OperationInProgress`.
//! - Each operation captures a generation number when it starts. `logout`
//!   bumps the generation, so a pending operation that completes afterwards
//!   is discarded (`AuthError::Cancelled`) instead of resurrecting the session.
//! - Every backend call is bounded by `SessionConfig::operation_timeout`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{
    AuthError, Credentials, Session, SessionState, SessionStatus, SessionStore, StoredSession,
    UserIdentity,
};
use crate::backend::{BackendError, Grant, IdentityBackend};

/// Default bound on a single backend call.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 15;

/// Default delay of the development auto-login, matching the app's mock.
pub const DEFAULT_RESTORE_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Skip real restoration and sign in as `UserIdentity::placeholder()`
    pub auto_login_for_development: bool,
    pub operation_timeout: Duration,
    /// How long development auto-login pretends to check
    pub restore_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_login_for_development: false,
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            restore_delay: Duration::from_millis(DEFAULT_RESTORE_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SignIn {
    Login,
    Register,
}

impl SignIn {
    fn as_str(self) -> &'static str {
        match self {
            SignIn::Login => "login",
            SignIn::Register => "register",
        }
    }
}

/// Bookkeeping guarded by one lock; commits to the watch channel happen
/// while it is held so generation checks and writes can't interleave.
#[derive(Debug, Default)]
struct Control {
    generation: u64,
    in_flight: Option<u64>,
    token: Option<String>,
}

struct Inner {
    config: SessionConfig,
    backend: Arc<dyn IdentityBackend>,
    store: Arc<dyn SessionStore>,
    control: Mutex<Control>,
    state: watch::Sender<Session>,
}

/// Handle to the session of this process. Clone is cheap and shares state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn IdentityBackend>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(Inner {
                config,
                backend,
                store,
                control: Mutex::new(Control::default()),
                state,
            }),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status()
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.inner.state.borrow().current_user().cloned()
    }

    /// Receive every session transition from now on
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Re-establish a previous session at startup.
    ///
    /// Always ends in `Authenticated` or `Unauthenticated` unless a logout
    /// superseded it. Store or backend failures leave the session
    /// `Unauthenticated` and are reported as `SessionRestoreFailed`.
    /// A session that is already signed in is left alone
    /// (`AuthError::AlreadyAuthenticated`).
    pub async fn restore_session(&self) -> Result<SessionStatus, AuthError> {
        let generation = self.begin(true)?;
        info!(generation, "Restoring session");

        if self.inner.config.auto_login_for_development {
            tokio::time::sleep(self.inner.config.restore_delay).await;
            let user = UserIdentity::placeholder();
            self.finish(generation, |control| {
                control.token = None;
                Some(SessionState::Authenticated(user))
            })?;
            warn!("Development auto-login active, signed in as placeholder user");
            return Ok(SessionStatus::Authenticated);
        }

        let stored = match self.inner.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to load stored session");
                self.finish(generation, |_| Some(SessionState::Unauthenticated))?;
                return Err(AuthError::SessionRestoreFailed(format!("{:#}", e)));
            }
        };

        let stored = match stored {
            Some(stored) if !stored.is_expired() => stored,
            Some(_) => {
                debug!("Stored session expired");
                self.finish(generation, |_| {
                    self.clear_store();
                    Some(SessionState::Unauthenticated)
                })?;
                return Ok(SessionStatus::Unauthenticated);
            }
            None => {
                debug!("No stored session");
                self.finish(generation, |_| Some(SessionState::Unauthenticated))?;
                return Ok(SessionStatus::Unauthenticated);
            }
        };

        let limit = self.inner.config.operation_timeout;
        match timeout(limit, self.inner.backend.resume(&stored)).await {
            Ok(Ok(grant)) => {
                let user = grant.user.clone();
                self.finish(generation, |control| {
                    if grant.token != stored.token {
                        self.save_store(&StoredSession::new(grant.token.clone(), grant.user.clone()));
                    }
                    control.token = Some(grant.token);
                    Some(SessionState::Authenticated(grant.user))
                })?;
                info!(user_id = %user.id, "Session restored");
                Ok(SessionStatus::Authenticated)
            }
            Ok(Err(BackendError::Rejected(reason))) => {
                info!(reason = %reason, "Stored session rejected");
                self.finish(generation, |_| {
                    self.clear_store();
                    Some(SessionState::Unauthenticated)
                })?;
                Ok(SessionStatus::Unauthenticated)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Session restore failed");
                self.finish(generation, |_| Some(SessionState::Unauthenticated))?;
                Err(AuthError::restore_failed(e))
            }
            Err(_) => {
                warn!(timeout = ?limit, "Session restore timed out");
                self.finish(generation, |_| Some(SessionState::Unauthenticated))?;
                Err(AuthError::SessionRestoreFailed(format!(
                    "timed out after {:?}",
                    limit
                )))
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let credentials = Credentials::new(email, password);
        credentials.validate_for_login()?;
        self.sign_in(SignIn::Login, credentials).await
    }

    /// Create an account and sign in. Same failure semantics as `login`.
    pub async fn register(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let credentials = Credentials::new(email, password);
        credentials.validate_for_registration()?;
        self.sign_in(SignIn::Register, credentials).await
    }

    /// Sign out. Idempotent, and cancels any pending restore/login/register.
    pub fn logout(&self) {
        let mut control = self.control();
        control.generation += 1;
        control.in_flight = None;
        control.token = None;

        let signed_out = Session {
            state: SessionState::Unauthenticated,
            busy: false,
        };
        let changed = self.inner.state.send_if_modified(|session| {
            if *session == signed_out {
                false
            } else {
                *session = signed_out;
                true
            }
        });
        self.clear_store();

        if changed {
            info!(generation = control.generation, "Signed out");
        }
    }

    /// Ask the backend to email a password reset link. Session state is untouched.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        Credentials::validate_email(email)
            .map_err(|_| AuthError::InvalidInput("Enter a valid email address".to_string()))?;

        let limit = self.inner.config.operation_timeout;
        match timeout(limit, self.inner.backend.request_password_reset(email.trim())).await {
            Ok(Ok(())) => {
                info!("Password reset requested");
                Ok(())
            }
            Ok(Err(e)) => Err(AuthError::from_backend(e)),
            Err(_) => Err(AuthError::AuthenticationTimeout(limit)),
        }
    }

    /// Rename the signed-in user
    pub async fn update_display_name(&self, name: &str) -> Result<UserIdentity, AuthError> {
        Credentials::validate_display_name(name)?;

        let (generation, token, user) = {
            let control = self.control();
            let session = self.inner.state.borrow();
            let user = session
                .current_user()
                .cloned()
                .ok_or(AuthError::NotAuthenticated)?;
            (
                control.generation,
                control.token.clone().unwrap_or_default(),
                user,
            )
        };

        let limit = self.inner.config.operation_timeout;
        let updated = match timeout(
            limit,
            self.inner.backend.update_profile(&token, &user, name),
        )
        .await
        {
            Ok(Ok(updated)) => updated,
            Ok(Err(e)) => return Err(AuthError::from_backend(e)),
            Err(_) => return Err(AuthError::AuthenticationTimeout(limit)),
        };

        let control = self.control();
        if control.generation != generation {
            return Err(AuthError::Cancelled);
        }
        let committed = self.inner.state.send_if_modified(|session| match &session.state {
            SessionState::Authenticated(current) if current.id == updated.id => {
                session.state = SessionState::Authenticated(updated.clone());
                true
            }
            _ => false,
        });
        if !committed {
            return Err(AuthError::NotAuthenticated);
        }

        match self.inner.store.load() {
            Ok(Some(mut stored)) => {
                stored.user = updated.clone();
                self.save_store(&stored);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to load stored session"),
        }
        drop(control);

        info!(user_id = %updated.id, "Display name updated");
        Ok(updated)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn sign_in(&self, kind: SignIn, credentials: Credentials) -> Result<UserIdentity, AuthError> {
        let generation = self.begin(false)?;
        info!(op = kind.as_str(), email = %credentials.email, generation, "Signing in");

        let limit = self.inner.config.operation_timeout;
        let backend = &self.inner.backend;
        let result = match kind {
            SignIn::Login => timeout(limit, backend.authenticate(&credentials)).await,
            SignIn::Register => timeout(limit, backend.register(&credentials)).await,
        };

        match result {
            Ok(Ok(Grant { user, token })) => {
                let identity = user.clone();
                self.finish(generation, |control| {
                    self.save_store(&StoredSession::new(token.clone(), user.clone()));
                    control.token = Some(token);
                    Some(SessionState::Authenticated(user))
                })?;
                info!(op = kind.as_str(), user_id = %identity.id, "Signed in");
                Ok(identity)
            }
            Ok(Err(e)) => {
                warn!(op = kind.as_str(), error = %e, "Sign-in rejected");
                self.finish(generation, |_| None)?;
                Err(AuthError::from_backend(e))
            }
            Err(_) => {
                warn!(op = kind.as_str(), timeout = ?limit, "Sign-in timed out");
                self.finish(generation, |_| None)?;
                Err(AuthError::AuthenticationTimeout(limit))
            }
        }
    }

    /// Claim the in-flight slot and publish `busy` (and `Checking` for restore)
    fn begin(&self, checking: bool) -> Result<u64, AuthError> {
        let mut control = self.control();
        if control.in_flight.is_some() {
            debug!(in_flight = ?control.in_flight, "Rejecting concurrent session operation");
            return Err(AuthError::OperationInProgress);
        }
        // Restore only runs from Unknown/Unauthenticated
        if checking && self.inner.state.borrow().is_authenticated() {
            debug!("Session already authenticated, skipping restore");
            return Err(AuthError::AlreadyAuthenticated);
        }
        control.generation += 1;
        let generation = control.generation;
        control.in_flight = Some(generation);

        self.inner.state.send_modify(|session| {
            session.busy = true;
            if checking {
                session.state = SessionState::Checking;
            }
        });
        Ok(generation)
    }

    /// Commit the outcome of the operation started at `generation`.
    ///
    /// `apply` runs under the control lock and returns the new state, or
    /// `None` to keep the current one. Superseded operations are dropped.
    fn finish<F>(&self, generation: u64, apply: F) -> Result<(), AuthError>
    where
        F: FnOnce(&mut Control) -> Option<SessionState>,
    {
        let mut control = self.control();
        if control.generation != generation {
            debug!(generation, current = control.generation, "Discarding superseded result");
            return Err(AuthError::Cancelled);
        }
        control.in_flight = None;
        let next = apply(&mut control);

        self.inner.state.send_modify(|session| {
            if let Some(state) = next {
                session.state = state;
            }
            session.busy = false;
        });
        Ok(())
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        // Control holds plain values; a panic elsewhere can't leave it half-written
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn save_store(&self, stored: &StoredSession) {
        if let Err(e) = self.inner.store.save(stored) {
            warn!(error = %e, "Failed to save session");
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FileSessionStore, MemorySessionStore};
    use crate::backend::SimulatedBackend;
    use chrono::Utc;

    const LATENCY: Duration = Duration::from_millis(1000);

    struct Harness {
        manager: SessionManager,
        backend: Arc<SimulatedBackend>,
        store: Arc<MemorySessionStore>,
    }

    fn harness_with(config: SessionConfig, latency: Duration) -> Harness {
        let backend = Arc::new(SimulatedBackend::with_latency(latency));
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(
            config,
            backend.clone() as Arc<dyn IdentityBackend>,
            store.clone() as Arc<dyn SessionStore>,
        );
        Harness {
            manager,
            backend,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(SessionConfig::default(), LATENCY)
    }

    fn assert_invariant(session: &Session) {
        assert_eq!(
            session.current_user().is_some(),
            session.status() == SessionStatus::Authenticated
        );
    }

    // -------------------------------------------------------------------------
    // Login / Register
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_login_authenticates_with_derived_identity() {
        let h = harness();

        let user = h.manager.login("anna@example.com", "x").await.unwrap();

        assert_eq!(user.email, "anna@example.com");
        assert_eq!(user.display_name, "anna");
        assert!(!user.id.is_empty());

        let session = h.manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert_eq!(session.current_user(), Some(&user));
        assert!(!session.busy);
        assert_invariant(&session);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_rejects_email_without_domain_before_backend_call() {
        let h = harness();
        let start = tokio::time::Instant::now();

        let err = h.manager.login("bad", "").await.unwrap_err();

        assert!(matches!(err, AuthError::AuthenticationFailed(_)));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(h.manager.status(), SessionStatus::Unknown);
        assert!(!h.manager.snapshot().busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_login_keeps_previous_session() {
        let h = harness();
        let anna = h.manager.login("anna@example.com", "x").await.unwrap();

        h.backend
            .fail_next(BackendError::Rejected("wrong password".into()));
        let err = h.manager.login("boris@example.com", "y").await.unwrap_err();

        assert_eq!(err, AuthError::AuthenticationFailed("wrong password".into()));
        assert_eq!(h.manager.current_user(), Some(anna));
        assert!(!h.manager.snapshot().busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_times_out() {
        let config = SessionConfig {
            operation_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        };
        let h = harness_with(config, Duration::from_secs(60));

        let err = h.manager.login("anna@example.com", "x").await.unwrap_err();

        assert_eq!(err, AuthError::AuthenticationTimeout(Duration::from_secs(5)));
        let session = h.manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Unknown);
        assert!(!session.busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_login_is_rejected() {
        let h = harness();

        let (first, second) = futures::join!(
            h.manager.login("anna@example.com", "x"),
            h.manager.login("boris@example.com", "y"),
        );

        assert_eq!(first.unwrap().email, "anna@example.com");
        assert_eq!(second.unwrap_err(), AuthError::OperationInProgress);
        assert_eq!(
            h.manager.current_user().map(|u| u.email),
            Some("anna@example.com".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_enforces_password_length() {
        let h = harness();

        let err = h.manager.register("anna@example.com", "123").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed(_)));
        assert_eq!(h.manager.status(), SessionStatus::Unknown);

        let user = h.manager.register("anna@example.com", "123456").await.unwrap();
        assert_eq!(user.display_name, "anna");
        assert_eq!(h.manager.status(), SessionStatus::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_persists_and_logout_clears_store() {
        let h = harness();
        h.manager.login("anna@example.com", "x").await.unwrap();

        let stored = h.store.load().unwrap().expect("session should be stored");
        assert_eq!(stored.user.email, "anna@example.com");

        h.manager.logout();
        assert!(h.store.load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_rejected_by_backend_keeps_state() {
        let h = harness();
        h.backend
            .fail_next(BackendError::Rejected("email already taken".into()));

        let err = h.manager.register("anna@example.com", "secret1").await.unwrap_err();

        assert_eq!(err, AuthError::AuthenticationFailed("email already taken".into()));
        let session = h.manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Unknown);
        assert!(!session.busy);
        assert_invariant(&session);
        assert!(h.store.load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_times_out() {
        let config = SessionConfig {
            operation_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        };
        let h = harness_with(config, Duration::from_secs(30));
        h.manager.logout();

        let err = h.manager.register("anna@example.com", "secret1").await.unwrap_err();

        assert_eq!(err, AuthError::AuthenticationTimeout(Duration::from_secs(2)));
        let session = h.manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert!(!session.busy);
        assert_invariant(&session);
    }

    // -------------------------------------------------------------------------
    // Logout
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_logout_without_session_is_noop() {
        let h = harness();

        h.manager.logout();
        let once = h.manager.snapshot();
        assert_eq!(once.status(), SessionStatus::Unauthenticated);

        let mut rx = h.manager.subscribe();
        h.manager.logout();
        assert_eq!(h.manager.snapshot(), once);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_after_login() {
        let h = harness();
        h.manager.login("anna@example.com", "x").await.unwrap();

        h.manager.logout();

        let session = h.manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert!(session.current_user().is_none());
        assert_invariant(&session);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_during_pending_login_discards_result() {
        let h = harness();
        let manager = h.manager.clone();
        let pending = tokio::spawn(async move { manager.login("anna@example.com", "x").await });

        let mut rx = h.manager.subscribe();
        rx.wait_for(|s| s.busy).await.unwrap();
        h.manager.logout();

        let result = pending.await.unwrap();
        assert_eq!(result.unwrap_err(), AuthError::Cancelled);

        let session = h.manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert!(!session.busy);
        assert!(h.store.load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_allowed_after_logout_cancelled_pending_one() {
        let h = harness();
        let manager = h.manager.clone();
        let stale = tokio::spawn(async move { manager.login("anna@example.com", "x").await });

        let mut rx = h.manager.subscribe();
        rx.wait_for(|s| s.busy).await.unwrap();
        h.manager.logout();

        let fresh = h.manager.login("boris@example.com", "y").await.unwrap();
        assert_eq!(stale.await.unwrap().unwrap_err(), AuthError::Cancelled);
        assert_eq!(h.manager.current_user(), Some(fresh));
    }

    // -------------------------------------------------------------------------
    // Restore
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_restore_with_empty_store_is_unauthenticated() {
        let h = harness();

        let status = h.manager.restore_session().await.unwrap();

        assert_eq!(status, SessionStatus::Unauthenticated);
        assert_eq!(h.manager.status(), SessionStatus::Unauthenticated);
        assert!(!h.manager.snapshot().busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_auto_login_passes_through_checking() {
        let config = SessionConfig {
            auto_login_for_development: true,
            ..SessionConfig::default()
        };
        let h = harness_with(config, LATENCY);
        let manager = h.manager.clone();
        let mut rx = h.manager.subscribe();

        let restore = tokio::spawn(async move { manager.restore_session().await });

        rx.wait_for(|s| s.status() == SessionStatus::Checking)
            .await
            .unwrap();
        assert_eq!(restore.await.unwrap().unwrap(), SessionStatus::Authenticated);
        assert_eq!(h.manager.current_user(), Some(UserIdentity::placeholder()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_resumes_stored_session() {
        let h = harness();
        let grant = h
            .backend
            .authenticate(&Credentials::new("anna@example.com", "x"))
            .await
            .unwrap();
        h.store
            .save(&StoredSession::new(grant.token.clone(), grant.user.clone()))
            .unwrap();

        let status = h.manager.restore_session().await.unwrap();

        assert_eq!(status, SessionStatus::Authenticated);
        assert_eq!(h.manager.current_user(), Some(grant.user));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_with_revoked_token_clears_store() {
        let h = harness();
        let grant = h
            .backend
            .authenticate(&Credentials::new("anna@example.com", "x"))
            .await
            .unwrap();
        h.store
            .save(&StoredSession::new(grant.token.clone(), grant.user))
            .unwrap();
        h.backend.revoke(&grant.token);

        let status = h.manager.restore_session().await.unwrap();

        assert_eq!(status, SessionStatus::Unauthenticated);
        assert!(h.store.load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_backend_failure_does_not_stay_checking() {
        let h = harness();
        let user = UserIdentity::from_email("anna@example.com");
        h.store
            .save(&StoredSession::new("a".repeat(32), user))
            .unwrap();
        h.backend
            .fail_next(BackendError::Unavailable("no route to host".into()));

        let err = h.manager.restore_session().await.unwrap_err();

        assert!(matches!(err, AuthError::SessionRestoreFailed(_)));
        let session = h.manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert!(!session.busy);
        // Transient failure keeps the stored session for the next attempt
        assert!(h.store.load().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_clears_expired_session() {
        let h = harness();
        let mut stored =
            StoredSession::new("a".repeat(32), UserIdentity::from_email("anna@example.com"));
        stored.created_at = Utc::now() - chrono::Duration::days(60);
        h.store.save(&stored).unwrap();
        let start = tokio::time::Instant::now();

        let status = h.manager.restore_session().await.unwrap();

        assert_eq!(status, SessionStatus::Unauthenticated);
        // Expired sessions never reach the backend
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(h.store.load().unwrap().is_none());
        let session = h.manager.snapshot();
        assert!(!session.busy);
        assert_invariant(&session);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_deletes_expired_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileSessionStore::new(dir.path().to_path_buf()));
        let mut stored =
            StoredSession::new("a".repeat(32), UserIdentity::from_email("anna@example.com"));
        stored.created_at = Utc::now() - chrono::Duration::days(60);
        store.save(&stored).unwrap();
        let session_file = dir.path().join("session.json");
        assert!(session_file.exists());

        let manager = SessionManager::new(
            SessionConfig::default(),
            Arc::new(SimulatedBackend::with_latency(LATENCY)),
            store,
        );
        let status = manager.restore_session().await.unwrap();

        assert_eq!(status, SessionStatus::Unauthenticated);
        assert!(!session_file.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_with_corrupt_session_file_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session.json"), "{ not json").unwrap();
        let manager = SessionManager::new(
            SessionConfig::default(),
            Arc::new(SimulatedBackend::with_latency(LATENCY)),
            Arc::new(FileSessionStore::new(dir.path().to_path_buf())),
        );

        let err = manager.restore_session().await.unwrap_err();

        match err {
            AuthError::SessionRestoreFailed(msg) => assert!(msg.contains("parse")),
            other => panic!("unexpected error: {other:?}"),
        }
        let session = manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert!(!session.busy);
        assert_invariant(&session);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_times_out() {
        let config = SessionConfig {
            operation_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        };
        let h = harness_with(config, Duration::from_secs(60));
        let grant_user = UserIdentity::from_email("anna@example.com");
        h.store
            .save(&StoredSession::new("a".repeat(32), grant_user))
            .unwrap();

        let err = h.manager.restore_session().await.unwrap_err();

        assert_eq!(
            err,
            AuthError::SessionRestoreFailed("timed out after 500ms".to_string())
        );
        let session = h.manager.snapshot();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert!(!session.busy);
        assert_invariant(&session);
        // A slow backend is not a verdict on the token
        assert!(h.store.load().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_rejected_when_already_authenticated() {
        let h = harness();
        let anna = h.manager.login("anna@example.com", "x").await.unwrap();
        let mut rx = h.manager.subscribe();

        let err = h.manager.restore_session().await.unwrap_err();

        assert_eq!(err, AuthError::AlreadyAuthenticated);
        assert_eq!(h.manager.current_user(), Some(anna));
        assert!(!h.manager.snapshot().busy);
        // Never passed through Checking
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_runs_again_after_logout() {
        let h = harness();
        h.manager.login("anna@example.com", "x").await.unwrap();
        h.manager.logout();

        let status = h.manager.restore_session().await.unwrap();
        assert_eq!(status, SessionStatus::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_during_restore_wins() {
        let config = SessionConfig {
            auto_login_for_development: true,
            ..SessionConfig::default()
        };
        let h = harness_with(config, LATENCY);
        let manager = h.manager.clone();
        let restore = tokio::spawn(async move { manager.restore_session().await });

        let mut rx = h.manager.subscribe();
        rx.wait_for(|s| s.status() == SessionStatus::Checking)
            .await
            .unwrap();
        h.manager.logout();

        assert_eq!(restore.await.unwrap().unwrap_err(), AuthError::Cancelled);
        assert_eq!(h.manager.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_rejected_while_restoring() {
        let config = SessionConfig {
            auto_login_for_development: true,
            ..SessionConfig::default()
        };
        let h = harness_with(config, LATENCY);

        let (restored, login) = futures::join!(
            h.manager.restore_session(),
            h.manager.login("anna@example.com", "x"),
        );

        assert_eq!(restored.unwrap(), SessionStatus::Authenticated);
        assert_eq!(login.unwrap_err(), AuthError::OperationInProgress);
    }

    // -------------------------------------------------------------------------
    // Profile / password reset
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_update_display_name_requires_session() {
        let h = harness();
        let err = h.manager.update_display_name("Anna").await.unwrap_err();
        assert_eq!(err, AuthError::NotAuthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_display_name_updates_session_and_store() {
        let h = harness();
        h.manager.login("anna@example.com", "x").await.unwrap();

        let updated = h.manager.update_display_name("Anna K").await.unwrap();

        assert_eq!(updated.display_name, "Anna K");
        assert_eq!(h.manager.current_user(), Some(updated.clone()));
        assert_eq!(h.store.load().unwrap().unwrap().user, updated);

        let err = h.manager.update_display_name("A").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_display_name_discarded_after_logout() {
        let h = harness();
        h.manager.login("anna@example.com", "x").await.unwrap();

        let manager = h.manager.clone();
        let rename = tokio::spawn(async move { manager.update_display_name("Anna K").await });
        tokio::task::yield_now().await;
        h.manager.logout();

        assert_eq!(rename.await.unwrap().unwrap_err(), AuthError::Cancelled);
        assert!(h.manager.current_user().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_password_reset() {
        let h = harness();

        let err = h.manager.request_password_reset("nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));

        h.manager
            .request_password_reset("anna@example.com")
            .await
            .unwrap();
        assert_eq!(h.manager.status(), SessionStatus::Unknown);
    }
}
