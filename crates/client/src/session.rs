//! Per-username session state
//!
//! One [`SessionState`] exists per username, shared by every version-scoped
//! agent for that username. It owns the header map carrying the current
//! access token, the refresh token, and the login attempt counter, plus the
//! gate that keeps at most one login in flight per username: concurrent
//! callers queue behind the gate and re-check the token instead of racing
//! independent logins.

use crate::http::OAUTH_TOKEN_HEADER;
use crate::retry::TokenResponse;
use crate::Error;
use std::collections::HashMap;
use std::sync::Mutex;

/// Maximum number of login attempts per identity before the session is
/// terminally failed.
pub const MAX_LOGIN_ATTEMPTS: u32 = 3;

#[derive(Debug, Default)]
struct SessionInner {
    headers: HashMap<String, String>,
    refresh_token: Option<String>,
    attempts: u32,
}

/// Shared token/login bookkeeping for one username
///
/// All mutation happens through completion callbacks of awaited operations;
/// the login gate is the only cross-task synchronization point.
#[derive(Debug)]
pub struct SessionState {
    username: String,
    login_gate: tokio::sync::Mutex<()>,
    inner: Mutex<SessionInner>,
}

impl SessionState {
    /// Create empty session state for a username
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            login_gate: tokio::sync::Mutex::new(()),
            inner: Mutex::new(SessionInner::default()),
        }
    }

    /// The username this state belongs to
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Gate serializing login attempts for this username
    ///
    /// Hold the guard across the whole login exchange; waiters must re-check
    /// [`access_token`](Self::access_token) once they acquire it.
    pub fn login_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.login_gate
    }

    /// Snapshot of the session headers (includes the access token once
    /// logged in)
    pub fn headers(&self) -> HashMap<String, String> {
        self.inner.lock().unwrap().headers.clone()
    }

    /// The current access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .headers
            .get(OAUTH_TOKEN_HEADER)
            .cloned()
    }

    /// The current refresh token, if any
    pub fn refresh_token(&self) -> Option<String> {
        self.inner.lock().unwrap().refresh_token.clone()
    }

    /// Store tokens from a login or refresh response
    pub fn store_tokens(&self, token: &TokenResponse) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .headers
            .insert(OAUTH_TOKEN_HEADER.to_string(), token.access_token.clone());
        inner.refresh_token = Some(token.refresh_token.clone());
    }

    /// Count a login attempt
    ///
    /// Increments the attempt counter and fails with
    /// [`Error::MaxLoginAttemptsExceeded`] once the ceiling is exceeded. The
    /// counter is not rolled back on failure, so the session stays terminally
    /// failed until [`reset_attempts`](Self::reset_attempts) or a context
    /// reset.
    pub fn record_attempt(&self) -> Result<u32, Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.attempts += 1;
        if inner.attempts > MAX_LOGIN_ATTEMPTS {
            return Err(Error::MaxLoginAttemptsExceeded(self.username.clone()));
        }
        Ok(inner.attempts)
    }

    /// Reset the attempt counter after a successful login
    pub fn reset_attempts(&self) {
        self.inner.lock().unwrap().attempts = 0;
    }

    /// Current value of the attempt counter
    pub fn attempts(&self) -> u32 {
        self.inner.lock().unwrap().attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(access: &str, refresh: &str) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[test]
    fn test_new_session_is_logged_out() {
        let session = SessionState::new("jane");
        assert_eq!(session.username(), "jane");
        assert!(session.access_token().is_none());
        assert!(session.refresh_token().is_none());
        assert_eq!(session.attempts(), 0);
        assert!(session.headers().is_empty());
    }

    #[test]
    fn test_store_tokens_populates_headers() {
        let session = SessionState::new("jane");
        session.store_tokens(&token("access-1", "refresh-1"));

        assert_eq!(session.access_token(), Some("access-1".to_string()));
        assert_eq!(session.refresh_token(), Some("refresh-1".to_string()));
        assert_eq!(
            session.headers().get(OAUTH_TOKEN_HEADER),
            Some(&"access-1".to_string())
        );

        // A refresh replaces both tokens.
        session.store_tokens(&token("access-2", "refresh-2"));
        assert_eq!(session.access_token(), Some("access-2".to_string()));
        assert_eq!(session.refresh_token(), Some("refresh-2".to_string()));
    }

    #[test]
    fn test_attempt_ceiling_is_terminal() {
        let session = SessionState::new("jane");

        assert_eq!(session.record_attempt().unwrap(), 1);
        assert_eq!(session.record_attempt().unwrap(), 2);
        assert_eq!(session.record_attempt().unwrap(), 3);

        let err = session.record_attempt().unwrap_err();
        assert!(matches!(err, Error::MaxLoginAttemptsExceeded(ref user) if user == "jane"));

        // Still failed on the next call; the counter never rolls back.
        assert!(session.record_attempt().is_err());
    }

    #[test]
    fn test_reset_attempts_reopens_the_session() {
        let session = SessionState::new("jane");
        for _ in 0..3 {
            session.record_attempt().unwrap();
        }
        assert!(session.record_attempt().is_err());

        session.reset_attempts();
        assert_eq!(session.record_attempt().unwrap(), 1);
    }
}
