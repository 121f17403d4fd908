use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::errors::AuthError;
use crate::provider::{AuthChange, AuthProvider, Principal};

/// Scriptable provider for deterministic tests.
///
/// `sign_in` pops pre-programmed results in order and fails once they run
/// out. `current_session` returns a fixed result. External provider events
/// are simulated with [`MockAuthProvider::emit`].
pub struct MockAuthProvider {
    sign_in_results: Mutex<VecDeque<Result<Principal, AuthError>>>,
    current: Mutex<Result<Option<Principal>, AuthError>>,
    sign_out_error: Mutex<Option<AuthError>>,
    changes: broadcast::Sender<AuthChange>,
    sign_in_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl MockAuthProvider {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            sign_in_results: Mutex::new(VecDeque::new()),
            current: Mutex::new(Ok(None)),
            sign_out_error: Mutex::new(None),
            changes,
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    /// Provider that already holds a session for `principal`.
    pub fn signed_in(principal: Principal) -> Self {
        let mock = Self::new();
        mock.set_current_session(Ok(Some(principal)));
        mock
    }

    pub fn push_sign_in(&self, result: Result<Principal, AuthError>) {
        self.sign_in_results.lock().push_back(result);
    }

    pub fn set_current_session(&self, result: Result<Option<Principal>, AuthError>) {
        *self.current.lock() = result;
    }

    /// Make every later `sign_out` fail with `error`.
    pub fn fail_sign_out(&self, error: AuthError) {
        *self.sign_out_error.lock() = Some(error);
    }

    /// Broadcast a provider change as if it came from elsewhere.
    pub fn emit(&self, change: AuthChange) {
        let _ = self.changes.send(change);
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn sign_in(&self) -> Result<Principal, AuthError> {
        let idx = self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.sign_in_results.lock().pop_front().unwrap_or_else(|| {
            Err(AuthError::Rejected(format!(
                "MockAuthProvider: no sign-in result configured for call {idx}"
            )))
        });
        if let Ok(principal) = &result {
            *self.current.lock() = Ok(Some(principal.clone()));
        }
        result
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let _ = self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.sign_out_error.lock().clone() {
            return Err(error);
        }
        *self.current.lock() = Ok(None);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Principal>, AuthError> {
        self.current.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}
