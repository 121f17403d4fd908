//! Absolute-lifetime session tracking.
//!
//! A [`SessionManager`] is one tab's view of the signed-in principal. The
//! login time lives in the shared [`DurableStore`] so every tab agrees on
//! when the session ends; each manager arms its own expiry timer from it.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::errors::SessionError;
use crate::provider::{AuthChange, AuthProvider, Principal};
use crate::storage::{DurableStore, StorageEvent, StorageEvents};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_LOGIN_AT_KEY: &str = "auth:loginAt";

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Lifetime measured from login, regardless of activity.
    pub max_age: Duration,
    /// Durable store key holding the login time in epoch milliseconds.
    pub login_at_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            login_at_key: DEFAULT_LOGIN_AT_KEY.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated {
        principal: Principal,
        login_at_ms: i64,
    },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated { principal, .. } => Some(principal),
            SessionState::Unauthenticated => None,
        }
    }

    pub fn login_at_ms(&self) -> Option<i64> {
        match self {
            SessionState::Authenticated { login_at_ms, .. } => Some(*login_at_ms),
            SessionState::Unauthenticated => None,
        }
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    SignOut,
    Expired,
    /// Another tab removed the login time.
    OtherTab,
    /// The provider reported the sign-out itself.
    Provider,
}

impl EndReason {
    fn notifies_provider(self) -> bool {
        !matches!(self, EndReason::Provider)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::SignOut => "sign_out",
            EndReason::Expired => "expired",
            EndReason::OtherTab => "other_tab",
            EndReason::Provider => "provider",
        };
        f.write_str(s)
    }
}

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    config: SessionConfig,
    provider: Arc<dyn AuthProvider>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<SessionState>,
    timer: Mutex<TimerSlot>,
    listener: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Inner {
    /// Stored login time. A value that does not parse counts as the epoch,
    /// which is always expired.
    fn stored_login_at(&self) -> Option<i64> {
        let raw = self.store.get(&self.config.login_at_key)?;
        Some(parse_login_at(&raw))
    }

    fn remaining_from(&self, login_at_ms: i64) -> Option<Duration> {
        remaining_at(login_at_ms, self.config.max_age, self.clock.now_ms())
    }

    async fn on_authenticated(self: &Arc<Self>, principal: Principal) -> Result<(), SessionError> {
        let login_at_ms = match self.stored_login_at() {
            Some(ms) => ms,
            None => {
                let now = self.clock.now_ms();
                self.store.set(&self.config.login_at_key, &now.to_string())?;
                now
            }
        };

        info!(principal = %principal.id, login_at_ms, "session authenticated");
        let next = SessionState::Authenticated {
            principal,
            login_at_ms,
        };
        let _ = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });

        self.arm_timer(login_at_ms).await
    }

    async fn arm_timer(self: &Arc<Self>, login_at_ms: i64) -> Result<(), SessionError> {
        match self.remaining_from(login_at_ms) {
            Some(remaining) => {
                self.schedule_expiry(remaining);
                Ok(())
            }
            None => {
                info!(login_at_ms, "session already past its lifetime");
                self.end_session(EndReason::Expired).await
            }
        }
    }

    fn schedule_expiry(self: &Arc<Self>, remaining: Duration) {
        let mut slot = self.timer.lock();
        slot.generation += 1;
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }

        let generation = slot.generation;
        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        slot.handle = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(remaining) => {
                    let Some(inner) = weak.upgrade() else { return };
                    if !inner.release_timer(generation) {
                        return;
                    }
                    if let Err(e) = inner.end_session(EndReason::Expired).await {
                        warn!(error = %e, "provider sign-out after expiry failed");
                    }
                }
            }
        }));
        debug!(remaining_ms = remaining.as_millis() as u64, generation, "expiry timer armed");
    }

    /// Called by a firing timer: empties the slot if it still belongs to
    /// `generation`, without aborting the caller.
    fn release_timer(&self, generation: u64) -> bool {
        let mut slot = self.timer.lock();
        if slot.generation != generation {
            return false;
        }
        slot.handle = None;
        true
    }

    fn clear_timer(&self) {
        let mut slot = self.timer.lock();
        slot.generation += 1;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }

    async fn end_session(&self, reason: EndReason) -> Result<(), SessionError> {
        let mut was_authenticated = false;
        let _ = self.state.send_if_modified(|state| {
            was_authenticated = state.is_authenticated();
            *state = SessionState::Unauthenticated;
            was_authenticated
        });
        self.clear_timer();
        let removed = self.store.remove(&self.config.login_at_key);

        if was_authenticated {
            info!(%reason, "session ended");
            if reason.notifies_provider() {
                self.provider.sign_out().await?;
            }
        }
        removed?;
        Ok(())
    }

    async fn handle_auth_change(self: &Arc<Self>, change: AuthChange) {
        let result = match change {
            AuthChange::SignedIn(principal) => self.on_authenticated(principal).await,
            AuthChange::SignedOut => {
                // A sign-out delivered after a newer sign-in is stale.
                if let Ok(Some(_)) = self.provider.current_session().await {
                    debug!("ignoring provider sign-out, provider still has a session");
                    return;
                }
                self.end_session(EndReason::Provider).await
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to apply provider change");
        }
    }

    async fn handle_storage_event(self: &Arc<Self>, event: StorageEvent) {
        if event.key != self.config.login_at_key {
            return;
        }

        let result = match event.new_value {
            None => self.end_session(EndReason::OtherTab).await,
            Some(raw) => {
                let login_at_ms = parse_login_at(&raw);
                let mut updated = false;
                let _ = self.state.send_if_modified(|state| match state {
                    SessionState::Authenticated {
                        login_at_ms: current,
                        ..
                    } => {
                        updated = *current != login_at_ms;
                        *current = login_at_ms;
                        updated
                    }
                    SessionState::Unauthenticated => false,
                });
                if updated {
                    debug!(login_at_ms, "login time changed by another tab");
                    self.arm_timer(login_at_ms).await
                } else {
                    Ok(())
                }
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to apply storage change");
        }
    }
}

/// One tab's session lifecycle.
///
/// Dropping the manager stops its listener and pending timer; it does not
/// sign the principal out.
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn AuthProvider>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        Self::with_clock(config, provider, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SessionConfig,
        provider: Arc<dyn AuthProvider>,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                store,
                clock,
                state,
                timer: Mutex::new(TimerSlot::default()),
                listener: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Restore the provider's existing session and start listening for
    /// provider and cross-tab changes.
    ///
    /// An unreachable provider is not an error: the manager stays signed
    /// out and clears any stale login time.
    pub async fn start(&self) -> Result<(), SessionError> {
        let changes = self.inner.provider.subscribe();
        let storage = self.inner.store.subscribe();
        self.spawn_listener(changes, storage);

        match self.inner.provider.current_session().await {
            Ok(Some(principal)) => self.inner.on_authenticated(principal).await,
            Ok(None) => self.inner.end_session(EndReason::SignOut).await,
            Err(e) => {
                warn!(error = %e, "auth provider unavailable, continuing signed out");
                self.inner.end_session(EndReason::SignOut).await
            }
        }
    }

    fn spawn_listener(&self, mut changes: broadcast::Receiver<AuthChange>, mut storage: StorageEvents) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut provider_open = true;
            let mut storage_open = true;
            while provider_open || storage_open {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.recv(), if provider_open => match change {
                        Ok(change) => {
                            let Some(inner) = weak.upgrade() else { break };
                            inner.handle_auth_change(change).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "provider changes lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => provider_open = false,
                    },
                    event = storage.recv(), if storage_open => match event {
                        Some(event) => {
                            let Some(inner) = weak.upgrade() else { break };
                            inner.handle_storage_event(event).await;
                        }
                        None => storage_open = false,
                    },
                }
            }
            debug!("session listener stopped");
        });

        if let Some(previous) = self.inner.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Sign in through the provider. On failure the state is unchanged.
    pub async fn sign_in(&self) -> Result<Principal, SessionError> {
        let principal = self.inner.provider.sign_in().await?;
        self.inner.on_authenticated(principal.clone()).await?;
        Ok(principal)
    }

    /// End the session. Local state is cleared even when the provider call
    /// fails; the provider error is still returned.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.inner.end_session(EndReason::SignOut).await
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Time left before expiry, `None` when signed out.
    pub fn remaining(&self) -> Option<Duration> {
        let login_at_ms = self.inner.state.borrow().login_at_ms()?;
        Some(self.inner.remaining_from(login_at_ms).unwrap_or(Duration::ZERO))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Stop the listener and any pending timer.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.clear_timer();
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn parse_login_at(raw: &str) -> i64 {
    match raw.trim().parse::<i64>() {
        Ok(ms) => ms,
        Err(_) => {
            warn!(value = raw, "unreadable login time, treating as expired");
            0
        }
    }
}

fn remaining_at(login_at_ms: i64, max_age: Duration, now_ms: i64) -> Option<Duration> {
    let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    let remain = login_at_ms.saturating_add(max_age_ms).saturating_sub(now_ms);
    (remain > 0).then(|| Duration::from_millis(remain as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    #[test]
    fn remaining_counts_down_from_login() {
        let remaining = remaining_at(0, DEFAULT_MAX_AGE, HOUR_MS / 2);
        assert_eq!(remaining, Some(Duration::from_millis((HOUR_MS * 3 / 2) as u64)));
    }

    #[test]
    fn remaining_is_none_at_or_after_deadline() {
        assert_eq!(remaining_at(0, DEFAULT_MAX_AGE, 2 * HOUR_MS), None);
        assert_eq!(remaining_at(0, DEFAULT_MAX_AGE, 3 * HOUR_MS), None);
    }

    #[test]
    fn future_login_time_extends_remaining() {
        let remaining = remaining_at(HOUR_MS, DEFAULT_MAX_AGE, 0);
        assert_eq!(remaining, Some(Duration::from_millis((3 * HOUR_MS) as u64)));
    }

    #[test]
    fn unreadable_login_time_is_epoch() {
        assert_eq!(parse_login_at("not-a-number"), 0);
        assert_eq!(parse_login_at(" 1700000000000 "), 1_700_000_000_000);
    }

    #[test]
    fn only_provider_reported_sign_out_skips_provider_call() {
        assert!(EndReason::SignOut.notifies_provider());
        assert!(EndReason::Expired.notifies_provider());
        assert!(EndReason::OtherTab.notifies_provider());
        assert!(!EndReason::Provider.notifies_provider());
    }

    #[test]
    fn state_accessors() {
        let state = SessionState::Authenticated {
            principal: Principal::new(filmlog_core::PrincipalId::from_raw("usr_a")),
            login_at_ms: 5,
        };
        assert!(state.is_authenticated());
        assert_eq!(state.login_at_ms(), Some(5));
        assert_eq!(state.principal().map(|p| p.id.as_str()), Some("usr_a"));
        assert_eq!(SessionState::Unauthenticated.principal(), None);
    }
}
