//! Session lifecycle across provider, timer, and tabs sharing one store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use filmlog_core::PrincipalId;
use filmlog_session::{
    AuthChange, AuthError, DurableStore, LocalStorage, ManualClock, MockAuthProvider, Principal,
    SessionConfig, SessionError, SessionManager, SessionState, Tab,
};

const TIMEOUT: Duration = Duration::from_secs(5);
const KEY: &str = "auth:loginAt";
const NOW: i64 = 1_760_000_000_000;
const MINUTE_MS: i64 = 60 * 1000;
const MAX_AGE: Duration = Duration::from_secs(2 * 60 * 60);

fn owner() -> Principal {
    Principal::new(PrincipalId::from_raw("usr_owner"))
}

struct Fixture {
    origin: LocalStorage,
    provider: Arc<MockAuthProvider>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new(provider: MockAuthProvider) -> Self {
        Self {
            origin: LocalStorage::in_memory(),
            provider: Arc::new(provider),
            clock: Arc::new(ManualClock::new(NOW)),
        }
    }

    fn manager_on(&self, tab: Tab) -> SessionManager {
        SessionManager::with_clock(
            SessionConfig::default(),
            self.provider.clone(),
            Arc::new(tab),
            self.clock.clone(),
        )
    }

    fn manager(&self) -> SessionManager {
        self.manager_on(self.origin.tab())
    }

    fn stored(&self) -> Option<String> {
        self.origin.tab().get(KEY)
    }
}

async fn wait_until(
    rx: &mut watch::Receiver<SessionState>,
    done: impl FnMut(&SessionState) -> bool,
) {
    timeout(TIMEOUT, rx.wait_for(done))
        .await
        .expect("state change timed out")
        .expect("manager dropped");
}

#[tokio::test]
async fn expired_login_time_at_start_signs_out_without_user_action() {
    let fx = Fixture::new(MockAuthProvider::signed_in(owner()));
    fx.origin
        .tab()
        .set(KEY, &(NOW - 3 * 60 * MINUTE_MS).to_string())
        .unwrap();

    let manager = fx.manager();
    manager.start().await.unwrap();

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(fx.stored(), None);
    assert_eq!(fx.provider.sign_out_calls(), 1);
    assert_eq!(manager.remaining(), None);
}

#[tokio::test]
async fn login_time_one_ms_past_max_age_signs_out_at_start() {
    let fx = Fixture::new(MockAuthProvider::signed_in(owner()));
    let max_age_ms = MAX_AGE.as_millis() as i64;
    fx.origin
        .tab()
        .set(KEY, &(NOW - (max_age_ms + 1)).to_string())
        .unwrap();

    let manager = fx.manager();
    manager.start().await.unwrap();

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(fx.stored(), None);
    assert_eq!(fx.provider.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn login_time_one_ms_inside_max_age_stays_signed_in() {
    let fx = Fixture::new(MockAuthProvider::signed_in(owner()));
    let login_at = NOW - MAX_AGE.as_millis() as i64 + 1;
    fx.origin.tab().set(KEY, &login_at.to_string()).unwrap();

    let manager = fx.manager();
    manager.start().await.unwrap();

    assert_eq!(manager.state().login_at_ms(), Some(login_at));
    assert_eq!(fx.stored(), Some(login_at.to_string()));
    assert_eq!(fx.provider.sign_out_calls(), 0);
    assert_eq!(manager.remaining(), Some(Duration::from_millis(1)));
}

#[tokio::test]
async fn start_restores_session_and_preserves_login_time() {
    let fx = Fixture::new(MockAuthProvider::signed_in(owner()));
    let login_at = NOW - 30 * MINUTE_MS;
    fx.origin.tab().set(KEY, &login_at.to_string()).unwrap();

    let manager = fx.manager();
    manager.start().await.unwrap();

    assert_eq!(
        manager.state(),
        SessionState::Authenticated {
            principal: owner(),
            login_at_ms: login_at,
        }
    );
    assert_eq!(fx.stored(), Some(login_at.to_string()));
    assert_eq!(manager.remaining(), Some(Duration::from_secs(90 * 60)));
}

#[tokio::test]
async fn sign_in_with_existing_timestamp_keeps_it() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider.push_sign_in(Ok(owner()));
    let login_at = NOW - 10 * MINUTE_MS;
    fx.origin.tab().set(KEY, &login_at.to_string()).unwrap();

    let manager = fx.manager();
    let principal = manager.sign_in().await.unwrap();

    assert_eq!(principal, owner());
    assert_eq!(manager.state().login_at_ms(), Some(login_at));
    assert_eq!(fx.stored(), Some(login_at.to_string()));
}

#[tokio::test]
async fn fresh_sign_in_records_now() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider.push_sign_in(Ok(owner()));

    let manager = fx.manager();
    manager.start().await.unwrap();
    manager.sign_in().await.unwrap();

    assert_eq!(fx.stored(), Some(NOW.to_string()));
    assert_eq!(manager.remaining(), Some(MAX_AGE));
}

#[tokio::test]
async fn start_without_provider_session_clears_stale_login_time() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.origin.tab().set(KEY, &NOW.to_string()).unwrap();

    let manager = fx.manager();
    manager.start().await.unwrap();

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(fx.stored(), None);
    assert_eq!(fx.provider.sign_out_calls(), 0);
}

#[tokio::test]
async fn unreachable_provider_degrades_to_signed_out() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider
        .set_current_session(Err(AuthError::Unavailable("offline".into())));
    fx.origin.tab().set(KEY, &NOW.to_string()).unwrap();

    let manager = fx.manager();
    manager.start().await.unwrap();

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(fx.stored(), None);
}

#[tokio::test(start_paused = true)]
async fn timer_ends_session_at_max_age() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider.push_sign_in(Ok(owner()));
    let manager = fx.manager();
    manager.sign_in().await.unwrap();

    let mut rx = manager.subscribe();
    let early = timeout(
        MAX_AGE - Duration::from_secs(1),
        rx.wait_for(|s| !s.is_authenticated()),
    )
    .await;
    assert!(early.is_err(), "session ended before its lifetime");
    drop(early);

    wait_until(&mut rx, |s| !s.is_authenticated()).await;
    assert_eq!(fx.stored(), None);
    assert_eq!(fx.provider.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_timer() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider.push_sign_in(Ok(owner()));
    let manager = fx.manager();
    manager.sign_in().await.unwrap();

    manager.shutdown();
    tokio::time::sleep(MAX_AGE * 2).await;

    assert!(manager.state().is_authenticated());
    assert_eq!(fx.provider.sign_out_calls(), 0);
    assert_eq!(fx.stored(), Some(NOW.to_string()));
}

#[tokio::test]
async fn removal_in_another_tab_signs_this_tab_out() {
    let fx = Fixture::new(MockAuthProvider::signed_in(owner()));
    let tab_a = fx.manager();
    let tab_b = fx.manager();
    tab_a.start().await.unwrap();
    tab_b.start().await.unwrap();
    assert!(tab_b.state().is_authenticated());

    let mut rx = tab_b.subscribe();
    tab_a.sign_out().await.unwrap();

    wait_until(&mut rx, |s| !s.is_authenticated()).await;
    assert_eq!(tab_b.remaining(), None);
    assert_eq!(fx.stored(), None);
}

#[tokio::test(start_paused = true)]
async fn removal_in_another_tab_cancels_the_timer() {
    let fx = Fixture::new(MockAuthProvider::signed_in(owner()));
    let tab_a = fx.manager();
    let tab_b = fx.manager();
    tab_a.start().await.unwrap();
    tab_b.start().await.unwrap();

    let mut rx = tab_b.subscribe();
    tab_a.sign_out().await.unwrap();
    wait_until(&mut rx, |s| !s.is_authenticated()).await;
    let calls = fx.provider.sign_out_calls();

    // An hour later tab_b signs in again; the first deadline then passes.
    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    fx.clock.advance(60 * MINUTE_MS);
    fx.provider.push_sign_in(Ok(owner()));
    tab_b.sign_in().await.unwrap();
    tokio::time::sleep(Duration::from_secs(60 * 60 + 1)).await;

    assert!(tab_b.state().is_authenticated());
    assert_eq!(fx.provider.sign_out_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn login_time_written_by_another_tab_reschedules() {
    let fx = Fixture::new(MockAuthProvider::signed_in(owner()));
    let manager = fx.manager();
    manager.start().await.unwrap();
    let mut rx = manager.subscribe();

    let later = NOW + 60 * MINUTE_MS;
    fx.origin.tab().set(KEY, &later.to_string()).unwrap();
    wait_until(&mut rx, |s| s.login_at_ms() == Some(later)).await;

    // The first deadline passes without ending the session.
    let early = timeout(
        MAX_AGE + Duration::from_secs(30 * 60),
        rx.wait_for(|s| !s.is_authenticated()),
    )
    .await;
    assert!(early.is_err(), "old timer still armed");
    drop(early);

    timeout(Duration::from_secs(60 * 60), rx.wait_for(|s| !s.is_authenticated()))
        .await
        .expect("rescheduled timer never fired")
        .expect("manager dropped");
    assert_eq!(fx.provider.sign_out_calls(), 1);
}

#[tokio::test]
async fn sign_out_is_idempotent() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider.push_sign_in(Ok(owner()));
    let manager = fx.manager();
    manager.sign_in().await.unwrap();

    manager.sign_out().await.unwrap();
    manager.sign_out().await.unwrap();

    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(fx.provider.sign_out_calls(), 1);
}

#[tokio::test]
async fn rejected_provider_sign_out_still_clears_local_state() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider.push_sign_in(Ok(owner()));
    fx.provider
        .fail_sign_out(AuthError::Unavailable("network down".into()));
    let manager = fx.manager();
    manager.sign_in().await.unwrap();

    let result = manager.sign_out().await;

    assert!(matches!(result, Err(SessionError::Provider(_))));
    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(fx.stored(), None);
}

#[tokio::test]
async fn failed_sign_in_leaves_state_untouched() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider
        .push_sign_in(Err(AuthError::Rejected("popup closed".into())));
    let manager = fx.manager();

    let result = manager.sign_in().await;

    assert!(matches!(result, Err(SessionError::Provider(AuthError::Rejected(_)))));
    assert_eq!(manager.state(), SessionState::Unauthenticated);
    assert_eq!(fx.stored(), None);
}

#[tokio::test]
async fn provider_events_drive_state() {
    let fx = Fixture::new(MockAuthProvider::new());
    let manager = fx.manager();
    manager.start().await.unwrap();
    let mut rx = manager.subscribe();

    fx.provider.emit(AuthChange::SignedIn(owner()));
    wait_until(&mut rx, |s| s.is_authenticated()).await;
    assert_eq!(fx.stored(), Some(NOW.to_string()));

    fx.provider.emit(AuthChange::SignedOut);
    wait_until(&mut rx, |s| !s.is_authenticated()).await;
    assert_eq!(fx.stored(), None);
    // The provider already knows; it is not asked again.
    assert_eq!(fx.provider.sign_out_calls(), 0);
}

#[tokio::test]
async fn late_sign_out_event_does_not_end_a_newer_session() {
    let fx = Fixture::new(MockAuthProvider::new());
    fx.provider.push_sign_in(Ok(owner()));
    fx.provider.push_sign_in(Ok(owner()));
    let manager = fx.manager();
    manager.start().await.unwrap();
    let mut rx = manager.subscribe();

    manager.sign_in().await.unwrap();
    manager.sign_out().await.unwrap();
    fx.clock.advance(10 * MINUTE_MS);
    manager.sign_in().await.unwrap();
    let login_at = NOW + 10 * MINUTE_MS;
    assert_eq!(manager.state().login_at_ms(), Some(login_at));

    // The sign-out echo arrives after the second sign-in.
    fx.clock.advance(5 * MINUTE_MS);
    fx.provider.emit(AuthChange::SignedOut);
    let other = Principal::new(PrincipalId::from_raw("usr_other"));
    fx.provider.emit(AuthChange::SignedIn(other.clone()));
    wait_until(&mut rx, |s| s.principal() == Some(&other)).await;

    assert_eq!(manager.state().login_at_ms(), Some(login_at));
    assert_eq!(fx.stored(), Some(login_at.to_string()));
    assert_eq!(fx.provider.sign_out_calls(), 1);
}
