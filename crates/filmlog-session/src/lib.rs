//! # filmlog-session
//!
//! Session lifecycle for the site author: a fixed two-hour lifetime from
//! login, shared across every tab of one durable store.

pub mod clock;
pub mod errors;
pub mod manager;
pub mod mock;
pub mod provider;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{AuthError, SessionError, StorageError};
pub use manager::{EndReason, SessionConfig, SessionManager, SessionState};
pub use mock::MockAuthProvider;
pub use provider::{AuthChange, AuthProvider, LocalAuthProvider, Principal};
pub use storage::{DurableStore, LocalStorage, StorageEvent, StorageEvents, Tab, TabId};
