//! Authentication provider seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use filmlog_core::PrincipalId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::errors::AuthError;

const CHANGE_CAPACITY: usize = 16;

/// An authenticated identity as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: PrincipalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Principal {
    pub fn new(id: PrincipalId) -> Self {
        Self {
            id,
            display_name: None,
        }
    }
}

/// Provider-side session changes, including ones that originate elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn(Principal),
    SignedOut,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self) -> Result<Principal, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    /// The provider's existing session, if any.
    async fn current_session(&self) -> Result<Option<Principal>, AuthError>;
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderSession {
    principal: Principal,
    signed_in_at: String,
}

/// Provider that signs in a configured identity and keeps its session in a
/// JSON file, so separate CLI invocations share it.
pub struct LocalAuthProvider {
    session_path: PathBuf,
    identity: Option<Principal>,
    changes: broadcast::Sender<AuthChange>,
}

impl LocalAuthProvider {
    pub fn new(session_path: impl Into<PathBuf>, identity: Option<Principal>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            session_path: session_path.into(),
            identity,
            changes,
        }
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    async fn write_session(&self, principal: &Principal) -> Result<(), AuthError> {
        let session = ProviderSession {
            principal: principal.clone(),
            signed_in_at: filmlog_core::time::now_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&session)
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        if let Some(parent) = self.session_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(unavailable)?;
        }
        tokio::fs::write(&self.session_path, json)
            .await
            .map_err(unavailable)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = tokio::fs::set_permissions(&self.session_path, perms).await;
        }
        Ok(())
    }
}

fn unavailable(e: std::io::Error) -> AuthError {
    AuthError::Unavailable(e.to_string())
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn sign_in(&self) -> Result<Principal, AuthError> {
        let principal = self
            .identity
            .clone()
            .ok_or_else(|| AuthError::Rejected("no identity configured".to_string()))?;
        self.write_session(&principal).await?;
        info!(principal = %principal.id, "provider session created");
        let _ = self.changes.send(AuthChange::SignedIn(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_file(&self.session_path).await {
            Ok(()) => info!("provider session removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no provider session to remove");
            }
            Err(e) => return Err(unavailable(e)),
        }
        let _ = self.changes.send(AuthChange::SignedOut);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Principal>, AuthError> {
        let content = match tokio::fs::read_to_string(&self.session_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable(e)),
        };
        let session: ProviderSession = serde_json::from_str(&content)
            .map_err(|e| AuthError::Unavailable(format!("provider session file: {e}")))?;
        Ok(Some(session.principal))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Principal {
        Principal {
            id: PrincipalId::from_raw("usr_owner"),
            display_name: Some("Studio".into()),
        }
    }

    #[tokio::test]
    async fn sign_in_persists_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth-session.json");
        let provider = LocalAuthProvider::new(&path, Some(owner()));

        assert_eq!(provider.current_session().await.unwrap(), None);
        let principal = provider.sign_in().await.unwrap();
        assert_eq!(principal, owner());

        let other_process = LocalAuthProvider::new(&path, None);
        assert_eq!(other_process.current_session().await.unwrap(), Some(owner()));
    }

    #[tokio::test]
    async fn sign_in_without_identity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalAuthProvider::new(dir.path().join("s.json"), None);
        assert!(matches!(provider.sign_in().await, Err(AuthError::Rejected(_))));
    }

    #[tokio::test]
    async fn sign_out_clears_session_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalAuthProvider::new(dir.path().join("s.json"), Some(owner()));
        let mut changes = provider.subscribe();

        provider.sign_in().await.unwrap();
        provider.sign_out().await.unwrap();
        provider.sign_out().await.unwrap();

        assert_eq!(changes.recv().await.unwrap(), AuthChange::SignedIn(owner()));
        assert_eq!(changes.recv().await.unwrap(), AuthChange::SignedOut);
        assert_eq!(provider.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_session_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, "{").unwrap();
        let provider = LocalAuthProvider::new(&path, None);
        assert!(matches!(
            provider.current_session().await,
            Err(AuthError::Unavailable(_))
        ));
    }
}
