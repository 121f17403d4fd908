//! Error types for authentication, durable storage, and the session manager.

/// Failures reported by an [`AuthProvider`](crate::AuthProvider).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The provider could not be reached or its session could not be read.
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
    /// The provider refused the request.
    #[error("provider rejected the request: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("durable store I/O: {0}")]
    Io(String),
    #[error("durable store contents: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Provider(#[from] AuthError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
