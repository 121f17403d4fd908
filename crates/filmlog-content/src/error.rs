use filmlog_core::ImageError;
use filmlog_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid image at position {index}: {source}")]
    InvalidImage {
        index: usize,
        #[source]
        source: ImageError,
    },

    #[error("post title must not be empty")]
    EmptyTitle,

    #[error("not permitted: {0}")]
    NotPermitted(String),
}

impl ContentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}
