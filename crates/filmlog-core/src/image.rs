//! Image payloads attached to live posts.
//!
//! The editor hands over a mix of images that were uploaded earlier (plain
//! URLs) and images picked in this session (`data:` URLs). Only stored
//! references may end up on a saved post.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("not a data URL")]
    NotDataUrl,
    #[error("data URL is missing the ',' separator")]
    MissingSeparator,
    #[error("only base64 data URLs are supported")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Decode(String),
}

/// One image slot on a post being created or edited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImagePayload {
    /// Not uploaded yet; a `data:` URL.
    Inline(String),
    /// Already in the object store.
    Stored(String),
}

impl ImagePayload {
    /// Classify a raw editor value. Blank values are dropped.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else if raw.starts_with("data:") {
            Some(Self::Inline(raw.to_string()))
        } else {
            Some(Self::Stored(raw.to_string()))
        }
    }
}

/// Decoded `data:` URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Decode `data:<mime>;base64,<payload>`. A missing mime type defaults to
    /// `application/octet-stream`.
    pub fn decode(raw: &str) -> Result<Self, ImageError> {
        let rest = raw.strip_prefix("data:").ok_or(ImageError::NotDataUrl)?;
        let (meta, payload) = rest.split_once(',').ok_or(ImageError::MissingSeparator)?;
        let mime = meta.strip_suffix(";base64").ok_or(ImageError::NotBase64)?;
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        let mime_type = if mime.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime.to_string()
        };
        Ok(Self { mime_type, bytes })
    }
}
