//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. `#[serde(default)]` on every struct
//! lets a settings file mention only the fields it changes.

mod session;
mod storage;

pub use session::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

/// Root settings type for filmlog.
///
/// Loaded from `~/.filmlog/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "site": { "authorId": "7f0c1d52" },
///   "session": { "maxAgeMs": 3600000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilmlogSettings {
    pub site: SiteSettings,
    pub content: ContentSettings,
    pub storage: StorageSettings,
    pub session: SessionSettings,
    pub realtime: RealtimeSettings,
    pub logging: LoggingSettings,
}

/// Public site identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSettings {
    /// Principal allowed to write posts and read inquiries. Without one,
    /// the live half of the work log stays empty.
    pub author_id: Option<String>,
    pub base_url: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            author_id: None,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Document corpus location.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentSettings {
    /// Directory of long-form posts. Relative paths resolve against the
    /// working directory.
    pub corpus_dir: String,
    /// File extensions treated as posts.
    pub extensions: Vec<String>,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            corpus_dir: "content/logs".to_string(),
            extensions: vec!["mdx".to_string(), "md".to_string()],
        }
    }
}

/// Live collection refresh.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// How often to check the database for writes made by other processes.
    pub poll_interval_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Persist warn+ events to the operator log.
    pub operator_log: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            operator_log: true,
        }
    }
}
