//! # filmlog-settings
//!
//! Layered configuration for filmlog.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`FilmlogSettings::default()`]
//! 2. **User file**: `~/.filmlog/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `FILMLOG_*` overrides (highest priority)
//!
//! ```no_run
//! use filmlog_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("session lifetime: {}ms", settings.session.max_age_ms);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{data_dir, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<FilmlogSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from disk with env var overrides. If
/// loading fails, returns compiled defaults.
pub fn get_settings() -> &'static FilmlogSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: FilmlogSettings) -> std::result::Result<(), FilmlogSettings> {
    SETTINGS.set(settings)
}
