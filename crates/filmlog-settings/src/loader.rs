//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FilmlogSettings::default()`]
//! 2. If `<data dir>/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::FilmlogSettings;

/// Data directory: `$FILMLOG_HOME`, else `~/.filmlog`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = read_env_string("FILMLOG_HOME") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".filmlog")
}

/// Resolve the path to the settings file.
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FilmlogSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<FilmlogSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<FilmlogSettings> {
    let defaults = serde_json::to_value(FilmlogSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

fn validate(settings: &FilmlogSettings) -> Result<()> {
    if settings.session.max_age_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "session.maxAgeMs must be positive".to_string(),
        ));
    }
    if settings.session.login_at_key.trim().is_empty() {
        return Err(SettingsError::InvalidValue(
            "session.loginAtKey must not be empty".to_string(),
        ));
    }
    if settings.realtime.poll_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "realtime.pollIntervalMs must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_env_overrides(settings: &mut FilmlogSettings) {
    // ── Site ────────────────────────────────────────────────────────
    if let Some(v) = read_env_string("FILMLOG_AUTHOR_ID") {
        settings.site.author_id = Some(v);
    }
    if let Some(v) = read_env_string("FILMLOG_BASE_URL") {
        settings.site.base_url = v;
    }

    // ── Content and storage ─────────────────────────────────────────
    if let Some(v) = read_env_string("FILMLOG_CORPUS_DIR") {
        settings.content.corpus_dir = v;
    }
    if let Some(v) = read_env_string("FILMLOG_DATABASE") {
        settings.storage.database = v;
    }
    if let Some(v) = read_env_string("FILMLOG_OBJECTS_DIR") {
        settings.storage.objects_dir = v;
    }
    if let Some(v) = read_env_string("FILMLOG_PUBLIC_BASE_URL") {
        settings.storage.public_base_url = v;
    }

    // ── Session and realtime ────────────────────────────────────────
    if let Some(v) = read_env_u64("FILMLOG_SESSION_MAX_AGE_MS", 1_000, 30 * 24 * 3_600_000) {
        settings.session.max_age_ms = v;
    }
    if let Some(v) = read_env_u64("FILMLOG_POLL_INTERVAL_MS", 50, 600_000) {
        settings.realtime.poll_interval_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("FILMLOG_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("FILMLOG_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
