//! Tracing setup for the filmlog binary.
//!
//! Every process gets a formatted stderr layer. Warn and error events can
//! additionally be persisted to an [`OperatorLog`] so failures that the UI
//! swallows (a failed live fetch, an image upload that was skipped) stay
//! inspectable after the fact.

mod operator_log;

pub use operator_log::{
    Incident, IncidentQuery, IncidentTags, OperatorLog, OperatorLogLayer, Severity,
};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "filmlog_session" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of the human-readable format.
    pub json: bool,
    /// Where to persist warn+ events. `None` disables the operator log.
    pub operator_log_path: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::WARN,
            module_levels: Vec::new(),
            json: false,
            operator_log_path: None,
        }
    }
}

impl TelemetryConfig {
    fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Keeps the operator log reachable for the lifetime of the process.
pub struct TelemetryGuard {
    operator_log: Option<Arc<OperatorLog>>,
}

impl TelemetryGuard {
    /// Access the operator log for querying persisted events.
    pub fn operator_log(&self) -> Option<&OperatorLog> {
        self.operator_log.as_deref()
    }
}

/// Parse a level name as used in settings files (`"warn"`, `"DEBUG"`).
pub fn parse_level(raw: &str) -> Option<Level> {
    raw.trim().parse().ok()
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    };

    let (operator_layer, operator_log) = match &config.operator_log_path {
        Some(path) => match OperatorLog::open(path) {
            Ok(log) => {
                let log = Arc::new(log);
                (Some(OperatorLogLayer::new(log.clone())), Some(log))
            }
            Err(e) => {
                eprintln!("filmlog-telemetry: failed to open operator log: {e}");
                (None, None)
            }
        },
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(operator_layer)
        .try_init();

    TelemetryGuard { operator_log }
}
