//! Warnings and errors kept for the operator.
//!
//! Each warn+ event becomes one incident row tagged with the CLI command it
//! happened under, the acting principal, and the post or inquiry it
//! concerned. Those tags come from the event itself or from any enclosing
//! span, nearest first, and are what `filmlog logs` filters on.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{span, Level};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const DEFAULT_LIMIT: u32 = 50;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS incidents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL,
    severity INTEGER NOT NULL,
    target TEXT NOT NULL,
    message TEXT NOT NULL,
    error TEXT,
    command TEXT,
    principal TEXT,
    post_id TEXT,
    inquiry_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_incidents_recorded ON incidents(recorded_at);
CREATE INDEX IF NOT EXISTS idx_incidents_post ON incidents(post_id) WHERE post_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_incidents_inquiry ON incidents(inquiry_id) WHERE inquiry_id IS NOT NULL;
";

/// Warn or error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn = 1,
    Error = 2,
}

impl Severity {
    /// `None` for levels below warn, which are never persisted.
    pub fn from_level(level: Level) -> Option<Self> {
        if level == Level::ERROR {
            Some(Self::Error)
        } else if level == Level::WARN {
            Some(Self::Warn)
        } else {
            None
        }
    }

    fn from_column(value: i64) -> Self {
        if value >= Self::Error as i64 {
            Self::Error
        } else {
            Self::Warn
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warn => f.write_str("warn"),
            Self::Error => f.write_str("error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown severity: {other} (expected warn or error)")),
        }
    }
}

/// What an incident was about. Every tag is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IncidentTags {
    pub command: Option<String>,
    pub principal: Option<String>,
    pub post_id: Option<String>,
    pub inquiry_id: Option<String>,
}

impl IncidentTags {
    /// Take `name` if it is one of the tracked tags. Post spans name the
    /// acting principal `owner`.
    fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "command" => &mut self.command,
            "principal" | "owner" => &mut self.principal,
            "post_id" => &mut self.post_id,
            "inquiry_id" => &mut self.inquiry_id,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Fill unset tags from `outer`.
    fn inherit(&mut self, outer: &IncidentTags) {
        for (slot, value) in [
            (&mut self.command, &outer.command),
            (&mut self.principal, &outer.principal),
            (&mut self.post_id, &outer.post_id),
            (&mut self.inquiry_id, &outer.inquiry_id),
        ] {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
    }
}

/// One persisted warning or error.
#[derive(Clone, Debug, Serialize)]
pub struct Incident {
    pub id: i64,
    pub recorded_at: String,
    pub severity: Severity,
    pub target: String,
    pub message: String,
    /// The event's `error` field, when it carried one.
    pub error: Option<String>,
    #[serde(flatten)]
    pub tags: IncidentTags,
}

/// Filters for [`OperatorLog::query`]. Results are newest first.
#[derive(Clone, Debug, Default)]
pub struct IncidentQuery {
    /// Only incidents at least this severe.
    pub min_severity: Option<Severity>,
    pub command: Option<String>,
    pub principal: Option<String>,
    pub post_id: Option<String>,
    pub inquiry_id: Option<String>,
    /// RFC 3339 lower bound on `recorded_at`.
    pub since: Option<String>,
    pub limit: Option<u32>,
}

pub struct OperatorLog {
    conn: Mutex<Connection>,
}

impl OperatorLog {
    pub fn open(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(
        &self,
        severity: Severity,
        target: &str,
        message: &str,
        error: Option<&str>,
        tags: &IncidentTags,
    ) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO incidents
                 (recorded_at, severity, target, message, error, command, principal, post_id, inquiry_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                Utc::now().to_rfc3339(),
                severity as i64,
                target,
                message,
                error,
                tags.command,
                tags.principal,
                tags.post_id,
                tags.inquiry_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn query(&self, q: &IncidentQuery) -> Result<Vec<Incident>, rusqlite::Error> {
        let mut clauses = Vec::new();
        let mut params: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(severity) = q.min_severity {
            params.push((severity as i64).into());
            clauses.push(format!("severity >= ?{}", params.len()));
        }
        for (column, value) in [
            ("command", &q.command),
            ("principal", &q.principal),
            ("post_id", &q.post_id),
            ("inquiry_id", &q.inquiry_id),
        ] {
            if let Some(value) = value {
                params.push(value.clone().into());
                clauses.push(format!("{column} = ?{}", params.len()));
            }
        }
        if let Some(since) = &q.since {
            params.push(since.clone().into());
            clauses.push(format!("recorded_at >= ?{}", params.len()));
        }

        let mut sql = String::from(
            "SELECT id, recorded_at, severity, target, message, error, command, principal, post_id, inquiry_id
             FROM incidents",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", q.limit.unwrap_or(DEFAULT_LIMIT)));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok(Incident {
                id: row.get(0)?,
                recorded_at: row.get(1)?,
                severity: Severity::from_column(row.get(2)?),
                target: row.get(3)?,
                message: row.get(4)?,
                error: row.get(5)?,
                tags: IncidentTags {
                    command: row.get(6)?,
                    principal: row.get(7)?,
                    post_id: row.get(8)?,
                    inquiry_id: row.get(9)?,
                },
            })
        })?;
        rows.collect()
    }

    /// Most recent incident, if any.
    pub fn latest(&self) -> Result<Option<Incident>, rusqlite::Error> {
        let newest = self.query(&IncidentQuery {
            limit: Some(1),
            ..IncidentQuery::default()
        })?;
        Ok(newest.into_iter().next())
    }

    /// Delete incidents recorded before `cutoff` (RFC 3339). Returns the count.
    pub fn prune_before(&self, cutoff: &str) -> Result<usize, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM incidents WHERE recorded_at < ?1", [cutoff])
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
    }
}

/// Collects tags, plus `message` and `error` when recording an event.
#[derive(Default)]
struct TagVisitor {
    tags: IncidentTags,
    message: Option<String>,
    error: Option<String>,
}

impl TagVisitor {
    fn take(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            "error" => self.error = Some(value),
            name => {
                self.tags.set(name, value);
            }
        }
    }
}

impl Visit for TagVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.take(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.take(field, format!("{value:?}"));
    }
}

/// Tags recorded on a span, kept in its extensions.
struct SpanTags(IncidentTags);

/// Persists warn and error events into an [`OperatorLog`].
pub struct OperatorLogLayer {
    log: Arc<OperatorLog>,
}

impl OperatorLogLayer {
    pub fn new(log: Arc<OperatorLog>) -> Self {
        Self { log }
    }
}

impl<S> Layer<S> for OperatorLogLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = TagVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanTags(visitor.tags));
        }
    }

    // `principal` is usually filled in once the session is known.
    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = TagVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(SpanTags(tags)) = extensions.get_mut::<SpanTags>() {
            let mut updated = visitor.tags;
            updated.inherit(tags);
            *tags = updated;
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let Some(severity) = Severity::from_level(*event.metadata().level()) else {
            return;
        };

        let mut visitor = TagVisitor::default();
        event.record(&mut visitor);
        let mut tags = visitor.tags;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(SpanTags(outer)) = span.extensions().get::<SpanTags>() {
                    tags.inherit(outer);
                }
            }
        }

        let message = visitor.message.unwrap_or_default();
        if let Err(e) = self.log.record(
            severity,
            event.metadata().target(),
            &message,
            visitor.error.as_deref(),
            &tags,
        ) {
            eprintln!("filmlog-telemetry: dropped incident: {e}");
        }
    }
}
