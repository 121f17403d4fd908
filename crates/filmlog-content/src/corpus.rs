//! Long-form posts read from a directory of markdown documents.
//!
//! Each `*.mdx`/`*.md` file is one [`StaticEntry`]; the file stem is the
//! slug. An optional front matter block delimited by `---` supplies the
//! title, date, summary, and cover image.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use filmlog_core::StaticEntry;
use tracing::{debug, info, warn};

pub trait DocumentCorpus: Send + Sync {
    /// Every document, newest first.
    fn list(&self) -> Vec<StaticEntry>;
    fn get(&self, slug: &str) -> Option<StaticEntry>;
}

/// Front matter fields the work log understands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub date: Option<String>,
    pub summary: Option<String>,
    pub cover_image: Option<String>,
}

/// Documents loaded once from a directory.
pub struct FsCorpus {
    dir: PathBuf,
    entries: Vec<StaticEntry>,
}

impl FsCorpus {
    /// Read every document under `dir` with one of `extensions`. A missing
    /// directory is an empty corpus; unreadable files are skipped.
    pub fn open(dir: impl Into<PathBuf>, extensions: &[String]) -> Self {
        let dir = dir.into();
        let loaded_at = filmlog_core::time::now_rfc3339();
        let entries = load_entries(&dir, extensions, &loaded_at);
        info!(dir = %dir.display(), count = entries.len(), "document corpus loaded");
        Self { dir, entries }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DocumentCorpus for FsCorpus {
    fn list(&self) -> Vec<StaticEntry> {
        self.entries.clone()
    }

    fn get(&self, slug: &str) -> Option<StaticEntry> {
        if !is_valid_slug(slug) {
            debug!(slug, "rejected document slug");
            return None;
        }
        self.entries.iter().find(|e| e.slug == slug).cloned()
    }
}

fn load_entries(dir: &Path, extensions: &[String], loaded_at: &str) -> Vec<StaticEntry> {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "corpus directory missing");
            return Vec::new();
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "corpus directory unreadable");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = read
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    // Earlier extensions win when two files share a stem.
    for ext in extensions {
        for path in &files {
            if path.extension().and_then(|e| e.to_str()) != Some(ext.as_str()) {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_valid_slug(slug) || !seen.insert(slug.to_string()) {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(raw) => entries.push(parse_document(slug, &raw, loaded_at)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable document"),
            }
        }
    }

    entries.sort_by_cached_key(|e| Reverse(filmlog_core::time::sort_key(&e.created_at)));
    entries
}

/// Slugs name a file directly inside the corpus directory.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && !slug.contains(['/', '\\']) && !slug.contains("..")
}

/// Build an entry from a document's raw text. Missing titles fall back to
/// the slug and missing dates to `loaded_at`.
pub fn parse_document(slug: &str, raw: &str, loaded_at: &str) -> StaticEntry {
    let (yaml, body) = extract_front_matter(raw);
    let fm = yaml.as_deref().map(parse_front_matter).unwrap_or_default();

    StaticEntry {
        slug: slug.to_string(),
        title: fm.title.unwrap_or_else(|| slug.to_string()),
        summary: fm.summary,
        cover_image: fm.cover_image,
        created_at: fm.date.unwrap_or_else(|| loaded_at.to_string()),
        body,
    }
}

/// Split `---` delimited front matter from the body.
fn extract_front_matter(content: &str) -> (Option<String>, String) {
    let trimmed = content.trim_start();
    let Some(after_first) = trimmed.strip_prefix("---") else {
        return (None, content.to_string());
    };
    let after_first = after_first
        .strip_prefix("\r\n")
        .or_else(|| after_first.strip_prefix('\n'))
        .unwrap_or(after_first);

    match after_first.find("\n---") {
        Some(end_idx) => {
            let yaml = after_first[..end_idx].trim_end_matches('\r').to_string();
            let rest = &after_first[end_idx + 4..];
            // Drop the rest of the closing delimiter line.
            let body = match rest.find('\n') {
                Some(nl) => &rest[nl + 1..],
                None => "",
            };
            (Some(yaml), body.to_string())
        }
        None => (None, content.to_string()),
    }
}

/// Parse the flat `key: value` subset of YAML used by post front matter.
pub fn parse_front_matter(yaml: &str) -> FrontMatter {
    let mut fm = FrontMatter::default();
    for line in yaml.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = unquote(value.trim());
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "title" => fm.title = Some(value),
            "date" => fm.date = Some(value),
            "summary" => fm.summary = Some(value),
            "coverImage" | "cover_image" => fm.cover_image = Some(value),
            _ => {}
        }
    }
    fm
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}
