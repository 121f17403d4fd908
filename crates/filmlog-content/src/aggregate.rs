//! The unified work log view.
//!
//! Corpus documents and live posts are filtered and sorted together, then
//! split back by source, so "newest first" means the same thing in both
//! halves of the page.

use std::cmp::Reverse;

use filmlog_core::{EntryRef, LiveEntry, StaticEntry};
use serde::Serialize;

/// Filtered, newest-first entries of each source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Partitioned<'a> {
    pub static_entries: Vec<&'a StaticEntry>,
    pub live_entries: Vec<&'a LiveEntry>,
}

impl Partitioned<'_> {
    pub fn is_empty(&self) -> bool {
        self.static_entries.is_empty() && self.live_entries.is_empty()
    }

    pub fn into_owned(self) -> WorkLogView {
        WorkLogView {
            static_entries: self.static_entries.into_iter().cloned().collect(),
            live_entries: self.live_entries.into_iter().cloned().collect(),
        }
    }
}

/// Owned copy of a [`Partitioned`] view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkLogView {
    pub static_entries: Vec<StaticEntry>,
    pub live_entries: Vec<LiveEntry>,
}

/// All matching entries in one newest-first list. Static entries precede
/// live ones when timestamps tie.
pub fn merge<'a>(
    static_entries: &'a [StaticEntry],
    live_entries: &'a [LiveEntry],
    search: &str,
) -> Vec<EntryRef<'a>> {
    let needle = search.trim().to_lowercase();

    let mut combined: Vec<EntryRef<'a>> = static_entries
        .iter()
        .map(EntryRef::Static)
        .chain(live_entries.iter().map(EntryRef::Live))
        .filter(|entry| matches(*entry, &needle))
        .collect();

    // Stable: ties keep input order.
    combined.sort_by_cached_key(|entry| Reverse(entry.sort_key()));
    combined
}

/// [`merge`], split by source.
pub fn compute<'a>(
    static_entries: &'a [StaticEntry],
    live_entries: &'a [LiveEntry],
    search: &str,
) -> Partitioned<'a> {
    let mut view = Partitioned::default();
    for entry in merge(static_entries, live_entries, search) {
        match entry {
            EntryRef::Static(e) => view.static_entries.push(e),
            EntryRef::Live(e) => view.live_entries.push(e),
        }
    }
    view
}

fn matches(entry: EntryRef<'_>, needle: &str) -> bool {
    needle.is_empty()
        || entry.title().to_lowercase().contains(needle)
        || entry.display_body().to_lowercase().contains(needle)
}

/// Holder for the work log page: the corpus set, the latest live snapshot,
/// and the search term. Every change recomputes the view from scratch.
#[derive(Debug, Default)]
pub struct WorkLog {
    static_entries: Vec<StaticEntry>,
    live_entries: Vec<LiveEntry>,
    search: String,
    live_ready: bool,
    view: WorkLogView,
}

impl WorkLog {
    pub fn new(static_entries: Vec<StaticEntry>) -> Self {
        let mut log = Self {
            static_entries,
            ..Self::default()
        };
        log.recompute();
        log
    }

    /// Replace the live snapshot wholesale.
    pub fn replace_live(&mut self, live_entries: Vec<LiveEntry>) {
        self.live_entries = live_entries;
        self.live_ready = true;
        self.recompute();
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
        self.recompute();
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn view(&self) -> &WorkLogView {
        &self.view
    }

    /// Whether the first live snapshot has arrived.
    pub fn live_ready(&self) -> bool {
        self.live_ready
    }

    /// Combined newest-first order of the current view.
    pub fn merged(&self) -> Vec<EntryRef<'_>> {
        merge(&self.static_entries, &self.live_entries, &self.search)
    }

    fn recompute(&mut self) {
        self.view = compute(&self.static_entries, &self.live_entries, &self.search).into_owned();
    }
}
