//! Work log entries.
//!
//! Two sources feed the work log: long-form documents from the corpus
//! ([`StaticEntry`]) and short posts from the database ([`LiveEntry`]).
//! They share a small accessor set so list code never has to sniff fields.

use serde::{Deserialize, Serialize};

use crate::ids::{PostId, PrincipalId};
use crate::time;

/// Where an entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Static,
    Live,
}

impl std::fmt::Display for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Live => f.write_str("live"),
        }
    }
}

/// A long-form post resolved from the document corpus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticEntry {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub created_at: String,
    /// Document text after the front matter.
    #[serde(default)]
    pub body: String,
}

/// A short post stored in the database and owned by one principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEntry {
    pub id: PostId,
    pub owner: PrincipalId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Owned entry of either source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Entry {
    Static(StaticEntry),
    Live(LiveEntry),
}

/// Borrowed entry of either source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryRef<'a> {
    Static(&'a StaticEntry),
    Live(&'a LiveEntry),
}

impl<'a> EntryRef<'a> {
    pub fn source(&self) -> EntrySource {
        match *self {
            Self::Static(_) => EntrySource::Static,
            Self::Live(_) => EntrySource::Live,
        }
    }

    /// Identifier within the entry's own source. Not unique across sources.
    pub fn id(&self) -> &'a str {
        match *self {
            Self::Static(e) => &e.slug,
            Self::Live(e) => e.id.as_str(),
        }
    }

    pub fn title(&self) -> &'a str {
        match *self {
            Self::Static(e) => &e.title,
            Self::Live(e) => &e.title,
        }
    }

    /// Text shown under the title in lists: the summary for documents, the
    /// post body for live entries.
    pub fn display_body(&self) -> &'a str {
        match *self {
            Self::Static(e) => e.summary.as_deref().unwrap_or_default(),
            Self::Live(e) => &e.content,
        }
    }

    pub fn created_at(&self) -> &'a str {
        match *self {
            Self::Static(e) => &e.created_at,
            Self::Live(e) => &e.created_at,
        }
    }

    /// Ordering key in epoch milliseconds; unreadable timestamps are 0.
    pub fn sort_key(&self) -> i64 {
        time::sort_key(self.created_at())
    }

    pub fn to_owned_entry(&self) -> Entry {
        match *self {
            Self::Static(e) => Entry::Static(e.clone()),
            Self::Live(e) => Entry::Live(e.clone()),
        }
    }
}

impl Entry {
    pub fn as_entry_ref(&self) -> EntryRef<'_> {
        match self {
            Self::Static(e) => EntryRef::Static(e),
            Self::Live(e) => EntryRef::Live(e),
        }
    }

    pub fn source(&self) -> EntrySource {
        self.as_entry_ref().source()
    }

    pub fn id(&self) -> &str {
        self.as_entry_ref().id()
    }

    pub fn title(&self) -> &str {
        self.as_entry_ref().title()
    }

    pub fn display_body(&self) -> &str {
        self.as_entry_ref().display_body()
    }

    pub fn created_at(&self) -> &str {
        self.as_entry_ref().created_at()
    }
}

impl<'a> From<&'a StaticEntry> for EntryRef<'a> {
    fn from(e: &'a StaticEntry) -> Self {
        Self::Static(e)
    }
}

impl<'a> From<&'a LiveEntry> for EntryRef<'a> {
    fn from(e: &'a LiveEntry) -> Self {
        Self::Live(e)
    }
}
