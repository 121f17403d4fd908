//! The work log: long-form documents and live posts in one feed.

pub mod aggregate;
pub mod corpus;
pub mod error;
pub mod live;
pub mod posts;

pub use aggregate::{compute, merge, Partitioned, WorkLog, WorkLogView};
pub use corpus::{is_valid_slug, parse_document, parse_front_matter, DocumentCorpus, FrontMatter, FsCorpus};
pub use error::ContentError;
pub use live::{LiveCollection, SnapshotCallback, StoreLiveCollection, Subscription};
pub use posts::{image_key, NewPost, PostEdit, PostService};
