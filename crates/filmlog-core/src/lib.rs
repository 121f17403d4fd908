//! Domain types shared by the filmlog crates.

pub mod entry;
pub mod ids;
pub mod image;
pub mod time;

pub use entry::{Entry, EntryRef, EntrySource, LiveEntry, StaticEntry};
pub use ids::{InquiryId, PostId, PrincipalId};
pub use image::{DataUrl, ImageError, ImagePayload};
