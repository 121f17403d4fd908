pub mod database;
pub mod error;
pub mod inquiries;
pub mod objects;
pub mod posts;
pub mod row_helpers;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use inquiries::{filter_inquiries, Inquiry, InquiryFilter, InquiryRepo, InquiryStatus, NewInquiry, SpaceType};
pub use objects::{FsObjectStore, ObjectStore};
pub use posts::{PostChange, PostRepo, PostUpdate};
