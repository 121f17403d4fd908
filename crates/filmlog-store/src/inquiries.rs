//! Contact form inquiries and the filters used by the studio's inbox.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use filmlog_core::ids::InquiryId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InquiryStatus {
    #[default]
    New,
    InProgress,
    Done,
}

impl std::fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for InquiryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "in-progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown inquiry status: {other}")),
        }
    }
}

/// Kind of surface the customer wants filmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    Kitchen,
    Door,
    Furniture,
    Wall,
    Etc,
}

impl std::fmt::Display for SpaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kitchen => write!(f, "kitchen"),
            Self::Door => write!(f, "door"),
            Self::Furniture => write!(f, "furniture"),
            Self::Wall => write!(f, "wall"),
            Self::Etc => write!(f, "etc"),
        }
    }
}

impl std::str::FromStr for SpaceType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kitchen" => Ok(Self::Kitchen),
            "door" => Ok(Self::Door),
            "furniture" => Ok(Self::Furniture),
            "wall" => Ok(Self::Wall),
            "etc" => Ok(Self::Etc),
            other => Err(format!("unknown space type: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inquiry {
    pub id: InquiryId,
    pub name: String,
    pub phone: String,
    pub kakao_id: Option<String>,
    pub message: String,
    pub budget: Option<String>,
    pub space_type: Option<SpaceType>,
    pub status: InquiryStatus,
    pub created_at: String,
}

/// A contact form submission before it is stored.
#[derive(Clone, Debug, Default)]
pub struct NewInquiry {
    pub name: String,
    pub phone: String,
    pub kakao_id: Option<String>,
    pub message: String,
    pub budget: Option<String>,
    pub space_type: Option<SpaceType>,
}

/// Inbox filter: status (None = all) plus a free-text query.
#[derive(Clone, Debug, Default)]
pub struct InquiryFilter {
    pub status: Option<InquiryStatus>,
    pub query: String,
}

/// Narrow inquiries by status and by a case-insensitive query matched
/// against name, phone, kakao id, message, budget and space type.
pub fn filter_inquiries<'a>(rows: &'a [Inquiry], filter: &InquiryFilter) -> Vec<&'a Inquiry> {
    let needle = filter.query.trim().to_lowercase();
    rows.iter()
        .filter(|row| filter.status.map_or(true, |s| row.status == s))
        .filter(|row| needle.is_empty() || haystack(row).contains(&needle))
        .collect()
}

fn haystack(row: &Inquiry) -> String {
    let space = row.space_type.map(|s| s.to_string()).unwrap_or_default();
    [
        row.name.as_str(),
        row.phone.as_str(),
        row.kakao_id.as_deref().unwrap_or_default(),
        row.message.as_str(),
        row.budget.as_deref().unwrap_or_default(),
        space.as_str(),
    ]
    .join(" ")
    .to_lowercase()
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

const SELECT_COLUMNS: &str = "SELECT id, name, phone, kakao_id, message, budget, space_type, status, created_at FROM inquiries";

pub struct InquiryRepo {
    db: Database,
}

impl InquiryRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store a contact form submission. Name and phone are required; text
    /// fields are trimmed and blank optional fields stored as NULL.
    #[instrument(skip(self, new), fields(space_type = ?new.space_type))]
    pub fn submit(&self, new: NewInquiry) -> Result<Inquiry, StoreError> {
        let name = new.name.trim().to_string();
        let phone = new.phone.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("name is required".into()));
        }
        if phone.is_empty() {
            return Err(StoreError::InvalidInput("phone is required".into()));
        }

        let inquiry = Inquiry {
            id: InquiryId::new(),
            name,
            phone,
            kakao_id: blank_to_none(new.kakao_id),
            message: new.message.trim().to_string(),
            budget: blank_to_none(new.budget),
            space_type: new.space_type,
            status: InquiryStatus::New,
            created_at: Utc::now().to_rfc3339(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO inquiries (id, name, phone, kakao_id, message, budget, space_type, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    inquiry.id.as_str(),
                    inquiry.name,
                    inquiry.phone,
                    inquiry.kakao_id,
                    inquiry.message,
                    inquiry.budget,
                    inquiry.space_type.map(|s| s.to_string()),
                    inquiry.status.to_string(),
                    inquiry.created_at,
                ],
            )?;
            Ok(())
        })?;

        Ok(inquiry)
    }

    #[instrument(skip(self), fields(inquiry_id = %id))]
    pub fn get(&self, id: &InquiryId) -> Result<Inquiry, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_inquiry(row),
                None => Err(StoreError::NotFound(format!("inquiry {id}"))),
            }
        })
    }

    /// All inquiries, newest first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Inquiry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"))?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_inquiry(row)?);
            }
            Ok(out)
        })
    }

    #[instrument(skip(self), fields(inquiry_id = %id, status = %status))]
    pub fn set_status(&self, id: &InquiryId, status: InquiryStatus) -> Result<(), StoreError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE inquiries SET status = ?1 WHERE id = ?2",
                rusqlite::params![status.to_string(), id.as_str()],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("inquiry {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(inquiry_id = %id))]
    pub fn delete(&self, id: &InquiryId) -> Result<(), StoreError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM inquiries WHERE id = ?1", [id.as_str()])?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("inquiry {id}")));
        }
        Ok(())
    }
}

fn row_to_inquiry(row: &rusqlite::Row<'_>) -> Result<Inquiry, StoreError> {
    let status: String = row_helpers::get(row, 7, "inquiries", "status")?;
    let space_type: Option<String> = row_helpers::get_opt(row, 6, "inquiries", "space_type")?;
    Ok(Inquiry {
        id: InquiryId::from_raw(row_helpers::get::<String>(row, 0, "inquiries", "id")?),
        name: row_helpers::get(row, 1, "inquiries", "name")?,
        phone: row_helpers::get(row, 2, "inquiries", "phone")?,
        kakao_id: row_helpers::get_opt(row, 3, "inquiries", "kakao_id")?,
        message: row_helpers::get(row, 4, "inquiries", "message")?,
        budget: row_helpers::get_opt(row, 5, "inquiries", "budget")?,
        space_type: space_type
            .map(|raw| row_helpers::parse_enum(&raw, "inquiries", "space_type"))
            .transpose()?,
        status: row_helpers::parse_enum(&status, "inquiries", "status")?,
        created_at: row_helpers::get(row, 8, "inquiries", "created_at")?,
    })
}
