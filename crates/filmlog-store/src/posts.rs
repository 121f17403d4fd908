use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio::sync::broadcast;
use tracing::instrument;

use filmlog_core::ids::{PostId, PrincipalId};
use filmlog_core::LiveEntry;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, title, content, image_urls, created_at, updated_at FROM posts";

/// Notification emitted after a committed write to `posts`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostChange {
    Created { owner: PrincipalId, id: PostId },
    Updated { owner: PrincipalId, id: PostId },
    Deleted { owner: PrincipalId, id: PostId },
}

impl PostChange {
    pub fn owner(&self) -> &PrincipalId {
        match self {
            Self::Created { owner, .. } | Self::Updated { owner, .. } | Self::Deleted { owner, .. } => {
                owner
            }
        }
    }
}

/// Fields rewritten by an edit. `image_urls: None` leaves images untouched.
#[derive(Clone, Debug, Default)]
pub struct PostUpdate {
    pub title: String,
    pub content: String,
    pub image_urls: Option<Vec<String>>,
}

/// Short work log posts, one owner per row.
#[derive(Clone)]
pub struct PostRepo {
    db: Database,
    changes: broadcast::Sender<PostChange>,
}

impl PostRepo {
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { db, changes }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Changes committed through this repo (and its clones).
    pub fn subscribe_changes(&self) -> broadcast::Receiver<PostChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: PostChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    /// Insert a post with no images; the store issues the id.
    #[instrument(skip(self, content), fields(owner = %owner))]
    pub fn create(
        &self,
        owner: &PrincipalId,
        title: &str,
        content: &str,
    ) -> Result<LiveEntry, StoreError> {
        let id = PostId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, user_id, title, content, image_urls, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?6)",
                rusqlite::params![id.as_str(), owner.as_str(), title, content, now, now],
            )?;
            Ok(())
        })?;

        self.notify(PostChange::Created {
            owner: owner.clone(),
            id: id.clone(),
        });

        Ok(LiveEntry {
            id,
            owner: owner.clone(),
            title: title.to_string(),
            content: content.to_string(),
            image_urls: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Replace the stored image references of a post.
    #[instrument(skip(self, urls), fields(owner = %owner, post_id = %id, count = urls.len()))]
    pub fn set_images(
        &self,
        owner: &PrincipalId,
        id: &PostId,
        urls: &[String],
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(urls)?;
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE posts SET image_urls = ?1 WHERE id = ?2 AND user_id = ?3",
                rusqlite::params![json, id.as_str(), owner.as_str()],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("post {id}")));
        }

        self.notify(PostChange::Updated {
            owner: owner.clone(),
            id: id.clone(),
        });
        Ok(())
    }

    /// Rewrite title and content (and images when given). Bumps `updated_at`.
    #[instrument(skip(self, update), fields(owner = %owner, post_id = %id))]
    pub fn update(
        &self,
        owner: &PrincipalId,
        id: &PostId,
        update: &PostUpdate,
    ) -> Result<LiveEntry, StoreError> {
        let now = Utc::now().to_rfc3339();
        let images = update
            .image_urls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let changed = self.db.with_conn(|conn| {
            let changed = match &images {
                Some(json) => conn.execute(
                    "UPDATE posts SET title = ?1, content = ?2, image_urls = ?3, updated_at = ?4
                     WHERE id = ?5 AND user_id = ?6",
                    rusqlite::params![
                        update.title,
                        update.content,
                        json,
                        now,
                        id.as_str(),
                        owner.as_str()
                    ],
                )?,
                None => conn.execute(
                    "UPDATE posts SET title = ?1, content = ?2, updated_at = ?3
                     WHERE id = ?4 AND user_id = ?5",
                    rusqlite::params![update.title, update.content, now, id.as_str(), owner.as_str()],
                )?,
            };
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("post {id}")));
        }

        self.notify(PostChange::Updated {
            owner: owner.clone(),
            id: id.clone(),
        });
        self.get(id)
    }

    /// Delete a post owned by `owner`.
    #[instrument(skip(self), fields(owner = %owner, post_id = %id))]
    pub fn delete(&self, owner: &PrincipalId, id: &PostId) -> Result<(), StoreError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM posts WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id.as_str(), owner.as_str()],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("post {id}")));
        }

        self.notify(PostChange::Deleted {
            owner: owner.clone(),
            id: id.clone(),
        });
        Ok(())
    }

    /// Get a post by ID.
    #[instrument(skip(self), fields(post_id = %id))]
    pub fn get(&self, id: &PostId) -> Result<LiveEntry, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_post(row),
                None => Err(StoreError::NotFound(format!("post {id}"))),
            }
        })
    }

    /// Owner of a post, if it exists.
    pub fn owner_of(&self, id: &PostId) -> Result<Option<PrincipalId>, StoreError> {
        self.db.with_conn(|conn| {
            let owner: Option<String> = conn
                .query_row("SELECT user_id FROM posts WHERE id = ?1", [id.as_str()], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(owner.map(PrincipalId::from_raw))
        })
    }

    /// All posts of one owner, newest first.
    #[instrument(skip(self), fields(owner = %owner))]
    pub fn list_for_owner(&self, owner: &PrincipalId) -> Result<Vec<LiveEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let mut rows = stmt.query([owner.as_str()])?;
            let mut posts = Vec::new();
            while let Some(row) = rows.next()? {
                posts.push(row_to_post(row)?);
            }
            Ok(posts)
        })
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> Result<LiveEntry, StoreError> {
    let raw_images: String = row_helpers::get(row, 4, "posts", "image_urls")?;
    Ok(LiveEntry {
        id: PostId::from_raw(row_helpers::get::<String>(row, 0, "posts", "id")?),
        owner: PrincipalId::from_raw(row_helpers::get::<String>(row, 1, "posts", "user_id")?),
        title: row_helpers::get(row, 2, "posts", "title")?,
        content: row_helpers::get(row, 3, "posts", "content")?,
        image_urls: row_helpers::parse_string_list(&raw_images, "posts", "image_urls")?,
        created_at: row_helpers::get(row, 5, "posts", "created_at")?,
        updated_at: row_helpers::get(row, 6, "posts", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> PostRepo {
        PostRepo::new(Database::in_memory().unwrap())
    }

    fn owner() -> PrincipalId {
        PrincipalId::from_raw("author")
    }

    #[test]
    fn create_and_get() {
        let repo = repo();
        let post = repo.create(&owner(), "Kitchen wrap", "walnut sheet").unwrap();
        assert!(post.id.as_str().starts_with("post_"));
        assert!(post.image_urls.is_empty());

        let fetched = repo.get(&post.id).unwrap();
        assert_eq!(fetched, post);
    }

    #[test]
    fn list_is_per_owner_and_newest_first() {
        let repo = repo();
        let first = repo.create(&owner(), "first", "").unwrap();
        let second = repo.create(&owner(), "second", "").unwrap();
        repo.create(&PrincipalId::from_raw("someone-else"), "other", "").unwrap();

        let posts = repo.list_for_owner(&owner()).unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn set_images_round_trips() {
        let repo = repo();
        let post = repo.create(&owner(), "t", "c").unwrap();
        let urls = vec!["https://cdn/x_0.png".to_string(), "https://cdn/x_1.png".to_string()];
        repo.set_images(&owner(), &post.id, &urls).unwrap();
        assert_eq!(repo.get(&post.id).unwrap().image_urls, urls);
    }

    #[test]
    fn update_without_images_keeps_them() {
        let repo = repo();
        let post = repo.create(&owner(), "t", "c").unwrap();
        repo.set_images(&owner(), &post.id, &["keep.png".to_string()]).unwrap();

        let updated = repo
            .update(
                &owner(),
                &post.id,
                &PostUpdate {
                    title: "new title".into(),
                    content: "new content".into(),
                    image_urls: None,
                },
            )
            .unwrap();
        assert_eq!(updated.title, "new title");
        assert_eq!(updated.image_urls, vec!["keep.png"]);
        assert_eq!(updated.created_at, post.created_at);
    }

    #[test]
    fn update_by_other_owner_is_not_found() {
        let repo = repo();
        let post = repo.create(&owner(), "t", "c").unwrap();
        let result = repo.update(
            &PrincipalId::from_raw("intruder"),
            &post.id,
            &PostUpdate::default(),
        );
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_removes_row() {
        let repo = repo();
        let post = repo.create(&owner(), "t", "c").unwrap();
        repo.delete(&owner(), &post.id).unwrap();
        assert!(matches!(repo.get(&post.id), Err(StoreError::NotFound(_))));
        assert!(matches!(repo.delete(&owner(), &post.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn owner_of_reports_missing_as_none() {
        let repo = repo();
        let post = repo.create(&owner(), "t", "c").unwrap();
        assert_eq!(repo.owner_of(&post.id).unwrap(), Some(owner()));
        assert_eq!(repo.owner_of(&PostId::from_raw("post_missing")).unwrap(), None);
    }

    #[test]
    fn corrupt_image_column_is_reported() {
        let repo = repo();
        let post = repo.create(&owner(), "t", "c").unwrap();
        repo.database()
            .with_conn(|conn| {
                conn.execute("UPDATE posts SET image_urls = 'oops' WHERE id = ?1", [post.id.as_str()])?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(
            repo.get(&post.id),
            Err(StoreError::CorruptRow { column: "image_urls", .. })
        ));
    }

    #[test]
    fn writes_are_broadcast() {
        let repo = repo();
        let mut rx = repo.subscribe_changes();
        let post = repo.create(&owner(), "t", "c").unwrap();
        repo.delete(&owner(), &post.id).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            PostChange::Created { owner: owner(), id: post.id.clone() }
        );
        let deleted = rx.try_recv().unwrap();
        assert_eq!(deleted, PostChange::Deleted { owner: owner(), id: post.id });
        assert_eq!(deleted.owner(), &owner());
    }
}
