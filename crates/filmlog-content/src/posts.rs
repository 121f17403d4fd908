//! Creating, editing and deleting live posts together with their images.
//!
//! Images arrive as [`ImagePayload`]s. Inline ones are decoded and uploaded
//! to `images/<owner>/<post>_<n>.png` before the post row records their
//! public URLs, so a saved post never carries a `data:` URL.

use std::collections::HashSet;
use std::sync::Arc;

use filmlog_core::{DataUrl, ImagePayload, LiveEntry, PostId, PrincipalId};
use filmlog_store::{ObjectStore, PostRepo, PostUpdate, StoreError};
use tracing::{info, instrument, warn};

use crate::error::ContentError;

/// A post as submitted from the editor.
#[derive(Clone, Debug, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub images: Vec<ImagePayload>,
}

/// An edit. Every `None` field keeps the stored value.
#[derive(Clone, Debug, Default)]
pub struct PostEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    pub images: Option<Vec<ImagePayload>>,
}

pub fn image_key(owner: &PrincipalId, post: &PostId, index: usize) -> String {
    format!("images/{owner}/{post}_{index}.png")
}

fn image_prefix(owner: &PrincipalId, post: &PostId) -> String {
    format!("images/{owner}/{post}_")
}

#[derive(Clone)]
pub struct PostService {
    repo: PostRepo,
    objects: Arc<dyn ObjectStore>,
}

impl PostService {
    pub fn new(repo: PostRepo, objects: Arc<dyn ObjectStore>) -> Self {
        Self { repo, objects }
    }

    pub fn repo(&self) -> &PostRepo {
        &self.repo
    }

    /// Insert the post, upload its inline images, then record their URLs.
    ///
    /// An image that fails to upload is dropped from the post; the post
    /// itself is kept.
    #[instrument(skip(self, post), fields(owner = %owner, images = post.images.len()))]
    pub async fn create(&self, owner: &PrincipalId, post: NewPost) -> Result<LiveEntry, ContentError> {
        validate_title(&post.title)?;
        let decoded = decode_all(&post.images)?;

        let mut entry = self.repo.create(owner, post.title.trim(), &post.content)?;
        if post.images.is_empty() {
            return Ok(entry);
        }

        let urls = self.store_images(owner, &entry.id, decoded).await;
        if !urls.is_empty() {
            self.repo.set_images(owner, &entry.id, &urls)?;
        }
        entry.image_urls = urls;
        info!(post_id = %entry.id, images = entry.image_urls.len(), "post created");
        Ok(entry)
    }

    /// Rewrite a post. Stored images keep their URLs and position; inline
    /// ones are uploaded and take the slot they were given.
    #[instrument(skip(self, edit), fields(owner = %owner, post_id = %id))]
    pub async fn update(
        &self,
        owner: &PrincipalId,
        id: &PostId,
        edit: PostEdit,
    ) -> Result<LiveEntry, ContentError> {
        if let Some(title) = &edit.title {
            validate_title(title)?;
        }
        self.check_owner(owner, id)?;
        let current = self.repo.get(id)?;

        let image_urls = match &edit.images {
            Some(images) => {
                let decoded = decode_all(images)?;
                Some(self.store_images(owner, id, decoded).await)
            }
            None => None,
        };

        let update = PostUpdate {
            title: edit.title.map_or(current.title, |t| t.trim().to_string()),
            content: edit.content.unwrap_or(current.content),
            image_urls,
        };
        Ok(self.repo.update(owner, id, &update)?)
    }

    /// Delete a post and, best effort, its uploaded images.
    #[instrument(skip(self), fields(owner = %owner, post_id = %id))]
    pub async fn delete(&self, owner: &PrincipalId, id: &PostId) -> Result<(), ContentError> {
        self.check_owner(owner, id)?;
        self.repo.delete(owner, id)?;

        match self.objects.remove_prefix(&image_prefix(owner, id)).await {
            Ok(removed) => info!(removed, "post deleted"),
            Err(e) => warn!(error = %e, "post deleted but its images were not removed"),
        }
        Ok(())
    }

    fn check_owner(&self, owner: &PrincipalId, id: &PostId) -> Result<(), ContentError> {
        match self.repo.owner_of(id)? {
            Some(actual) if &actual == owner => Ok(()),
            Some(_) => Err(ContentError::NotPermitted(format!("post {id} belongs to another user"))),
            None => Err(StoreError::NotFound(format!("post {id}")).into()),
        }
    }

    /// Upload inline slots and return the final URL list in slot order.
    async fn store_images(&self, owner: &PrincipalId, id: &PostId, slots: Vec<Slot>) -> Vec<String> {
        // Keys already referenced by kept images are never overwritten.
        let kept: HashSet<&str> = slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Stored(url) => Some(url.as_str()),
                Slot::Inline(_) => None,
            })
            .collect();

        let mut used = HashSet::new();
        let mut urls = Vec::with_capacity(slots.len());
        for (position, slot) in slots.iter().enumerate() {
            match slot {
                Slot::Stored(url) => urls.push(url.clone()),
                Slot::Inline(data) => {
                    let mut index = position;
                    let mut key = image_key(owner, id, index);
                    while kept.contains(self.objects.public_url(&key).as_str()) || used.contains(&key) {
                        index += 1;
                        key = image_key(owner, id, index);
                    }
                    match self.objects.put(&key, data.bytes.clone()).await {
                        Ok(url) => {
                            used.insert(key);
                            urls.push(url);
                        }
                        Err(e) => warn!(key = %key, error = %e, "image upload failed, skipping"),
                    }
                }
            }
        }
        urls
    }
}

enum Slot {
    Stored(String),
    Inline(DataUrl),
}

fn validate_title(title: &str) -> Result<(), ContentError> {
    if title.trim().is_empty() {
        return Err(ContentError::EmptyTitle);
    }
    Ok(())
}

fn decode_all(images: &[ImagePayload]) -> Result<Vec<Slot>, ContentError> {
    images
        .iter()
        .enumerate()
        .map(|(index, payload)| match payload {
            ImagePayload::Stored(url) => Ok(Slot::Stored(url.clone())),
            ImagePayload::Inline(raw) => DataUrl::decode(raw)
                .map(Slot::Inline)
                .map_err(|source| ContentError::InvalidImage { index, source }),
        })
        .collect()
}
