use crate::storage::{ChildQuery, RemoteEntry, StorageClient, StorageError};
use chrono::{DateTime, Utc};
use rocket::serde::Serialize;
use tracing::{error, info, warn};

/// Link used in place of a missing view URL
pub const NULL_LINK: &str = "#";

/// A photo stored in a gallery folder, with its preview fields normalized :
/// `thumbnail_url` and `view_url` are never empty.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PhotoRef {
    pub id: String,
    pub name: String,
    pub thumbnail_url: String,
    pub view_url: String,
    pub download_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl PhotoRef {
    /// Build a PhotoRef from a backend entry, replacing missing preview fields with the given
    /// placeholder image and the null link
    pub fn from_entry(entry: RemoteEntry, placeholder_image: &str) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            thumbnail_url: non_empty(entry.thumbnail_url).unwrap_or_else(|| placeholder_image.to_string()),
            view_url: non_empty(entry.view_url).unwrap_or_else(|| NULL_LINK.to_string()),
            download_url: non_empty(entry.download_url),
            created_at: entry.created_at,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Read the photos stored in the backend
pub struct PhotoCatalog<'a> {
    storage: &'a dyn StorageClient,
    page_size: u32,
    placeholder_image: &'a str,
}

impl<'a> PhotoCatalog<'a> {
    pub fn new(storage: &'a dyn StorageClient, page_size: u32, placeholder_image: &'a str) -> Self {
        Self { storage, page_size, placeholder_image }
    }

    /// Return the first page of photos inside `folder_id`, in the backend's order.
    /// Backend failures are logged and reported as an empty list.
    pub async fn list_photos(&self, folder_id: &str) -> Vec<PhotoRef> {
        match self.try_list_photos(folder_id).await {
            Ok(photos) => photos,
            Err(e) => {
                error!(folder_id, kind = ?e.kind(), "unable to list photos : {e}");
                Vec::new()
            }
        }
    }

    pub async fn try_list_photos(&self, folder_id: &str) -> Result<Vec<PhotoRef>, StorageError> {
        let query = ChildQuery::images(self.page_size);
        let listing = self.storage.list_children(folder_id, &query).await?;
        if listing.truncated {
            warn!(folder_id, "folder has more than {} photos, only the first page is shown", self.page_size);
        }
        let photos: Vec<PhotoRef> = listing.entries.into_iter()
            .filter(|entry| query.matches(entry))
            .take(self.page_size as usize)
            .map(|entry| PhotoRef::from_entry(entry, self.placeholder_image))
            .collect();
        info!(folder_id, "found {} photos", photos.len());
        Ok(photos)
    }
}
