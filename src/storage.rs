//! Contract of the remote hierarchical file store holding every folder and photo.
//!
//! Nothing in this crate persists state locally: folders, photos and their metadata are
//! read through a `StorageClient` on every request. The Google Drive implementation lives
//! in `drive.rs`; tests use the in-memory store from `testing.rs`.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Media type the backend uses to mark an entry as a folder
pub const FOLDER_MEDIA_TYPE: &str = "application/vnd.google-apps.folder";

/// Shared handle managed by Rocket and reused across requests
pub type Storage = Arc<dyn StorageClient>;

/// Errors reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached, or did not answer in time
    #[error("storage backend unavailable : {0}")]
    Unavailable(String),
    #[error("storage authentication failed : {0}")]
    Auth(String),
    #[error("not found : {0}")]
    NotFound(String),
    #[error("rate limited by the storage backend : {0}")]
    RateLimited(String),
    #[error("storage backend error : {0}")]
    Backend(String),
}

/// Coarse classification used when logging failures. Callers never branch on it,
/// except for authentication failures when a request starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BackendUnavailable,
    NotFound,
}

impl StorageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StorageError::NotFound(_) => FailureKind::NotFound,
            _ => FailureKind::BackendUnavailable,
        }
    }
}

/// Kind of children requested from `list_children`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Folder,
    Image,
}

/// Predicate applied by the backend when listing the children of a folder.
/// Trashed entries are always excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildQuery {
    pub kind: ChildKind,
    /// Exact, case-sensitive name filter
    pub name: Option<String>,
    pub page_size: u32,
}

impl ChildQuery {
    pub fn folders(page_size: u32) -> Self {
        Self { kind: ChildKind::Folder, name: None, page_size }
    }

    pub fn folders_named(name: &str, page_size: u32) -> Self {
        Self { kind: ChildKind::Folder, name: Some(name.to_string()), page_size }
    }

    pub fn images(page_size: u32) -> Self {
        Self { kind: ChildKind::Image, name: None, page_size }
    }

    /// Check if the given entry satisfies this query
    pub fn matches(&self, entry: &RemoteEntry) -> bool {
        if entry.trashed {
            return false;
        }
        let kind_ok = match self.kind {
            ChildKind::Folder => entry.media_type == FOLDER_MEDIA_TYPE,
            ChildKind::Image => entry.media_type.starts_with("image/"),
        };
        kind_ok && self.name.as_ref().map_or(true, |name| &entry.name == name)
    }
}

/// A child entry as reported by the backend, before any normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub media_type: String,
    pub trashed: bool,
    pub thumbnail_url: Option<String>,
    pub view_url: Option<String>,
    pub download_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of children. `truncated` is set when the backend has more entries than
/// the requested page size; those are never fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub entries: Vec<RemoteEntry>,
    pub truncated: bool,
}

/// Name and physical parents of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub id: String,
    pub name: String,
    pub parent_ids: Vec<String>,
}

/// A file to hand over to the backend
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    pub bytes: &'a [u8],
    pub file_name: &'a str,
    pub media_type: &'a str,
}

/// What the backend returned after storing a file. Fields other than `id` may be
/// missing when the backend only partially succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub view_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub download_url: Option<String>,
}

/// Authenticated handle to the remote store.
#[rocket::async_trait]
pub trait StorageClient: Send + Sync {
    /// Make sure the handle holds valid credentials. Called once when a request starts,
    /// before any listing or upload.
    async fn authenticate(&self) -> Result<(), StorageError>;

    /// List the children of `parent_id` matching the given query
    async fn list_children(&self, parent_id: &str, query: &ChildQuery) -> Result<Listing, StorageError>;

    async fn get_metadata(&self, id: &str) -> Result<Metadata, StorageError>;

    /// Create a folder and return its id
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, StorageError>;

    async fn store(&self, file: NewFile<'_>, dest_folder_id: &str) -> Result<StoredFile, StorageError>;
}
