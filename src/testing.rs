//! In-memory `StorageClient` used by the unit and route tests.

use crate::storage::{ChildQuery, Listing, Metadata, NewFile, RemoteEntry, StorageClient, StorageError, StoredFile, FOLDER_MEDIA_TYPE};
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use std::collections::HashSet;
use std::sync::Mutex;

pub const ROOT: &str = "root-folder";

/// Argon2 hash of the given password, with a fixed salt
pub fn password_hash(password: &str) -> String {
    let salt = SaltString::encode_b64(b"cariboushots-salt").unwrap();
    Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string()
}

#[derive(Default)]
struct State {
    /// (parent id, entry), in insertion order
    entries: Vec<(String, RemoteEntry)>,
    next_id: u32,
    create_calls: Vec<(String, String)>,
    store_calls: Vec<(String, String, usize)>,
    list_calls: u32,
}

/// Fake backend keeping every entry in memory. Failures can be injected per operation,
/// and listings can be made to fail for specific folders.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    pub fail_auth: bool,
    pub fail_lookup: bool,
    pub fail_create: bool,
    pub fail_store: bool,
    /// Stored files come back without any link
    pub store_without_links: bool,
    /// Stored files come back without an identifier
    pub store_empty_id: bool,
    pub failing_folders: HashSet<String>,
    pub root_physical_parent: Option<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a folder under `parent` and return its id
    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        self.add_entry(parent, name, FOLDER_MEDIA_TYPE, false)
    }

    pub fn add_trashed_folder(&self, parent: &str, name: &str) -> String {
        self.add_entry(parent, name, FOLDER_MEDIA_TYPE, true)
    }

    /// Add a photo with every preview field filled
    pub fn add_photo(&self, parent: &str, name: &str) -> String {
        let id = self.add_entry(parent, name, "image/jpeg", false);
        let mut state = self.state.lock().unwrap();
        if let Some((_, entry)) = state.entries.iter_mut().find(|(_, e)| e.id == id) {
            entry.thumbnail_url = Some(format!("https://thumbs.example/{id}"));
            entry.view_url = Some(format!("https://view.example/{id}"));
            entry.download_url = Some(format!("https://dl.example/{id}"));
        }
        id
    }

    /// Add an entry without any preview field
    pub fn add_entry(&self, parent: &str, name: &str, media_type: &str, trashed: bool) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("id{}", state.next_id);
        state.entries.push((parent.to_string(), RemoteEntry {
            id: id.clone(),
            name: name.to_string(),
            media_type: media_type.to_string(),
            trashed,
            ..Default::default()
        }));
        id
    }

    pub fn create_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().create_calls.clone()
    }

    /// (file name, destination folder id, size) of every stored file
    pub fn store_calls(&self) -> Vec<(String, String, usize)> {
        self.state.lock().unwrap().store_calls.clone()
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().unwrap().list_calls
    }
}

#[rocket::async_trait]
impl StorageClient for MemoryStorage {
    async fn authenticate(&self) -> Result<(), StorageError> {
        if self.fail_auth {
            return Err(StorageError::Auth("invalid grant".to_string()));
        }
        Ok(())
    }

    async fn list_children(&self, parent_id: &str, query: &ChildQuery) -> Result<Listing, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if self.failing_folders.contains(parent_id) || (self.fail_lookup && query.name.is_some()) {
            return Err(StorageError::Unavailable("connection reset".to_string()));
        }
        let matching: Vec<RemoteEntry> = state.entries.iter()
            .filter(|(parent, entry)| parent == parent_id && query.matches(entry))
            .map(|(_, entry)| entry.clone())
            .collect();
        let truncated = matching.len() > query.page_size as usize;
        Ok(Listing {
            entries: matching.into_iter().take(query.page_size as usize).collect(),
            truncated,
        })
    }

    async fn get_metadata(&self, id: &str) -> Result<Metadata, StorageError> {
        if id == ROOT {
            return Ok(Metadata {
                id: id.to_string(),
                name: "Physical root name".to_string(),
                parent_ids: self.root_physical_parent.iter().cloned().collect(),
            });
        }
        let state = self.state.lock().unwrap();
        let metadata = state.entries.iter()
            .find(|(_, entry)| entry.id == id)
            .map(|(parent, entry)| Metadata {
                id: entry.id.clone(),
                name: entry.name.clone(),
                parent_ids: vec![parent.clone()],
            });
        metadata.ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, StorageError> {
        self.state.lock().unwrap().create_calls.push((name.to_string(), parent_id.to_string()));
        if self.fail_create {
            return Err(StorageError::RateLimited("quota exceeded".to_string()));
        }
        Ok(self.add_folder(parent_id, name))
    }

    async fn store(&self, file: NewFile<'_>, dest_folder_id: &str) -> Result<StoredFile, StorageError> {
        self.state.lock().unwrap().store_calls.push((file.file_name.to_string(), dest_folder_id.to_string(), file.bytes.len()));
        if self.fail_store {
            return Err(StorageError::Backend("HTTP 500".to_string()));
        }
        let id = self.add_entry(dest_folder_id, file.file_name, file.media_type, false);
        if self.store_empty_id {
            return Ok(StoredFile {
                view_url: Some(format!("https://view.example/{id}")),
                ..Default::default()
            });
        }
        if self.store_without_links {
            return Ok(StoredFile { id, ..Default::default() });
        }
        Ok(StoredFile {
            view_url: Some(format!("https://view.example/{id}")),
            id,
            ..Default::default()
        })
    }
}
