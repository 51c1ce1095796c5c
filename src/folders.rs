use crate::storage::{ChildQuery, StorageClient, StorageError};
use rocket::serde::Serialize;
use tracing::{debug, error, info, warn};

/// Display name of the gallery root, whatever the backend calls that folder
pub const ROOT_FOLDER_NAME: &str = "Main Gallery";

/// A folder of the gallery hierarchy
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FolderRef {
    pub id: String,
    pub name: String,
    /// Logical parent, always `None` for the gallery root
    pub parent_id: Option<String>,
}

impl FolderRef {
    /// Synthetic reference for the gallery root
    pub fn root(root_id: &str) -> Self {
        Self {
            id: root_id.to_string(),
            name: ROOT_FOLDER_NAME.to_string(),
            parent_id: None,
        }
    }
}

/// Read and organize the folders stored in the backend
pub struct FolderCatalog<'a> {
    storage: &'a dyn StorageClient,
    page_size: u32,
}

impl<'a> FolderCatalog<'a> {
    pub fn new(storage: &'a dyn StorageClient, page_size: u32) -> Self {
        Self { storage, page_size }
    }

    /// Return the non-trashed folders directly inside `parent_id`. Backend failures are
    /// logged and reported as an empty list.
    pub async fn list_child_folders(&self, parent_id: &str) -> Vec<FolderRef> {
        match self.try_list_child_folders(parent_id).await {
            Ok(folders) => folders,
            Err(e) => {
                error!(parent_id, kind = ?e.kind(), "unable to list subfolders : {e}");
                Vec::new()
            }
        }
    }

    pub async fn try_list_child_folders(&self, parent_id: &str) -> Result<Vec<FolderRef>, StorageError> {
        let query = ChildQuery::folders(self.page_size);
        let listing = self.storage.list_children(parent_id, &query).await?;
        if listing.truncated {
            warn!(parent_id, "folder has more than {} subfolders, only the first ones are shown", self.page_size);
        }
        let folders: Vec<FolderRef> = listing.entries.into_iter()
            .filter(|entry| query.matches(entry))
            .map(|entry| FolderRef {
                id: entry.id,
                name: entry.name,
                parent_id: Some(parent_id.to_string()),
            })
            .collect();
        info!(parent_id, "found {} subfolders", folders.len());
        Ok(folders)
    }

    /// Resolve the display name and logical parent of a folder. The gallery root is never
    /// looked up : it is always named "Main Gallery" and has no parent.
    pub async fn resolve_folder_identity(&self, folder_id: &str, root_id: &str) -> Option<FolderRef> {
        if folder_id == root_id {
            return Some(FolderRef::root(root_id));
        }
        match self.storage.get_metadata(folder_id).await {
            Ok(metadata) => {
                debug!(folder_id, name = %metadata.name, parents = ?metadata.parent_ids, "resolved folder");
                Some(FolderRef {
                    id: metadata.id,
                    name: metadata.name,
                    parent_id: metadata.parent_ids.into_iter().next(),
                })
            }
            Err(e) => {
                error!(folder_id, kind = ?e.kind(), "unable to fetch folder details : {e}");
                None
            }
        }
    }

    /// Return the id of the folder named exactly `name` inside `parent_id`, creating it if
    /// it doesn't exist yet. Returns `None` if the lookup or the creation failed, in which
    /// case callers keep using `parent_id`.
    pub async fn find_or_create(&self, name: &str, parent_id: &str) -> Option<String> {
        let query = ChildQuery::folders_named(name, self.page_size);
        let listing = match self.storage.list_children(parent_id, &query).await {
            Ok(listing) => listing,
            Err(e) => {
                error!(name, parent_id, "unable to look up folder : {e}");
                return None;
            }
        };

        // Names are expected to be unique, the first match wins otherwise
        let mut matches = listing.entries.into_iter().filter(|entry| query.matches(entry));
        if let Some(found) = matches.next() {
            let duplicates = matches.count();
            if duplicates > 0 {
                warn!(name, parent_id, "{} other folders share this name, using {}", duplicates, found.id);
            }
            info!(name, id = %found.id, "folder found");
            return Some(found.id);
        }

        info!(name, parent_id, "folder not found, creating it");
        match self.storage.create_folder(name, parent_id).await {
            Ok(id) if id.is_empty() => {
                warn!(name, parent_id, "backend created the folder but returned no id");
                None
            }
            Ok(id) => {
                info!(name, %id, "folder created");
                Some(id)
            }
            Err(e) => {
                error!(name, parent_id, "unable to create folder : {e}");
                None
            }
        }
    }
}
