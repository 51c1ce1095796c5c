use rocket::serde::Serialize;

use crate::folders::{FolderRef, ROOT_FOLDER_NAME};

/// Name shown when a folder's details can't be fetched
pub const UNKNOWN_FOLDER_NAME: &str = "Unknown Folder";

/// Data used to fill the navigation part of the gallery template
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NavData {
    pub is_root: bool,
    pub current_id: String,
    pub current_name: String,
    /// Folder to go back to, `None` meaning the gallery root
    pub parent_id: Option<String>,
    pub url_root: String,
    pub url_current: String,
    /// Empty at the root, where there is nowhere to go back to
    pub url_navigate_up: String,
}

impl NavData {

    /// Generate a full NavData struct for the given folder, based on its resolved identity
    /// (if it could be resolved)
    pub fn from_identity(current_id: &str, identity: Option<&FolderRef>, root_id: &str) -> Self {
        let is_root = current_id == root_id;
        let current_name = match identity {
            Some(folder) => folder.name.clone(),
            None if is_root => ROOT_FOLDER_NAME.to_string(),
            None => UNKNOWN_FOLDER_NAME.to_string(),
        };

        // Never navigate above the root, and going back to the root uses its own URL
        let parent_id = if is_root {
            None
        } else {
            identity
                .and_then(|folder| folder.parent_id.clone())
                .filter(|parent| parent != root_id)
        };
        let url_navigate_up = if is_root {
            "".to_string()
        } else {
            gallery_url(parent_id.as_deref())
        };

        Self {
            is_root,
            current_id: current_id.to_string(),
            current_name,
            parent_id,
            url_root: gallery_url(None),
            url_current: gallery_url(Some(current_id).filter(|_| !is_root)),
            url_navigate_up,
        }
    }

    /// Navigation data used when the backend couldn't be reached at all
    pub fn unavailable(current_id: &str, root_id: &str) -> Self {
        let is_root = current_id == root_id;
        Self {
            is_root,
            current_id: current_id.to_string(),
            current_name: "Error".to_string(),
            parent_id: None,
            url_root: gallery_url(None),
            url_current: gallery_url(Some(current_id).filter(|_| !is_root)),
            url_navigate_up: if is_root { "".to_string() } else { gallery_url(None) },
        }
    }
}

/// URL of the gallery page of the given folder, or of the root
pub fn gallery_url(folder_id: Option<&str>) -> String {
    match folder_id {
        Some(id) => uri!(crate::get_gallery(id)).to_string(),
        None => uri!(crate::get_gallery_root()).to_string(),
    }
}
