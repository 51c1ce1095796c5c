//! Route received photos to their destination folder and hand them over to the backend.
//!
//! An upload goes through these steps :
//!   - received : file content, name, and optional target subfolder name
//!   - destination resolved : the subfolder is found or created under the root, and if that
//!     fails the root is used instead (the member is warned, the upload goes on)
//!   - stored : the file is sent to the backend, exactly once
//!   - terminal : `Succeeded` with a link to the photo, or `Failed` with a reason

use crate::folders::FolderCatalog;
use crate::photos::NULL_LINK;
use crate::storage::{NewFile, StorageClient};
use regex::Regex;
use rocket::http::ContentType;
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Media type used when none can be determined from the upload
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// A photo received from the member, ready to be routed
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub media_type: String,
    /// Name of the subfolder of the root to upload into, if any
    pub target_folder_name: Option<String>,
}

/// Folder the photo ended up being sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Root,
    Subfolder { name: String, id: String },
    /// The requested subfolder couldn't be found or created
    RootFallback { requested: String },
}

impl Destination {
    pub fn folder_id<'a>(&'a self, root_id: &'a str) -> &'a str {
        match self {
            Destination::Subfolder { id, .. } => id.as_str(),
            Destination::Root | Destination::RootFallback { .. } => root_id,
        }
    }

    /// Warning to show the member, if the photo didn't go where it was asked to
    pub fn warning(&self) -> Option<String> {
        match self {
            Destination::RootFallback { requested } => Some(format!(
                "Warning: Could not use subfolder '{requested}'. Photo will be uploaded to the main gallery."
            )),
            _ => None,
        }
    }
}

/// Terminal state of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Succeeded { id: String, view_url: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub file_name: String,
    pub destination: Destination,
    pub outcome: UploadOutcome,
}

/// Send uploads to their destination folder under a fixed root
pub struct UploadRouter<'a> {
    storage: &'a dyn StorageClient,
    folders: FolderCatalog<'a>,
    root_id: &'a str,
}

impl<'a> UploadRouter<'a> {
    pub fn new(storage: &'a dyn StorageClient, root_id: &'a str, folders_page_size: u32) -> Self {
        Self {
            storage,
            folders: FolderCatalog::new(storage, folders_page_size),
            root_id,
        }
    }

    /// Pick the destination folder of an upload. Never fails : any problem with the
    /// subfolder falls back to the root.
    pub async fn resolve_destination(&self, target_folder_name: Option<&str>) -> Destination {
        let name = match target_folder_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => return Destination::Root,
        };
        info!(name, "member specified a subfolder");
        match self.folders.find_or_create(name, self.root_id).await {
            Some(id) => {
                info!(name, %id, "using subfolder for upload");
                Destination::Subfolder { name: name.to_string(), id }
            }
            None => {
                warn!(name, root_id = self.root_id, "could not find or create subfolder, uploading to the main gallery");
                Destination::RootFallback { requested: name.to_string() }
            }
        }
    }

    /// Route the given upload to its destination and store it. There is no retry : a
    /// failed store is reported as is.
    pub async fn route(&self, upload: PhotoUpload) -> UploadReport {
        let destination = self.resolve_destination(upload.target_folder_name.as_deref()).await;
        let dest_id = destination.folder_id(self.root_id).to_string();

        let file = NewFile {
            bytes: &upload.bytes,
            file_name: &upload.file_name,
            media_type: &upload.media_type,
        };
        let outcome = match self.storage.store(file, &dest_id).await {
            // Anything with an identifier counts as stored, even with incomplete metadata
            Ok(stored) if !stored.id.is_empty() => {
                let view_url = stored.view_url
                    .filter(|url| !url.is_empty())
                    .unwrap_or_else(|| NULL_LINK.to_string());
                info!(file_name = %upload.file_name, id = %stored.id, %view_url, "photo uploaded");
                debug!(id = %stored.id, thumbnail = ?stored.thumbnail_url, download = ?stored.download_url, "stored file links");
                UploadOutcome::Succeeded { id: stored.id, view_url }
            }
            Ok(_) => {
                error!(file_name = %upload.file_name, "backend accepted the upload but returned no identifier");
                UploadOutcome::Failed { reason: "the storage backend returned no identifier".to_string() }
            }
            Err(e) => {
                error!(file_name = %upload.file_name, dest_id = %dest_id, "upload failed : {e}");
                UploadOutcome::Failed { reason: e.to_string() }
            }
        };

        UploadReport {
            file_name: upload.file_name,
            destination,
            outcome,
        }
    }
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap())
}

/// Turn a client-provided file name into a safe one : path components are dropped,
/// whitespace becomes `_` and anything else outside `[A-Za-z0-9_.-]` is removed.
/// If nothing is left, `photo` is used, and a missing extension is derived from the
/// given content type.
pub fn secure_filename(raw: &str, content_type: Option<&ContentType>) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let spaced = base.split_whitespace().collect::<Vec<&str>>().join("_");
    let cleaned = unsafe_chars().replace_all(&spaced, "");
    let mut name = cleaned.trim_start_matches(['.', '_']).to_string();
    if name.is_empty() {
        name = "photo".to_string();
    }
    if !name.contains('.') {
        if let Some(ext) = content_type.and_then(|ct| ct.extension()) {
            name = format!("{name}.{ext}");
        }
    }
    name
}

/// Determine the media type of an upload : the content type sent by the client if it is an
/// image, else a guess from the file extension, else `image/jpeg`
pub fn media_type_for(file_name: &str, content_type: Option<&ContentType>) -> String {
    if let Some(ct) = content_type.filter(|ct| ct.top() == "image") {
        return format!("{}/{}", ct.top(), ct.sub());
    }
    let guessed = file_name.rsplit_once('.')
        .and_then(|(_, ext)| ContentType::from_extension(ext))
        .filter(|ct| ct.top() == "image");
    match guessed {
        Some(ct) => format!("{}/{}", ct.top(), ct.sub()),
        None => {
            warn!(file_name, "could not determine image media type, defaulting to {DEFAULT_MEDIA_TYPE}");
            DEFAULT_MEDIA_TYPE.to_string()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStorage, ROOT};

    fn upload(target: Option<&str>) -> PhotoUpload {
        PhotoUpload {
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
            file_name: "ski.jpg".to_string(),
            media_type: "image/jpeg".to_string(),
            target_folder_name: target.map(|t| t.to_string()),
        }
    }

    #[rocket::async_test]
    async fn upload_into_a_new_subfolder_creates_it_once() {
        let storage = MemoryStorage::new();
        let router = UploadRouter::new(&storage, ROOT, 100);

        let report = router.route(upload(Some("Winter2024"))).await;
        let creates = storage.create_calls();
        assert_eq!(creates, vec![("Winter2024".to_string(), ROOT.to_string())]);

        let folder_id = match &report.destination {
            Destination::Subfolder { name, id } => {
                assert_eq!(name, "Winter2024");
                id.clone()
            }
            other => panic!("unexpected destination {other:?}"),
        };
        assert_eq!(storage.store_calls(), vec![("ski.jpg".to_string(), folder_id, 4)]);
        match report.outcome {
            UploadOutcome::Succeeded { id, view_url } => assert_eq!(view_url, format!("https://view.example/{id}")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[rocket::async_test]
    async fn second_upload_reuses_the_subfolder() {
        let storage = MemoryStorage::new();
        let router = UploadRouter::new(&storage, ROOT, 100);

        let first = router.route(upload(Some("Winter2024"))).await;
        let second = router.route(upload(Some("  Winter2024 "))).await;
        assert_eq!(first.destination, second.destination);
        assert_eq!(storage.create_calls().len(), 1);
    }

    #[rocket::async_test]
    async fn blank_target_goes_to_the_root() {
        let storage = MemoryStorage::new();
        let router = UploadRouter::new(&storage, ROOT, 100);

        let report = router.route(upload(Some("   "))).await;
        assert_eq!(report.destination, Destination::Root);
        assert_eq!(report.destination.warning(), None);
        assert!(storage.create_calls().is_empty());
        assert_eq!(storage.store_calls()[0].1, ROOT);
    }

    #[rocket::async_test]
    async fn folder_failure_falls_back_to_the_root() {
        let mut storage = MemoryStorage::new();
        storage.fail_lookup = true;
        let router = UploadRouter::new(&storage, ROOT, 100);

        let report = router.route(upload(Some("Winter2024"))).await;
        assert_eq!(report.destination, Destination::RootFallback { requested: "Winter2024".to_string() });
        assert!(report.destination.warning().unwrap().contains("Winter2024"));
        assert_eq!(storage.store_calls()[0].1, ROOT);
        assert!(matches!(report.outcome, UploadOutcome::Succeeded { .. }));
    }

    #[rocket::async_test]
    async fn store_failure_is_terminal_and_not_retried() {
        let mut storage = MemoryStorage::new();
        storage.fail_create = true;
        storage.fail_store = true;
        let router = UploadRouter::new(&storage, ROOT, 100);

        let report = router.route(upload(Some("Winter2024"))).await;
        assert!(matches!(report.destination, Destination::RootFallback { .. }));
        assert!(matches!(report.outcome, UploadOutcome::Failed { .. }));
        assert_eq!(storage.store_calls().len(), 1);
    }

    #[rocket::async_test]
    async fn stored_file_without_link_is_still_a_success() {
        let mut storage = MemoryStorage::new();
        storage.store_without_links = true;
        let router = UploadRouter::new(&storage, ROOT, 100);

        let report = router.route(upload(None)).await;
        match report.outcome {
            UploadOutcome::Succeeded { id, view_url } => {
                assert!(!id.is_empty());
                assert_eq!(view_url, NULL_LINK);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(storage.store_calls().len(), 1);
    }

    #[rocket::async_test]
    async fn stored_file_without_identifier_is_a_failure() {
        let mut storage = MemoryStorage::new();
        storage.store_empty_id = true;
        let router = UploadRouter::new(&storage, ROOT, 100);

        let report = router.route(upload(None)).await;
        assert!(matches!(report.outcome, UploadOutcome::Failed { .. }));
        assert_eq!(report.destination, Destination::Root);
        assert_eq!(storage.store_calls().len(), 1);
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(secure_filename("../../etc/passwd", None), "passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\My Photo (1).JPG", None), "My_Photo_1.JPG");
        assert_eq!(secure_filename("élan.png", None), "lan.png");
        assert_eq!(secure_filename("...", None), "photo");
        assert_eq!(secure_filename("", Some(&ContentType::PNG)), "photo.png");
        assert_eq!(secure_filename("snow", Some(&ContentType::GIF)), "snow.gif");
    }

    #[test]
    fn media_type_prefers_the_client_then_the_extension() {
        assert_eq!(media_type_for("a.bin", Some(&ContentType::PNG)), "image/png");
        assert_eq!(media_type_for("a.gif", Some(&ContentType::Binary)), "image/gif");
        assert_eq!(media_type_for("a.txt", None), DEFAULT_MEDIA_TYPE);
        assert_eq!(media_type_for("noext", None), DEFAULT_MEDIA_TYPE);
    }
}
