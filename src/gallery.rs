//! Gallery pages : the folders of the current folder, each with a preview photo and a
//! photo count, followed by the photos of the current folder itself.

use crate::config::Config;
use crate::folders::{FolderCatalog, FolderRef};
use crate::nav_data::{gallery_url, NavData};
use crate::photos::{PhotoCatalog, PhotoRef};
use crate::storage::StorageClient;
use rocket::futures::stream::{self, StreamExt};
use rocket::serde::Serialize;
use tracing::{error, info, warn};

/// Message shown when the backend can't be reached when a page is requested
pub const CONNECTION_ERROR_MESSAGE: &str = "Error connecting to Google Drive. Please try again later or contact support.";

/// A folder tile, with the first photo of the folder used as a preview
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EnrichedFolderRef {
    #[serde(flatten)]
    pub folder: FolderRef,
    /// Gallery page of this folder
    pub url: String,
    pub photo_count: usize,
    pub preview_photo: Option<PhotoRef>,
}

impl EnrichedFolderRef {
    pub fn new(folder: FolderRef, photos: Vec<PhotoRef>) -> Self {
        Self {
            url: gallery_url(Some(&folder.id)),
            folder,
            photo_count: photos.len(),
            preview_photo: photos.into_iter().next(),
        }
    }

    /// Tile of a folder whose photos couldn't be listed
    pub fn empty(folder: FolderRef) -> Self {
        Self {
            url: gallery_url(Some(&folder.id)),
            folder,
            photo_count: 0,
            preview_photo: None,
        }
    }
}

/// Some folders of a listing couldn't be enriched; they are shown without preview
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("partial enrichment failure : {failed} of {total} folders have no preview")]
pub struct PartialEnrichmentFailure {
    pub failed: usize,
    pub total: usize,
}

/// Annotate folder listings with a preview photo and a photo count
pub struct GalleryEnricher<'a> {
    photos: &'a PhotoCatalog<'a>,
    concurrency: usize,
}

impl<'a> GalleryEnricher<'a> {
    pub fn new(photos: &'a PhotoCatalog<'a>, concurrency: usize) -> Self {
        Self { photos, concurrency: concurrency.max(1) }
    }

    /// Enrich every folder independently. The output has the same length and order as
    /// the input, folders that failed have no preview and a count of 0.
    pub async fn enrich(&self, folders: Vec<FolderRef>) -> Vec<EnrichedFolderRef> {
        let (enriched, failure) = self.enrich_with_report(folders).await;
        if let Some(failure) = failure {
            warn!("{failure}");
        }
        enriched
    }

    pub async fn enrich_with_report(&self, folders: Vec<FolderRef>) -> (Vec<EnrichedFolderRef>, Option<PartialEnrichmentFailure>) {
        let total = folders.len();

        // `buffered` yields results in the order of the input stream
        let results: Vec<Result<EnrichedFolderRef, EnrichedFolderRef>> = stream::iter(folders)
            .map(|folder| async move {
                match self.photos.try_list_photos(&folder.id).await {
                    Ok(photos) => Ok(EnrichedFolderRef::new(folder, photos)),
                    Err(e) => {
                        error!(folder_id = %folder.id, kind = ?e.kind(), "unable to enrich folder : {e}");
                        Err(EnrichedFolderRef::empty(folder))
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        let enriched = results.into_iter()
            .map(|r| r.unwrap_or_else(|empty| empty))
            .collect();
        let failure = (failed > 0).then_some(PartialEnrichmentFailure { failed, total });
        (enriched, failure)
    }
}

/// Everything displayed by a gallery page
#[derive(Serialize, Debug)]
pub struct GalleryPage {
    pub nav: NavData,
    pub folders: Vec<EnrichedFolderRef>,
    pub photos: Vec<PhotoRef>,
    pub error: Option<String>,
}

/// Build the gallery page of the given folder, or of the root if none is given.
/// This never fails : backend failures lead to empty listings.
pub async fn load_page(storage: &dyn StorageClient, config: &Config, folder_id: Option<&str>) -> GalleryPage {
    let root_id = config.ROOT_FOLDER_ID.as_str();
    let current_id = folder_id.unwrap_or(root_id);

    // Credentials are checked before anything is listed
    if let Err(e) = storage.authenticate().await {
        error!(folder_id = current_id, "unable to authenticate with the storage backend : {e}");
        return GalleryPage {
            nav: NavData::unavailable(current_id, root_id),
            folders: Vec::new(),
            photos: Vec::new(),
            error: Some(CONNECTION_ERROR_MESSAGE.to_string()),
        };
    }

    info!(folder_id = current_id, "listing gallery content");
    let folder_catalog = FolderCatalog::new(storage, config.FOLDERS_PAGE_SIZE);
    let photo_catalog = PhotoCatalog::new(storage, config.PHOTOS_PAGE_SIZE, &config.PLACEHOLDER_IMAGE);
    let enricher = GalleryEnricher::new(&photo_catalog, config.ENRICH_CONCURRENCY);

    let child_folders = folder_catalog.list_child_folders(current_id).await;
    let folders = enricher.enrich(child_folders).await;
    let photos = photo_catalog.list_photos(current_id).await;

    let identity = folder_catalog.resolve_folder_identity(current_id, root_id).await;
    if identity.is_none() {
        warn!(folder_id = current_id, "could not retrieve folder details, showing it with a default name");
    }

    GalleryPage {
        nav: NavData::from_identity(current_id, identity.as_ref(), root_id),
        folders,
        photos,
        error: None,
    }
}
