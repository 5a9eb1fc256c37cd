use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

use crate::activity::{ActivityEvent, DownloadActivity};
use crate::db::{
    Photo, PhotoId, PhotoOrder, PhotoSummary, PhotosView, Pin, PinId, Store, StoreError,
};
use crate::geo::{validate_coordinate, GeoError};
use crate::search::{ImageFetcher, PhotoSearch, SearchError};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    InvalidCoordinate(#[from] GeoError),
    #[error("Photo search failed: {0}")]
    Search(#[from] SearchError),
    #[error("{failed} of {attempted} photo downloads failed")]
    ImageDownloadsFailed { failed: usize, attempted: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RepositoryError {
    pub fn user_message(&self) -> &'static str {
        match self {
            RepositoryError::InvalidCoordinate(_) => "That location is not a valid coordinate.",
            RepositoryError::Search(e) => e.user_message(),
            RepositoryError::ImageDownloadsFailed { .. } => {
                "One or more photos failed to download."
            }
            RepositoryError::Store(StoreError::PinNotFound(_)) => "This location no longer exists.",
            RepositoryError::Store(StoreError::PhotoNotFound(_)) => "This photo no longer exists.",
            RepositoryError::Store(StoreError::Unavailable(_)) => "Local storage is unavailable.",
            RepositoryError::Store(StoreError::WriteFailed(_)) => {
                "Your changes could not be saved."
            }
        }
    }

    /// Store failures the caller must treat as aborting the current operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RepositoryError::Store(StoreError::Unavailable(_) | StoreError::WriteFailed(_))
        )
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Clone, Copy)]
pub struct RepositoryOptions {
    pub photo_order: PhotoOrder,
    pub max_concurrent_downloads: usize,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            photo_order: PhotoOrder::UrlDescending,
            max_concurrent_downloads: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageLoadSummary {
    pub downloaded: usize,
    /// Photos that already had data or no longer exist.
    pub skipped: usize,
}

enum DownloadOutcome {
    Stored,
    Vanished,
    Failed,
}

/// Pins, their paged photo collections and image payloads.
///
/// Page operations on one pin (`load_new_photos`, `refresh_photos`) are not
/// serialized internally; callers must not overlap them and can use
/// [`PhotoRepository::is_busy`] or [`PhotoRepository::subscribe`] to gate actions.
#[derive(Clone)]
pub struct PhotoRepository {
    store: Store,
    search: Arc<dyn PhotoSearch>,
    images: Arc<dyn ImageFetcher>,
    activity: DownloadActivity,
    options: RepositoryOptions,
}

impl PhotoRepository {
    pub fn new(
        store: Store,
        search: Arc<dyn PhotoSearch>,
        images: Arc<dyn ImageFetcher>,
        options: RepositoryOptions,
    ) -> Self {
        Self {
            store,
            search,
            images,
            activity: DownloadActivity::new(),
            options,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.activity.is_busy()
    }

    /// Persists a new pin straight away, before any photo is fetched for it.
    pub async fn create_pin(&self, latitude: f64, longitude: f64) -> RepositoryResult<Pin> {
        validate_coordinate(latitude, longitude)?;
        let pin = self.store.insert_pin(latitude, longitude).await?;
        info!("Created pin {} at {},{}", pin.id, latitude, longitude);
        Ok(pin)
    }

    pub async fn list_pins(&self) -> RepositoryResult<Vec<Pin>> {
        Ok(self.store.list_pins().await?)
    }

    pub async fn pin(&self, pin_id: PinId) -> RepositoryResult<Pin> {
        Ok(self.store.pin(pin_id).await?)
    }

    pub async fn photos(&self, pin_id: PinId) -> RepositoryResult<Vec<Photo>> {
        Ok(self
            .store
            .photos_for_pin(pin_id, self.options.photo_order)
            .await?)
    }

    pub async fn image_data(&self, photo_id: PhotoId) -> RepositoryResult<Option<Vec<u8>>> {
        Ok(self.store.image_data(photo_id).await?)
    }

    pub async fn photos_view(&self, pin_id: PinId) -> RepositoryResult<PhotosView> {
        Ok(self
            .store
            .photos_view(pin_id, self.options.photo_order)
            .await?)
    }

    /// Fetches the next page of photos for the pin and stores them.
    ///
    /// The pin's paging cursor only moves when the search succeeds.
    pub async fn load_new_photos(&self, pin_id: PinId) -> RepositoryResult<Vec<Photo>> {
        let pin = self.store.pin(pin_id).await?;
        let page = pin.next_page();
        let _guard = self.activity.begin();

        self.activity
            .emit(ActivityEvent::SearchStarted { pin_id, page });
        debug!(
            "Loading page {} for pin {} (last page {}, total {})",
            page, pin_id, pin.photos_page_num, pin.photos_total_pages
        );

        let result = match self.search.search(pin.latitude, pin.longitude, page).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Photo search for pin {} failed: {}", pin_id, e);
                self.activity.emit(ActivityEvent::SearchFailed {
                    pin_id,
                    message: e.user_message().to_string(),
                });
                return Err(e.into());
            }
        };

        let total_pages = result.total_pages.max(0);
        // Keep the cursor inside the reported range in case the remote index shrank
        let page_num = page.min(total_pages.max(1));

        let mut batch = self.store.begin().await?;
        batch.update_pin_paging(pin_id, page_num, total_pages).await?;
        let mut photos = Vec::with_capacity(result.photo_urls.len());
        for url in &result.photo_urls {
            photos.push(batch.insert_photo(pin_id, url).await?);
        }
        batch.save().await?;

        info!(
            "Stored {} photos for pin {} (page {} of {})",
            photos.len(),
            pin_id,
            page_num,
            total_pages
        );
        self.activity.emit(ActivityEvent::SearchFinished {
            pin_id,
            photos: photos.len(),
        });
        Ok(photos)
    }

    /// Discards the pin's current photos, then loads the next page.
    ///
    /// The discarded photos are not restored if the load fails.
    pub async fn refresh_photos(&self, pin_id: PinId) -> RepositoryResult<Vec<Photo>> {
        let mut batch = self.store.begin().await?;
        let removed = batch.delete_photos_for_pin(pin_id).await?;
        batch.save().await?;
        debug!("Discarded {} photos of pin {} before refresh", removed, pin_id);

        self.load_new_photos(pin_id).await
    }

    /// Downloads image data for every listed photo that does not have it yet.
    ///
    /// Each payload is stored as soon as it arrives. Failed downloads do not stop
    /// the batch; they are reported together once all downloads finished.
    pub async fn load_images(&self, photo_ids: &[PhotoId]) -> RepositoryResult<ImageLoadSummary> {
        let _guard = self.activity.begin();
        let mut summary = ImageLoadSummary::default();

        let mut pending = Vec::new();
        for &photo_id in photo_ids {
            match self.store.photo_summary(photo_id).await? {
                Some(photo) if photo.has_image() => summary.skipped += 1,
                Some(photo) => pending.push(photo),
                None => {
                    debug!("Photo {} no longer exists, skipping download", photo_id);
                    summary.skipped += 1;
                }
            }
        }

        if pending.is_empty() {
            return Ok(summary);
        }

        let attempted = pending.len();
        self.activity.emit(ActivityEvent::DownloadsStarted { photos: attempted });

        let permits = self.options.max_concurrent_downloads.max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();
        for photo in pending {
            let semaphore = Arc::clone(&semaphore);
            let images = Arc::clone(&self.images);
            let store = self.store.clone();
            let activity = self.activity.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                download_one(images.as_ref(), &store, &activity, photo).await
            });
        }

        let mut failed = 0;
        let mut fatal: Option<StoreError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(DownloadOutcome::Stored)) => summary.downloaded += 1,
                Ok(Ok(DownloadOutcome::Vanished)) => summary.skipped += 1,
                Ok(Ok(DownloadOutcome::Failed)) => failed += 1,
                Ok(Err(e)) => {
                    if fatal.is_none() {
                        error!("Aborting image batch: {}", e);
                        tasks.abort_all();
                        fatal = Some(e);
                    }
                }
                Err(join_error) if join_error.is_cancelled() => {}
                Err(join_error) => {
                    error!("Image download task panicked: {}", join_error);
                    failed += 1;
                }
            }
        }

        self.activity.emit(ActivityEvent::DownloadsFinished {
            downloaded: summary.downloaded,
            failed,
        });

        if let Some(e) = fatal {
            return Err(e.into());
        }
        if failed > 0 {
            warn!("{} of {} photo downloads failed", failed, attempted);
            return Err(RepositoryError::ImageDownloadsFailed { failed, attempted });
        }

        info!("Downloaded {} photos", summary.downloaded);
        Ok(summary)
    }

    pub async fn delete_photo(&self, photo_id: PhotoId) -> RepositoryResult<bool> {
        Ok(self.store.delete_photo(photo_id).await?)
    }

    pub async fn delete_photos(&self, photo_ids: &[PhotoId]) -> RepositoryResult<u64> {
        let mut batch = self.store.begin().await?;
        let mut deleted = 0;
        for &photo_id in photo_ids {
            if batch.delete_photo(photo_id).await? {
                deleted += 1;
            }
        }
        batch.save().await?;
        Ok(deleted)
    }

    /// Deletes the pin together with all of its photos.
    pub async fn delete_pin(&self, pin_id: PinId) -> RepositoryResult<bool> {
        let deleted = self.store.delete_pin(pin_id).await?;
        if deleted {
            info!("Deleted pin {}", pin_id);
        }
        Ok(deleted)
    }
}

async fn download_one(
    images: &dyn ImageFetcher,
    store: &Store,
    activity: &DownloadActivity,
    photo: PhotoSummary,
) -> Result<DownloadOutcome, StoreError> {
    let bytes = match images.fetch(&photo.url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to download photo {} from {}: {}", photo.id, photo.url, e);
            return Ok(DownloadOutcome::Failed);
        }
    };

    if store.set_image_data_if_absent(photo.id, &bytes).await? {
        activity.emit(ActivityEvent::ImageStored {
            photo_id: photo.id,
            pin_id: photo.pin_id,
        });
        Ok(DownloadOutcome::Stored)
    } else {
        debug!(
            "Photo {} was removed or filled while downloading, dropping payload",
            photo.id
        );
        Ok(DownloadOutcome::Vanished)
    }
}
