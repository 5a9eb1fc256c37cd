use std::collections::HashMap;

use log::debug;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;

use super::crud::Store;
use super::models::{ChangeSet, PhotoId, PhotoOrder, PhotoSummary, PinId};
use super::StoreResult;

/// Positional changes between two snapshots of a photo view.
///
/// `deleted` indexes refer to the previous snapshot; `inserted` and `updated`
/// to the new one; `moved` pairs are `(old, new)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewDiff {
    pub inserted: Vec<usize>,
    pub deleted: Vec<usize>,
    pub updated: Vec<usize>,
    pub moved: Vec<(usize, usize)>,
}

impl ViewDiff {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.deleted.is_empty()
            && self.updated.is_empty()
            && self.moved.is_empty()
    }

    pub fn between(old: &[PhotoSummary], new: &[PhotoSummary]) -> Self {
        let old_pos: HashMap<PhotoId, usize> =
            old.iter().enumerate().map(|(i, p)| (p.id, i)).collect();
        let new_pos: HashMap<PhotoId, usize> =
            new.iter().enumerate().map(|(i, p)| (p.id, i)).collect();

        let deleted = old
            .iter()
            .enumerate()
            .filter(|(_, p)| !new_pos.contains_key(&p.id))
            .map(|(i, _)| i)
            .collect();
        let inserted = new
            .iter()
            .enumerate()
            .filter(|(_, p)| !old_pos.contains_key(&p.id))
            .map(|(i, _)| i)
            .collect();

        // Survivors in each order; a survivor whose rank changed has moved.
        let old_survivors: Vec<PhotoId> = old
            .iter()
            .filter(|p| new_pos.contains_key(&p.id))
            .map(|p| p.id)
            .collect();
        let new_survivors: Vec<PhotoId> = new
            .iter()
            .filter(|p| old_pos.contains_key(&p.id))
            .map(|p| p.id)
            .collect();

        let moved = new_survivors
            .iter()
            .zip(old_survivors.iter())
            .filter(|(new_id, old_id)| new_id != old_id)
            .map(|(id, _)| (old_pos[id], new_pos[id]))
            .collect();

        let updated = new
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                old_pos.get(&p.id).is_some_and(|&i| {
                    old[i].image_stored != p.image_stored || old[i].url != p.url
                })
            })
            .map(|(i, _)| i)
            .collect();

        ViewDiff {
            inserted,
            deleted,
            updated,
            moved,
        }
    }
}

/// Ordered photos of one pin, kept current against committed store changes.
///
/// Rows are held without their payloads; [`PhotosView::image_data`] reads one.
pub struct PhotosView {
    store: Store,
    pin_id: PinId,
    order: PhotoOrder,
    photos: Vec<PhotoSummary>,
    changes: Receiver<ChangeSet>,
}

impl PhotosView {
    pub(crate) async fn open(
        store: Store,
        pin_id: PinId,
        order: PhotoOrder,
    ) -> StoreResult<Self> {
        // Subscribe before the first read so no commit slips between the two
        let changes = store.subscribe();
        let photos = store.photo_summaries_for_pin(pin_id, order).await?;

        Ok(Self {
            store,
            pin_id,
            order,
            photos,
            changes,
        })
    }

    pub fn photos(&self) -> &[PhotoSummary] {
        &self.photos
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn missing_images(&self) -> Vec<PhotoId> {
        self.photos
            .iter()
            .filter(|p| !p.has_image())
            .map(|p| p.id)
            .collect()
    }

    /// Payload of the photo at `index`, if it has been downloaded.
    pub async fn image_data(&self, index: usize) -> StoreResult<Option<Vec<u8>>> {
        match self.photos.get(index) {
            Some(photo) if photo.image_stored => self.store.image_data(photo.id).await,
            _ => Ok(None),
        }
    }

    /// Re-reads the view and returns what changed since the last snapshot.
    pub async fn refresh(&mut self) -> StoreResult<ViewDiff> {
        let photos = self
            .store
            .photo_summaries_for_pin(self.pin_id, self.order)
            .await?;
        let diff = ViewDiff::between(&self.photos, &photos);
        self.photos = photos;
        Ok(diff)
    }

    /// Waits for the next saved batch touching this pin and returns its diff.
    pub async fn changed(&mut self) -> StoreResult<ViewDiff> {
        loop {
            match self.changes.recv().await {
                Ok(set) if set.affects_photos_of(self.pin_id) => return self.refresh().await,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        "Photo view for pin {} lagged by {} change sets, refreshing",
                        self.pin_id, skipped
                    );
                    return self.refresh().await;
                }
                Err(RecvError::Closed) => return self.refresh().await,
            }
        }
    }

    /// Applies every change already announced, without waiting.
    ///
    /// Returns one accumulated diff, or `None` when nothing relevant was pending.
    pub async fn poll_changes(&mut self) -> StoreResult<Option<ViewDiff>> {
        let mut relevant = false;
        loop {
            match self.changes.try_recv() {
                Ok(set) => relevant |= set.affects_photos_of(self.pin_id),
                Err(TryRecvError::Lagged(_)) => relevant = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if !relevant {
            return Ok(None);
        }
        let diff = self.refresh().await?;
        Ok(Some(diff))
    }
}
