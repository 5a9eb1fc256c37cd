use std::sync::Arc;

use chrono::Utc;
use log::debug;
use sqlx::{Sqlite, Transaction};
use tokio::sync::broadcast;

use super::connection::{create_db_pool, create_in_memory_pool, DbPool};
use super::live_view::PhotosView;
use super::models::{
    ChangeKind, ChangeSet, Entity, Photo, PhotoId, PhotoOrder, PhotoSummary, Pin, PinId,
    StoreChange,
};
use super::{StoreError, StoreResult};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Durable Pin/Photo storage that broadcasts one [`ChangeSet`] per saved batch.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
    changes: broadcast::Sender<ChangeSet>,
}

impl Store {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { pool, changes }
    }

    pub async fn connect(database_path: &str, max_connections: u32) -> StoreResult<Self> {
        Ok(Self::new(create_db_pool(database_path, max_connections).await?))
    }

    pub async fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(create_in_memory_pool().await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes.subscribe()
    }

    /// Opens a batch; nothing it does is visible until [`StoreBatch::save`].
    pub async fn begin(&self) -> StoreResult<StoreBatch> {
        let tx = self.pool.begin().await.map_err(StoreError::Unavailable)?;
        Ok(StoreBatch {
            tx,
            changes: Vec::new(),
            sender: self.changes.clone(),
        })
    }

    pub async fn list_pins(&self) -> StoreResult<Vec<Pin>> {
        sqlx::query_as::<_, Pin>("SELECT * FROM pins ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Unavailable)
    }

    pub async fn pin(&self, pin_id: PinId) -> StoreResult<Pin> {
        sqlx::query_as::<_, Pin>("SELECT * FROM pins WHERE id = ?")
            .bind(pin_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?
            .ok_or(StoreError::PinNotFound(pin_id))
    }

    pub async fn photo(&self, photo_id: PhotoId) -> StoreResult<Option<Photo>> {
        sqlx::query_as::<_, Photo>("SELECT * FROM photos WHERE id = ?")
            .bind(photo_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)
    }

    pub async fn photos_for_pin(
        &self,
        pin_id: PinId,
        order: PhotoOrder,
    ) -> StoreResult<Vec<Photo>> {
        let sql = format!(
            "SELECT * FROM photos WHERE pin_id = ? {}",
            order.order_by_clause()
        );
        sqlx::query_as::<_, Photo>(&sql)
            .bind(pin_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Unavailable)
    }

    /// Like [`Store::photo`] but leaves the image payload in the database.
    pub async fn photo_summary(&self, photo_id: PhotoId) -> StoreResult<Option<PhotoSummary>> {
        let sql = format!("SELECT {} FROM photos WHERE id = ?", PhotoSummary::COLUMNS);
        sqlx::query_as::<_, PhotoSummary>(&sql)
            .bind(photo_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)
    }

    pub async fn photo_summaries_for_pin(
        &self,
        pin_id: PinId,
        order: PhotoOrder,
    ) -> StoreResult<Vec<PhotoSummary>> {
        let sql = format!(
            "SELECT {} FROM photos WHERE pin_id = ? {}",
            PhotoSummary::COLUMNS,
            order.order_by_clause()
        );
        sqlx::query_as::<_, PhotoSummary>(&sql)
            .bind(pin_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Unavailable)
    }

    /// Stored payload of one photo; `None` when the photo is gone or has none yet.
    pub async fn image_data(&self, photo_id: PhotoId) -> StoreResult<Option<Vec<u8>>> {
        let data = sqlx::query_scalar::<_, Option<Vec<u8>>>(
            "SELECT image_data FROM photos WHERE id = ?",
        )
        .bind(photo_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(data.flatten())
    }

    pub async fn count_photos_for_pin(&self, pin_id: PinId) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM photos WHERE pin_id = ?")
            .bind(pin_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Unavailable)
    }

    pub async fn photos_view(
        &self,
        pin_id: PinId,
        order: PhotoOrder,
    ) -> StoreResult<PhotosView> {
        PhotosView::open(self.clone(), pin_id, order).await
    }

    pub async fn insert_pin(&self, latitude: f64, longitude: f64) -> StoreResult<Pin> {
        let mut batch = self.begin().await?;
        let pin = batch.insert_pin(latitude, longitude).await?;
        batch.save().await?;
        Ok(pin)
    }

    pub async fn delete_pin(&self, pin_id: PinId) -> StoreResult<bool> {
        let mut batch = self.begin().await?;
        let deleted = batch.delete_pin(pin_id).await?;
        batch.save().await?;
        Ok(deleted)
    }

    pub async fn delete_photo(&self, photo_id: PhotoId) -> StoreResult<bool> {
        let mut batch = self.begin().await?;
        let deleted = batch.delete_photo(photo_id).await?;
        batch.save().await?;
        Ok(deleted)
    }

    pub async fn set_image_data_if_absent(
        &self,
        photo_id: PhotoId,
        image_data: &[u8],
    ) -> StoreResult<bool> {
        let mut batch = self.begin().await?;
        let written = batch.set_image_data_if_absent(photo_id, image_data).await?;
        batch.save().await?;
        Ok(written)
    }
}

/// Pending store mutations, committed and announced together by [`StoreBatch::save`].
pub struct StoreBatch {
    tx: Transaction<'static, Sqlite>,
    changes: Vec<StoreChange>,
    sender: broadcast::Sender<ChangeSet>,
}

impl StoreBatch {
    fn record(&mut self, entity: Entity, kind: ChangeKind, pin_id: PinId) {
        self.changes.push(StoreChange {
            entity,
            kind,
            pin_id,
        });
    }

    pub async fn insert_pin(&mut self, latitude: f64, longitude: f64) -> StoreResult<Pin> {
        let pin = sqlx::query_as::<_, Pin>(
            "INSERT INTO pins (latitude, longitude, photos_page_num, photos_total_pages, created_at)
             VALUES (?, ?, 0, 0, ?)
             RETURNING *",
        )
        .bind(latitude)
        .bind(longitude)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(StoreError::WriteFailed)?;

        self.record(Entity::Pin, ChangeKind::Inserted, pin.id);
        Ok(pin)
    }

    pub async fn update_pin_paging(
        &mut self,
        pin_id: PinId,
        page_num: i64,
        total_pages: i64,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE pins SET photos_page_num = ?, photos_total_pages = ? WHERE id = ?",
        )
        .bind(page_num)
        .bind(total_pages)
        .bind(pin_id)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::WriteFailed)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PinNotFound(pin_id));
        }

        self.record(Entity::Pin, ChangeKind::Updated, pin_id);
        Ok(())
    }

    /// Removes the pin; its photos go with it through the foreign-key cascade.
    pub async fn delete_pin(&mut self, pin_id: PinId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM pins WHERE id = ?")
            .bind(pin_id)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::WriteFailed)?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.record(Entity::Pin, ChangeKind::Deleted, pin_id);
        }
        Ok(deleted)
    }

    pub async fn insert_photo(&mut self, pin_id: PinId, url: &str) -> StoreResult<Photo> {
        let photo = sqlx::query_as::<_, Photo>(
            "INSERT INTO photos (pin_id, url, image_data, created_at)
             VALUES (?, ?, NULL, ?)
             RETURNING *",
        )
        .bind(pin_id)
        .bind(url)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            let missing_pin = e
                .as_database_error()
                .is_some_and(|db_error| db_error.is_foreign_key_violation());
            if missing_pin {
                StoreError::PinNotFound(pin_id)
            } else {
                StoreError::WriteFailed(e)
            }
        })?;

        self.record(Entity::Photo, ChangeKind::Inserted, pin_id);
        Ok(photo)
    }

    pub async fn delete_photo(&mut self, photo_id: PhotoId) -> StoreResult<bool> {
        let pin_id =
            sqlx::query_scalar::<_, i64>("DELETE FROM photos WHERE id = ? RETURNING pin_id")
                .bind(photo_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(StoreError::WriteFailed)?;

        match pin_id {
            Some(pin_id) => {
                self.record(Entity::Photo, ChangeKind::Deleted, pin_id);
                Ok(true)
            }
            None => {
                debug!("Photo {} already gone, nothing to delete", photo_id);
                Ok(false)
            }
        }
    }

    pub async fn delete_photos_for_pin(&mut self, pin_id: PinId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM photos WHERE pin_id = ?")
            .bind(pin_id)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::WriteFailed)?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            self.record(Entity::Photo, ChangeKind::Deleted, pin_id);
        }
        Ok(deleted)
    }

    /// Writes the payload only if the photo exists and has none yet.
    pub async fn set_image_data_if_absent(
        &mut self,
        photo_id: PhotoId,
        image_data: &[u8],
    ) -> StoreResult<bool> {
        let pin_id = sqlx::query_scalar::<_, i64>(
            "UPDATE photos SET image_data = ? WHERE id = ? AND image_data IS NULL RETURNING pin_id",
        )
        .bind(image_data)
        .bind(photo_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::WriteFailed)?;

        match pin_id {
            Some(pin_id) => {
                self.record(Entity::Photo, ChangeKind::Updated, pin_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Commits the batch, then announces its changes in a single notification.
    pub async fn save(self) -> StoreResult<()> {
        let StoreBatch {
            tx,
            changes,
            sender,
        } = self;

        tx.commit().await.map_err(StoreError::WriteFailed)?;

        if !changes.is_empty() {
            // No subscribers is fine
            let _ = sender.send(ChangeSet {
                changes: Arc::new(changes),
            });
        }
        Ok(())
    }
}
