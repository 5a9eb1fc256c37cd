use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

pub type PinId = i64;
pub type PhotoId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Pin {
    pub id: PinId,
    pub latitude: f64,
    pub longitude: f64,
    /// Last page fetched from the search API; 0 until the first fetch.
    pub photos_page_num: i64,
    /// Total pages the API reported on the last successful fetch.
    pub photos_total_pages: i64,
    pub created_at: DateTime<Utc>,
}

impl Pin {
    /// Page to request on the next "load more": advance while pages remain, else wrap to 1.
    pub fn next_page(&self) -> i64 {
        if self.photos_page_num < self.photos_total_pages {
            self.photos_page_num + 1
        } else {
            1
        }
    }

    pub fn has_fetched(&self) -> bool {
        self.photos_page_num > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Photo {
    pub id: PhotoId,
    pub pin_id: PinId,
    pub url: String,
    #[serde(skip_serializing)]
    pub image_data: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl Photo {
    pub fn has_image(&self) -> bool {
        self.image_data.is_some()
    }
}

/// A photo row without its payload; `image_stored` reports whether one exists.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PhotoSummary {
    pub id: PhotoId,
    pub pin_id: PinId,
    pub url: String,
    pub image_stored: bool,
    pub created_at: DateTime<Utc>,
}

impl PhotoSummary {
    pub(crate) const COLUMNS: &'static str =
        "id, pin_id, url, image_data IS NOT NULL AS image_stored, created_at";

    pub fn has_image(&self) -> bool {
        self.image_stored
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PhotoOrder {
    #[default]
    UrlDescending,
    Inserted,
}

impl PhotoOrder {
    pub fn order_by_clause(&self) -> &'static str {
        match self {
            PhotoOrder::UrlDescending => "ORDER BY url DESC, id ASC",
            PhotoOrder::Inserted => "ORDER BY id ASC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown photo order '{0}', expected 'url_desc' or 'inserted'")]
pub struct ParsePhotoOrderError(String);

impl FromStr for PhotoOrder {
    type Err = ParsePhotoOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url_desc" => Ok(PhotoOrder::UrlDescending),
            "inserted" => Ok(PhotoOrder::Inserted),
            other => Err(ParsePhotoOrderError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Pin,
    Photo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub entity: Entity,
    pub kind: ChangeKind,
    /// The pin itself for pin changes, the owning pin for photo changes.
    pub pin_id: PinId,
}

impl StoreChange {
    /// Whether the change can alter the photo list of `pin_id`.
    ///
    /// Paging updates and pin inserts leave the list alone; deleting the pin
    /// cascades to its photos.
    pub fn affects_photos_of(&self, pin_id: PinId) -> bool {
        self.pin_id == pin_id
            && match self.entity {
                Entity::Photo => true,
                Entity::Pin => self.kind == ChangeKind::Deleted,
            }
    }
}

/// All changes committed by one `save()`.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub changes: Arc<Vec<StoreChange>>,
}

impl ChangeSet {
    pub fn affects_photos_of(&self, pin_id: PinId) -> bool {
        self.changes
            .iter()
            .any(|change| change.affects_photos_of(pin_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(page_num: i64, total_pages: i64) -> Pin {
        Pin {
            id: 1,
            latitude: 40.0,
            longitude: -74.0,
            photos_page_num: page_num,
            photos_total_pages: total_pages,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_next_page_advances() {
        assert_eq!(pin(1, 3).next_page(), 2);
        assert_eq!(pin(2, 3).next_page(), 3);
    }

    #[test]
    fn test_next_page_wraps() {
        assert_eq!(pin(3, 3).next_page(), 1);
        // remote total shrank below the stored page
        assert_eq!(pin(5, 3).next_page(), 1);
    }

    #[test]
    fn test_next_page_first_fetch() {
        let fresh = pin(0, 0);
        assert!(!fresh.has_fetched());
        assert_eq!(fresh.next_page(), 1);
    }

    #[test]
    fn test_photo_order_parse() {
        assert_eq!("url_desc".parse::<PhotoOrder>(), Ok(PhotoOrder::UrlDescending));
        assert_eq!("inserted".parse::<PhotoOrder>(), Ok(PhotoOrder::Inserted));
        let err = "random".parse::<PhotoOrder>().unwrap_err();
        assert!(err.to_string().contains("random"));
    }

    #[test]
    fn test_change_affects_photos() {
        let change = |entity, kind, pin_id| StoreChange {
            entity,
            kind,
            pin_id,
        };

        assert!(change(Entity::Photo, ChangeKind::Inserted, 1).affects_photos_of(1));
        assert!(change(Entity::Photo, ChangeKind::Updated, 1).affects_photos_of(1));
        assert!(change(Entity::Pin, ChangeKind::Deleted, 1).affects_photos_of(1));
        assert!(!change(Entity::Pin, ChangeKind::Updated, 1).affects_photos_of(1));
        assert!(!change(Entity::Pin, ChangeKind::Inserted, 1).affects_photos_of(1));
        assert!(!change(Entity::Photo, ChangeKind::Inserted, 2).affects_photos_of(1));
    }
}
