pub mod connection;
pub mod crud;
pub mod live_view;
pub mod models;
pub mod schema;

pub use connection::*;
pub use crud::{Store, StoreBatch};
pub use live_view::{PhotosView, ViewDiff};
pub use models::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("Store write failed: {0}")]
    WriteFailed(#[source] sqlx::Error),
    #[error("Pin {0} not found")]
    PinNotFound(PinId),
    #[error("Photo {0} not found")]
    PhotoNotFound(PhotoId),
}

pub type StoreResult<T> = Result<T, StoreError>;
