pub mod activity;
pub mod config;
pub mod db;
pub mod geo;
pub mod repository;
pub mod search;

pub use activity::{ActivityEvent, DownloadActivity};
pub use db::{
    Photo, PhotoId, PhotoOrder, PhotoSummary, PhotosView, Pin, PinId, Store, StoreError, ViewDiff,
};
pub use repository::{ImageLoadSummary, PhotoRepository, RepositoryError, RepositoryOptions};
pub use search::{
    FlickrClient, HttpImageFetcher, ImageFetcher, PhotoSearch, SearchError, SearchPage,
};
