pub mod flickr;
pub mod images;

use std::io;
use std::time::Duration;

use async_trait::async_trait;

use crate::geo::GeoError;

pub use flickr::FlickrClient;
pub use images::{HttpImageFetcher, ImageFetchError, ImageFetcher};

/// One page of search results for a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    /// Image URLs in the order the API returned them.
    pub photo_urls: Vec<String>,
    /// Total pages the API reports for the query right now. Advisory only.
    pub total_pages: i64,
}

#[async_trait]
pub trait PhotoSearch: Send + Sync {
    async fn search(
        &self,
        latitude: f64,
        longitude: f64,
        page: i64,
    ) -> Result<SearchPage, SearchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    TimedOut,
    Offline,
    ConnectionLost,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    InvalidCoordinate(#[from] GeoError),
    #[error("Transport error ({kind:?}): {detail}")]
    Transport { kind: TransportKind, detail: String },
    #[error("Credentials rejected: {0}")]
    Auth(String),
    #[error("Server status error: {0}")]
    ServerStatus(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl SearchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            SearchError::InvalidCoordinate(_) => "That location is not a valid coordinate.",
            SearchError::Transport { kind, .. } => match kind {
                TransportKind::TimedOut => "Couldn't reach server (timed out)",
                TransportKind::Offline => "The Internet connection appears to be offline",
                TransportKind::ConnectionLost => "The network connection was lost",
                TransportKind::Other => "Please try again.",
            },
            SearchError::Auth(_) => "API key invalid",
            SearchError::ServerStatus(_) => {
                "The photo service returned an error. Please try again."
            }
            SearchError::Malformed(_) => "The photo service sent an unexpected response.",
        }
    }

    pub fn transport(kind: TransportKind, detail: impl Into<String>) -> Self {
        SearchError::Transport {
            kind,
            detail: detail.into(),
        }
    }
}

pub(crate) fn http_agent(timeout_secs: u64) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(timeout_secs)))
        .build()
        .into()
}

/// Maps a transport failure onto the connectivity class shown to the user.
pub(crate) fn transport_kind(error: &ureq::Error) -> TransportKind {
    match error {
        ureq::Error::Timeout(_) => TransportKind::TimedOut,
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => TransportKind::Offline,
        ureq::Error::Io(io_error) => match io_error.kind() {
            io::ErrorKind::TimedOut => TransportKind::TimedOut,
            io::ErrorKind::NotConnected | io::ErrorKind::ConnectionRefused => {
                TransportKind::Offline
            }
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportKind::ConnectionLost,
            _ => TransportKind::Other,
        },
        _ => TransportKind::Other,
    }
}
