use async_trait::async_trait;
use log::debug;

use super::{http_agent, transport_kind, TransportKind};
use crate::config::SearchConfig;

#[derive(Debug, thiserror::Error)]
pub enum ImageFetchError {
    #[error("Transport error ({kind:?}): {detail}")]
    Transport { kind: TransportKind, detail: String },
    #[error("Image request returned status {0}")]
    Status(u16),
    #[error("Image payload truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },
    #[error("Image payload exceeds {0} bytes")]
    TooLarge(u64),
    #[error("Payload is not a recognised image format")]
    NotAnImage,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Downloads the complete payload at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageFetchError>;
}

#[derive(Clone)]
pub struct HttpImageFetcher {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            agent: http_agent(config.http_timeout_secs),
            max_bytes: config.max_image_bytes,
        }
    }

    fn download(
        agent: &ureq::Agent,
        url: &str,
        max_bytes: u64,
    ) -> Result<Vec<u8>, ImageFetchError> {
        let mut response = agent.get(url).call().map_err(classify_error)?;

        let declared_length = response
            .headers()
            .get("content-length")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        let bytes = response
            .body_mut()
            .with_config()
            .limit(max_bytes)
            .read_to_vec()
            .map_err(classify_error)?;

        validate_payload(&bytes, declared_length)?;
        Ok(bytes)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageFetchError> {
        let agent = self.agent.clone();
        let owned_url = url.to_string();
        let max_bytes = self.max_bytes;

        let download = move || Self::download(&agent, &owned_url, max_bytes);
        let bytes = tokio::task::spawn_blocking(download)
            .await
            .map_err(|e| ImageFetchError::Transport {
                kind: TransportKind::Other,
                detail: e.to_string(),
            })??;

        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

fn classify_error(error: ureq::Error) -> ImageFetchError {
    match error {
        ureq::Error::StatusCode(code) => ImageFetchError::Status(code),
        ureq::Error::BodyExceedsLimit(limit) => ImageFetchError::TooLarge(limit),
        other => ImageFetchError::Transport {
            kind: transport_kind(&other),
            detail: other.to_string(),
        },
    }
}

/// Rejects payloads that are short of the declared length or are not an image.
pub fn validate_payload(bytes: &[u8], declared_length: Option<u64>) -> Result<(), ImageFetchError> {
    let received = bytes.len() as u64;
    if let Some(expected) = declared_length {
        if received < expected {
            return Err(ImageFetchError::Truncated { expected, received });
        }
    }

    image::guess_format(bytes).map_err(|_| ImageFetchError::NotAnImage)?;
    Ok(())
}
