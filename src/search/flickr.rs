use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;

use super::{http_agent, transport_kind, PhotoSearch, SearchError, SearchPage, TransportKind};
use crate::config::SearchConfig;
use crate::geo::{bounding_box, BoundingBox, HalfExtent};

const SEARCH_METHOD: &str = "flickr.photos.search";
const SMALL_URL_EXTRA: &str = "url_n";
const OK_STATUS: &str = "ok";
/// Flickr's error code for an unknown or malformed API key.
const INVALID_API_KEY_CODE: i64 = 100;

/// Flickr `flickr.photos.search` client scoped to a bounding box around a point.
#[derive(Clone)]
pub struct FlickrClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    photos_per_page: u32,
    extent: HalfExtent,
}

impl FlickrClient {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            agent: http_agent(config.http_timeout_secs),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            photos_per_page: config.photos_per_page,
            extent: HalfExtent {
                width: config.bbox_half_width,
                height: config.bbox_half_height,
            },
        }
    }

    pub fn search_params(&self, bbox: &BoundingBox, page: i64) -> Vec<(&'static str, String)> {
        vec![
            ("method", SEARCH_METHOD.to_string()),
            ("api_key", self.api_key.clone()),
            ("bbox", bbox.to_string()),
            ("safe_search", "1".to_string()),
            ("extras", SMALL_URL_EXTRA.to_string()),
            ("format", "json".to_string()),
            ("nojsoncallback", "1".to_string()),
            ("per_page", self.photos_per_page.to_string()),
            ("page", page.to_string()),
        ]
    }

    fn fetch_body(
        agent: &ureq::Agent,
        endpoint: &str,
        params: &[(&'static str, String)],
    ) -> Result<String, SearchError> {
        let mut request = agent.get(endpoint);
        for (key, value) in params {
            request = request.query(*key, value);
        }

        let mut response = request.call().map_err(classify_error)?;
        response.body_mut().read_to_string().map_err(classify_error)
    }
}

#[async_trait]
impl PhotoSearch for FlickrClient {
    async fn search(
        &self,
        latitude: f64,
        longitude: f64,
        page: i64,
    ) -> Result<SearchPage, SearchError> {
        let bbox = bounding_box(latitude, longitude, self.extent)?;
        let params = self.search_params(&bbox, page);
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();

        debug!("Searching photos in bbox {} (page {})", bbox, page);

        let body = tokio::task::spawn_blocking(move || Self::fetch_body(&agent, &endpoint, &params))
            .await
            .map_err(|e| SearchError::transport(TransportKind::Other, e.to_string()))??;

        parse_search_response(&body)
    }
}

fn classify_error(error: ureq::Error) -> SearchError {
    match error {
        ureq::Error::StatusCode(code @ (401 | 403)) => {
            SearchError::Auth(format!("request rejected with status {}", code))
        }
        ureq::Error::StatusCode(code) => {
            SearchError::ServerStatus(format!("status code returned: {}", code))
        }
        ureq::Error::BodyExceedsLimit(limit) => {
            SearchError::Malformed(format!("response larger than {} bytes", limit))
        }
        other => {
            let kind = transport_kind(&other);
            warn!("Photo search transport failure ({:?}): {}", kind, other);
            SearchError::transport(kind, other.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    stat: Option<String>,
    code: Option<i64>,
    message: Option<String>,
    photos: Option<RawPhotos>,
}

#[derive(Debug, Deserialize)]
struct RawPhotos {
    pages: Option<serde_json::Value>,
    photo: Option<Vec<RawPhoto>>,
}

#[derive(Debug, Deserialize)]
struct RawPhoto {
    url_n: Option<String>,
}

/// Parses a `format=json&nojsoncallback=1` search response body.
pub fn parse_search_response(body: &str) -> Result<SearchPage, SearchError> {
    let raw: RawResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::Malformed(format!("could not parse JSON: {}", e)))?;

    if raw.stat.as_deref() != Some(OK_STATUS) {
        let message = raw.message.unwrap_or_else(|| "no message".to_string());
        return match raw.code {
            Some(INVALID_API_KEY_CODE) => Err(SearchError::Auth(message)),
            code => Err(SearchError::ServerStatus(format!(
                "stat {:?}, code {:?}: {}",
                raw.stat, code, message
            ))),
        };
    }

    let photos = raw
        .photos
        .ok_or_else(|| SearchError::Malformed("missing key 'photos'".to_string()))?;

    let total_pages = photos
        .pages
        .as_ref()
        .and_then(|pages| {
            pages
                .as_i64()
                .or_else(|| pages.as_str().and_then(|s| s.parse().ok()))
        })
        .ok_or_else(|| SearchError::Malformed("missing key 'pages'".to_string()))?;

    let photo_urls = photos
        .photo
        .ok_or_else(|| SearchError::Malformed("missing key 'photo'".to_string()))?
        .into_iter()
        .map(|photo| {
            photo
                .url_n
                .ok_or_else(|| SearchError::Malformed(format!("missing key '{}'", SMALL_URL_EXTRA)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SearchPage {
        photo_urls,
        total_pages,
    })
}
