use std::env;

use crate::db::PhotoOrder;

pub const DEFAULT_FLICKR_ENDPOINT: &str = "https://api.flickr.com/services/rest";

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: String,
    pub endpoint: String,
    pub photos_per_page: u32,
    /// 0.01 degrees is roughly 1km
    pub bbox_half_width: f64,
    pub bbox_half_height: f64,
    pub http_timeout_secs: u64,
    pub max_image_bytes: u64,
}

impl SearchConfig {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_FLICKR_ENDPOINT.to_string(),
            photos_per_page: 21,
            bbox_half_width: 0.01,
            bbox_half_height: 0.01,
            http_timeout_secs: 15,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub max_connections: u32,
    pub search: SearchConfig,
    pub max_concurrent_downloads: usize,
    pub photo_order: PhotoOrder,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let api_key = env::var("TOURIST_PIX_FLICKR_API_KEY")
            .map_err(|_| "TOURIST_PIX_FLICKR_API_KEY must be set")?;

        Ok(Config {
            db_path: env::var("TOURIST_PIX_DB_PATH")
                .unwrap_or_else(|_| "./data/database/tourist-pix.db".to_string()),
            max_connections: env::var("TOURIST_PIX_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            search: SearchConfig {
                api_key,
                endpoint: env::var("TOURIST_PIX_FLICKR_ENDPOINT")
                    .unwrap_or_else(|_| DEFAULT_FLICKR_ENDPOINT.to_string()),
                photos_per_page: env::var("TOURIST_PIX_PHOTOS_PER_PAGE")
                    .unwrap_or_else(|_| "21".to_string())
                    .parse()?,
                bbox_half_width: env::var("TOURIST_PIX_BBOX_HALF_WIDTH")
                    .unwrap_or_else(|_| "0.01".to_string())
                    .parse()?,
                bbox_half_height: env::var("TOURIST_PIX_BBOX_HALF_HEIGHT")
                    .unwrap_or_else(|_| "0.01".to_string())
                    .parse()?,
                http_timeout_secs: env::var("TOURIST_PIX_HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()?,
                max_image_bytes: env::var("TOURIST_PIX_MAX_IMAGE_BYTES")
                    .unwrap_or_else(|_| "10485760".to_string())
                    .parse()?,
            },
            max_concurrent_downloads: match env::var("TOURIST_PIX_MAX_CONCURRENT_DOWNLOADS") {
                Ok(value) => value.parse()?,
                Err(_) => num_cpus::get().max(1),
            },
            photo_order: env::var("TOURIST_PIX_PHOTO_ORDER")
                .unwrap_or_else(|_| "url_desc".to_string())
                .parse::<PhotoOrder>()?,
        })
    }
}
