use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{error, info};

use tourist_pix::config::Config;
use tourist_pix::{
    FlickrClient, HttpImageFetcher, PhotoRepository, RepositoryError, RepositoryOptions, Store,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let (latitude, longitude) = parse_coordinates()?;
    let config = Config::from_env().map_err(|e| anyhow!(e.to_string()))?;

    info!("Database: {}", config.db_path);
    info!("Search endpoint: {}", config.search.endpoint);

    let repository = initialize_repository(&config).await?;

    let pin = repository
        .create_pin(latitude, longitude)
        .await
        .context("Failed to create pin")?;
    info!("Pins stored: {}", repository.list_pins().await?.len());

    let photos = repository
        .load_new_photos(pin.id)
        .await
        .map_err(|e| report(&e, "Photo search failed"))?;
    println!("Found {} photos near {},{}", photos.len(), latitude, longitude);

    let mut view = repository.photos_view(pin.id).await?;
    let ids = view.missing_images();
    let total = view.len();

    let mut downloader = {
        let repository = repository.clone();
        tokio::spawn(async move { repository.load_images(&ids).await })
    };

    loop {
        tokio::select! {
            diff = view.changed() => {
                let diff = diff?;
                if !diff.updated.is_empty() {
                    let ready = total - view.missing_images().len();
                    println!("{} of {} photos downloaded", ready, total);
                }
            }
            joined = &mut downloader => {
                match joined.context("Download task failed")? {
                    Ok(summary) => println!(
                        "Downloaded {} photos ({} skipped)",
                        summary.downloaded, summary.skipped
                    ),
                    Err(e) => {
                        // Partial failures leave the successful downloads in place
                        if e.is_fatal() {
                            return Err(report(&e, "Image download aborted"));
                        }
                        println!("{}", e.user_message());
                    }
                }
                break;
            }
        }
    }

    Ok(())
}

fn parse_coordinates() -> Result<(f64, f64)> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [lat, lon] => Ok((
            lat.parse().context("Latitude must be a number")?,
            lon.parse().context("Longitude must be a number")?,
        )),
        _ => Err(anyhow!("Usage: tourist-pix <latitude> <longitude>")),
    }
}

async fn initialize_repository(config: &Config) -> Result<PhotoRepository> {
    let store = Store::connect(&config.db_path, config.max_connections)
        .await
        .context("Failed to open database")?;
    info!("Database initialized successfully");

    let search = Arc::new(FlickrClient::new(&config.search));
    let images = Arc::new(HttpImageFetcher::new(&config.search));

    Ok(PhotoRepository::new(
        store,
        search,
        images,
        RepositoryOptions {
            photo_order: config.photo_order,
            max_concurrent_downloads: config.max_concurrent_downloads,
        },
    ))
}

fn report(error: &RepositoryError, context: &str) -> anyhow::Error {
    error!("{}: {}", context, error);
    anyhow!("{}: {}", context, error.user_message())
}
