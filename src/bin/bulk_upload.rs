//! Pushes a batch of files to one listing through the chunked upload API.
//!
//! ```text
//! UPLOAD_API_URL=http://localhost:8000/api/v1 UPLOAD_API_TOKEN=... \
//!     bulk-upload <property_id> <main_image> [image ...]
//! ```
//!
//! `UPLOAD_CONCURRENCY` (default 2) and `UPLOAD_DELAY_MS` (default 300)
//! tune how hard the server is pushed.

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use listing_backend::{
    dtos::MediaCollection,
    uploads::{UploadClient, UploadJob, UploadQueue},
};

const USAGE: &str = "usage: bulk-upload <property_id> <main_image> [image ...]";

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// First file becomes the main image, the rest go to the gallery.
fn build_queue(property_id: i64, files: &[String], concurrency: usize) -> UploadQueue {
    let mut queue = UploadQueue::new(concurrency);
    for (i, file) in files.iter().enumerate() {
        queue.push(UploadJob {
            path: PathBuf::from(file),
            property_id,
            collection: if i == 0 {
                MediaCollection::MainImage
            } else {
                MediaCollection::Images
            },
        });
    }
    queue
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((property_id, files)) = args.split_first() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };
    let Ok(property_id) = property_id.parse::<i64>() else {
        eprintln!("property_id must be a number\n{}", USAGE);
        return ExitCode::from(2);
    };
    if files.is_empty() {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    let (Ok(base_url), Ok(token)) = (
        std::env::var("UPLOAD_API_URL"),
        std::env::var("UPLOAD_API_TOKEN"),
    ) else {
        eprintln!("UPLOAD_API_URL and UPLOAD_API_TOKEN must be set");
        return ExitCode::from(2);
    };

    let client = UploadClient::new(reqwest::Client::new(), base_url, token)
        .with_delay(Duration::from_millis(env_or("UPLOAD_DELAY_MS", 300)));
    let queue = build_queue(property_id, files, env_or("UPLOAD_CONCURRENCY", 2));

    tracing::info!(property_id, files = queue.len(), "Starting bulk upload");
    let outcomes = queue.run(Arc::new(client)).await;

    let mut failed = 0;
    for (job, result) in &outcomes {
        match result {
            Ok(media) => tracing::info!(path = ?job.path, media_id = media.id, url = %media.url, "Uploaded"),
            Err(e) => {
                failed += 1;
                tracing::error!(path = ?job.path, "Upload failed: {}", e);
            }
        }
    }

    tracing::info!(total = outcomes.len(), failed, "Bulk upload finished");
    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
