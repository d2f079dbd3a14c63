//! HTTP client for the chunked upload API, used by the `bulk-upload` tool.

use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode, header::RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::total_chunks;
use crate::dtos::{
    ChunkAcceptedDto, InitUploadDto, MediaCollection, MediaDto, PropertyResponseDto,
    UploadSessionDto,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub size: u64,
    pub chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(size: u64, chunk_size: u64) -> Self {
        Self { size, chunk_size }
    }

    pub fn total(&self) -> u64 {
        total_chunks(self.size, self.chunk_size)
    }

    /// `(index, byte range)` of every chunk.
    pub fn chunks(&self) -> impl Iterator<Item = (u64, std::ops::Range<usize>)> + '_ {
        (0..self.total()).map(move |index| {
            let start = index * self.chunk_size;
            let end = (start + self.chunk_size).min(self.size);
            (index, start as usize..end as usize)
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (0-based). A usable
    /// `Retry-After` wins over the exponential backoff. Always capped.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<&str>, now: DateTime<Utc>) -> Duration {
        let wait = retry_after
            .and_then(|value| parse_retry_after(value, now))
            .unwrap_or_else(|| {
                self.base_delay
                    .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            });
        wait.min(self.max_delay)
    }
}

/// `Retry-After` is either delay-seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[derive(Debug)]
pub enum UploadError {
    Io(std::io::Error),
    Http(reqwest::Error),
    Status { status: StatusCode, body: String },
    RetriesExhausted(u32),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Io(e) => write!(f, "Reading file failed: {}", e),
            UploadError::Http(e) => write!(f, "Request failed: {}", e),
            UploadError::Status { status, body } => write!(f, "Server returned {}: {}", status, body),
            UploadError::RetriesExhausted(n) => write!(f, "Still rate limited after {} retries", n),
        }
    }
}

impl std::error::Error for UploadError {}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io(e)
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Http(e)
    }
}

/// Guesses the mime type from the file extension.
pub fn mime_for(path: &std::path::Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => return None,
    })
}

#[derive(Debug, Clone)]
pub struct UploadJob {
    pub path: PathBuf,
    pub property_id: i64,
    pub collection: MediaCollection,
}

pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    policy: RetryPolicy,
    delay: Duration,
}

impl UploadClient {
    /// `base_url` is the API root, e.g. `https://host/api/v1`.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            policy: RetryPolicy::default(),
            delay: Duration::from_millis(300),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pause between consecutive requests of one file.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sends the request, retrying on 429 until the policy runs out.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, UploadError> {
        let mut attempt = 0;
        loop {
            let response = build().bearer_auth(&self.token).send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            if attempt >= self.policy.max_retries {
                return Err(UploadError::RetriesExhausted(attempt));
            }
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok());
            let wait = self.policy.delay_for(attempt, retry_after, Utc::now());
            tracing::warn!(attempt, ?wait, "Rate limited, backing off");
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, UploadError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status { status, body });
        }
        Ok(response.json::<T>().await?)
    }

    /// Uploads one file: init, every chunk in order, complete.
    pub async fn upload(&self, job: &UploadJob) -> Result<MediaDto, UploadError> {
        let bytes = tokio::fs::read(&job.path).await?;
        let file_name = job
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let init = InitUploadDto {
            file_name,
            mime_type: mime_for(&job.path)
                .unwrap_or("application/octet-stream")
                .to_string(),
            size: bytes.len() as u64,
            property_id: job.property_id,
            collection: job.collection,
        };

        let session: UploadSessionDto = Self::json(
            self.send(|| self.http.post(format!("{}/uploads", self.base_url)).json(&init))
                .await?,
        )
        .await?;
        tracing::info!(upload_id = %session.upload_id, chunks = session.total_chunks, path = ?job.path, "Upload started");

        let plan = ChunkPlan::new(init.size, session.chunk_size);
        for (index, range) in plan.chunks() {
            tokio::time::sleep(self.delay).await;
            let url = format!(
                "{}/uploads/{}/chunks/{}",
                self.base_url, session.upload_id, index
            );
            let chunk = &bytes[range];
            let _: ChunkAcceptedDto =
                Self::json(self.send(|| self.http.put(&url).body(chunk.to_vec())).await?).await?;
        }

        tokio::time::sleep(self.delay).await;
        let url = format!("{}/uploads/{}/complete", self.base_url, session.upload_id);
        let done: PropertyResponseDto<MediaDto> =
            Self::json(self.send(|| self.http.post(&url)).await?).await?;
        Ok(done.data)
    }
}

struct Queued {
    seq: usize,
    job: UploadJob,
}

impl Queued {
    fn rank(&self) -> u8 {
        match self.job.collection {
            MediaCollection::MainImage => 1,
            MediaCollection::Images => 0,
        }
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: main images first, then submission order
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Files waiting to be uploaded. Main images go first, at most
/// `concurrency` files are in flight.
pub struct UploadQueue {
    heap: BinaryHeap<Queued>,
    next_seq: usize,
    concurrency: usize,
}

pub type UploadOutcome = (UploadJob, Result<MediaDto, UploadError>);

impl UploadQueue {
    pub fn new(concurrency: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            concurrency: concurrency.max(1),
        }
    }

    pub fn push(&mut self, job: UploadJob) {
        self.heap.push(Queued {
            seq: self.next_seq,
            job,
        });
        self.next_seq += 1;
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drains the queue in priority order.
    pub fn into_ordered(mut self) -> Vec<UploadJob> {
        let mut jobs = Vec::with_capacity(self.heap.len());
        while let Some(queued) = self.heap.pop() {
            jobs.push(queued.job);
        }
        jobs
    }

    /// Uploads everything and returns outcomes in completion order.
    pub async fn run(self, client: Arc<UploadClient>) -> Vec<UploadOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for job in self.into_ordered() {
            // Acquire before spawning so start order follows priority
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let client = client.clone();
            tasks.spawn(async move {
                let result = client.upload(&job).await;
                drop(permit);
                (job, result)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Upload task panicked: {}", e),
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(name: &str, collection: MediaCollection) -> UploadJob {
        UploadJob {
            path: PathBuf::from(name),
            property_id: 1,
            collection,
        }
    }

    #[test]
    fn plan_covers_every_byte_once() {
        let plan = ChunkPlan::new(10, 4);
        let chunks: Vec<_> = plan.chunks().collect();
        assert_eq!(plan.total(), 3);
        assert_eq!(chunks, vec![(0, 0..4), (1, 4..8), (2, 8..10)]);
    }

    #[test]
    fn retry_after_seconds_and_dates() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        assert_eq!(parse_retry_after("7", now), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        // Dates in the past mean retry now
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let policy = RetryPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.delay_for(0, None, now), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3, None, now), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10, None, now), Duration::from_secs(60));
        assert_eq!(policy.delay_for(0, Some("2"), now), Duration::from_secs(2));
        assert_eq!(policy.delay_for(0, Some("3600"), now), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2, Some("garbage"), now), Duration::from_secs(4));
    }

    #[test]
    fn main_image_jumps_the_queue() {
        let mut queue = UploadQueue::new(2);
        queue.push(job("a.jpg", MediaCollection::Images));
        queue.push(job("b.jpg", MediaCollection::Images));
        queue.push(job("main.jpg", MediaCollection::MainImage));
        queue.push(job("c.jpg", MediaCollection::Images));
        assert_eq!(queue.len(), 4);

        let order: Vec<_> = queue
            .into_ordered()
            .into_iter()
            .map(|j| j.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, ["main.jpg", "a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for(std::path::Path::new("x/IMG.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for(std::path::Path::new("clip.mov")), Some("video/quicktime"));
        assert_eq!(mime_for(std::path::Path::new("notes.txt")), None);
    }
}
