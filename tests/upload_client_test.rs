use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
    routing::{post, put},
};
use listing_backend::{
    dtos::{
        ChunkAcceptedDto, InitUploadDto, MediaCollection, MediaDto, PropertyResponseDto,
        UploadSessionDto,
    },
    uploads::{RetryPolicy, UploadClient, UploadJob, client::UploadError},
};
use uuid::Uuid;

const CHUNK_SIZE: u64 = 4;

/// Fake upload API: rejects the first `throttle` init calls with 429.
#[derive(Clone, Default)]
struct FakeServer {
    throttle: usize,
    retry_after: &'static str,
    init_calls: Arc<AtomicUsize>,
    chunks: Arc<Mutex<BTreeMap<u64, Vec<u8>>>>,
    declared_size: Arc<AtomicUsize>,
}

async fn init(State(server): State<FakeServer>, Json(body): Json<InitUploadDto>) -> Response {
    let call = server.init_calls.fetch_add(1, Ordering::SeqCst);
    if call < server.throttle {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, server.retry_after)],
            "slow down",
        )
            .into_response();
    }
    server
        .declared_size
        .store(body.size as usize, Ordering::SeqCst);
    (
        StatusCode::CREATED,
        Json(UploadSessionDto {
            upload_id: Uuid::new_v4(),
            chunk_size: CHUNK_SIZE,
            total_chunks: body.size.div_ceil(CHUNK_SIZE),
        }),
    )
        .into_response()
}

async fn chunk(
    State(server): State<FakeServer>,
    Path((_id, index)): Path<(Uuid, u64)>,
    body: Bytes,
) -> Json<ChunkAcceptedDto> {
    let mut chunks = server.chunks.lock().unwrap();
    chunks.insert(index, body.to_vec());
    Json(ChunkAcceptedDto {
        status: "success".into(),
        received: chunks.len() as u64,
        total_chunks: 0,
    })
}

async fn complete(
    State(server): State<FakeServer>,
    Path(_id): Path<Uuid>,
) -> (StatusCode, Json<PropertyResponseDto<MediaDto>>) {
    let size = server.declared_size.load(Ordering::SeqCst) as i64;
    (
        StatusCode::CREATED,
        Json(PropertyResponseDto {
            status: "success".into(),
            data: MediaDto {
                id: 7,
                uuid: Uuid::new_v4(),
                collection: "main_image".into(),
                file_name: "house.jpg".into(),
                mime_type: "image/jpeg".into(),
                size,
                url: "http://cdn.test/house.jpg".into(),
                conversions: BTreeMap::new(),
                order: 0,
            },
        }),
    )
}

async fn spawn(server: FakeServer) -> String {
    let app = Router::new()
        .route("/api/v1/uploads", post(init))
        .route("/api/v1/uploads/{upload_id}/chunks/{index}", put(chunk))
        .route("/api/v1/uploads/{upload_id}/complete", post(complete))
        .with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api/v1", addr)
}

fn temp_file(contents: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("upload-client-{}.jpg", Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
}

fn client(base_url: String, max_retries: u32) -> UploadClient {
    UploadClient::new(reqwest::Client::new(), base_url, "token")
        .with_delay(Duration::ZERO)
        .with_policy(RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(60),
        })
}

#[tokio::test]
async fn test_rate_limited_upload_waits_for_retry_after_then_succeeds() {
    let server = FakeServer {
        throttle: 1,
        retry_after: "1",
        ..Default::default()
    };
    let base_url = spawn(server.clone()).await;
    let contents = b"0123456789";
    let path = temp_file(contents);

    let started = Instant::now();
    let media = client(base_url, 5)
        .upload(&UploadJob {
            path: path.clone(),
            property_id: 1,
            collection: MediaCollection::MainImage,
        })
        .await
        .expect("upload should succeed after one retry");

    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "Client should honor Retry-After before retrying"
    );
    assert_eq!(server.init_calls.load(Ordering::SeqCst), 2);
    assert_eq!(media.id, 7);
    assert_eq!(media.size, contents.len() as i64);

    let chunks = server.chunks.lock().unwrap();
    assert_eq!(chunks.len(), 3, "10 bytes in 4 byte chunks is 3 chunks");
    let reassembled: Vec<u8> = chunks.values().flatten().copied().collect();
    assert_eq!(reassembled, contents);

    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn test_upload_gives_up_after_max_retries() {
    let server = FakeServer {
        throttle: usize::MAX,
        retry_after: "0",
        ..Default::default()
    };
    let base_url = spawn(server.clone()).await;
    let path = temp_file(b"abc");

    let result = client(base_url, 2)
        .upload(&UploadJob {
            path: path.clone(),
            property_id: 1,
            collection: MediaCollection::Images,
        })
        .await;

    assert!(matches!(result, Err(UploadError::RetriesExhausted(2))));
    // The first try plus two retries
    assert_eq!(server.init_calls.load(Ordering::SeqCst), 3);

    let _ = std::fs::remove_file(path);
}
