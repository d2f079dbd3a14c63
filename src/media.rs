//! Property media: validation, the five fixed image conversions, storage
//! layout and cleanup.

use axum::http::StatusCode;
use image::{DynamicImage, GenericImageView, imageops::FilterType};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::{DBClient, MediaExt, NewMedia};
use crate::dtos::{MediaCollection, MediaDto};
use crate::error::{ErrorMessage, HttpError};
use crate::models::{Media, MediaModel};
use crate::storage::{Storage, StorageError};

pub const IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];
pub const VIDEO_TYPES: [&str; 3] = ["video/mp4", "video/quicktime", "video/webm"];

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

pub fn classify(mime: &str) -> Option<MediaKind> {
    let mime = mime.trim().to_ascii_lowercase();
    if IMAGE_TYPES.contains(&mime.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_TYPES.contains(&mime.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    /// Fill the box and center-crop instead of fitting inside it.
    pub crop: bool,
}

pub const CONVERSIONS: [Conversion; 5] = [
    Conversion { name: "thumbnail", width: 150, height: 150, crop: true },
    Conversion { name: "small", width: 320, height: 240, crop: false },
    Conversion { name: "medium", width: 640, height: 480, crop: false },
    Conversion { name: "large", width: 1024, height: 768, crop: false },
    Conversion { name: "full", width: 1920, height: 1080, crop: false },
];

/// Largest size with the source aspect ratio that fits the box. Never
/// larger than the source.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = f64::min(max_w as f64 / width as f64, max_h as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w.min(max_w), h.min(max_h))
}

fn render(img: &DynamicImage, conversion: &Conversion) -> DynamicImage {
    let (w, h) = img.dimensions();
    if conversion.crop {
        if w >= conversion.width && h >= conversion.height {
            return img.resize_to_fill(conversion.width, conversion.height, FilterType::Lanczos3);
        }
        // Too small to fill: square center crop at source resolution
        let side = w.min(h).min(conversion.width.max(conversion.height));
        return img.crop_imm((w - side) / 2, (h - side) / 2, side, side);
    }
    let (tw, th) = fit_within(w, h, conversion.width, conversion.height);
    if (tw, th) == (w, h) {
        img.clone()
    } else {
        img.resize_exact(tw, th, FilterType::Lanczos3)
    }
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.encode_image(&rgb)?;
    Ok(out)
}

/// Decodes the image and produces every conversion as JPEG bytes.
/// CPU bound, run it on the blocking pool.
pub fn render_conversions(bytes: &[u8]) -> Result<Vec<(&'static str, Vec<u8>)>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    CONVERSIONS
        .iter()
        .map(|c| Ok((c.name, encode_jpeg(&render(&img, c))?)))
        .collect()
}

/// `My Photo (1).JPG` -> `my-photo-1.jpg`
pub fn sanitize_file_name(name: &str) -> String {
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let clean = |s: &str| {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    };
    let stem = match clean(stem) {
        s if s.is_empty() => "file".to_string(),
        s => s.chars().take(100).collect(),
    };
    match ext.map(clean).filter(|e| !e.is_empty()) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

pub fn base_dir(property_id: i64, media_uuid: Uuid) -> String {
    format!("properties/{}/{}", property_id, media_uuid)
}

pub fn conversion_path(property_id: i64, media_uuid: Uuid, name: &str) -> String {
    format!("{}/conversions/{}.jpg", base_dir(property_id, media_uuid), name)
}

#[derive(Debug)]
pub enum MediaError {
    UnsupportedType(String),
    TooLarge(usize),
    Decode(image::ImageError),
    Storage(StorageError),
    Db(sqlx::Error),
    Task(String),
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::UnsupportedType(mime) => write!(f, "Unsupported file type: {}", mime),
            MediaError::TooLarge(max) => write!(f, "File exceeds the {} byte limit", max),
            MediaError::Decode(e) => write!(f, "Image could not be decoded: {}", e),
            MediaError::Storage(e) => write!(f, "{}", e),
            MediaError::Db(e) => write!(f, "Database error: {}", e),
            MediaError::Task(e) => write!(f, "Conversion task failed: {}", e),
        }
    }
}

impl std::error::Error for MediaError {}

impl From<StorageError> for MediaError {
    fn from(e: StorageError) -> Self {
        MediaError::Storage(e)
    }
}

impl From<sqlx::Error> for MediaError {
    fn from(e: sqlx::Error) -> Self {
        MediaError::Db(e)
    }
}

impl MediaError {
    /// Client mistakes become a 422 on `file`, the rest a 500.
    pub fn into_http(self, debug: bool) -> HttpError {
        match self {
            MediaError::UnsupportedType(_) | MediaError::TooLarge(_) | MediaError::Decode(_) => {
                HttpError::field("file", self.to_string())
            }
            other => {
                tracing::error!("Media error: {}", other);
                HttpError::internal(other, debug)
            }
        }
    }
}

/// A file to attach to a property.
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Validates, stores and records one upload. Uploading to `main_image`
/// replaces the current main image.
pub async fn attach_to_property(
    db: &DBClient,
    storage: &Storage,
    property_id: i64,
    collection: MediaCollection,
    upload: Upload,
    max_bytes: usize,
) -> Result<Media, MediaError> {
    let kind = classify(&upload.mime_type)
        .ok_or_else(|| MediaError::UnsupportedType(upload.mime_type.clone()))?;
    if upload.bytes.len() > max_bytes {
        return Err(MediaError::TooLarge(max_bytes));
    }
    if kind == MediaKind::Video && collection == MediaCollection::MainImage {
        return Err(MediaError::UnsupportedType(upload.mime_type));
    }

    let media_uuid = Uuid::new_v4();
    let file_name = sanitize_file_name(&upload.file_name);
    let path = format!("{}/{}", base_dir(property_id, media_uuid), file_name);
    let size = upload.bytes.len() as i64;
    let mime_type = upload.mime_type.trim().to_ascii_lowercase();

    let rendered = if kind == MediaKind::Image {
        let bytes = upload.bytes.clone();
        tokio::task::spawn_blocking(move || render_conversions(&bytes))
            .await
            .map_err(|e| MediaError::Task(e.to_string()))?
            .map_err(MediaError::Decode)?
    } else {
        Vec::new()
    };

    storage.put(&path, upload.bytes, &mime_type).await?;

    let mut conversions = BTreeMap::new();
    for (name, bytes) in rendered {
        let conversion = conversion_path(property_id, media_uuid, name);
        if let Err(e) = storage.put(&conversion, bytes, "image/jpeg").await {
            remove_files(storage, &path, conversions.values()).await;
            return Err(e.into());
        }
        conversions.insert(name.to_string(), conversion);
    }

    let record = NewMedia {
        uuid: media_uuid,
        model: MediaModel::Property,
        model_id: property_id.to_string(),
        collection: collection.to_str().to_string(),
        file_name,
        mime_type,
        disk: storage.disk().to_string(),
        path: path.clone(),
        size,
        conversions: conversions.clone(),
    };

    let saved = if collection.holds_single_item() {
        db.replace_media(record).await
    } else {
        db.add_media(record).await.map(|media| (media, Vec::new()))
    };

    match saved {
        Ok((media, previous)) => {
            // Old files go only once the new row is committed
            for old in &previous {
                delete_files(storage, old).await;
            }
            tracing::info!(property_id, media_id = media.id, replaced = previous.len(), "Media attached");
            Ok(media)
        }
        Err(e) => {
            remove_files(storage, &path, conversions.values()).await;
            Err(e.into())
        }
    }
}

async fn remove_files<'a>(
    storage: &Storage,
    original: &'a str,
    conversions: impl Iterator<Item = &'a String>,
) {
    let paths = std::iter::once(original).chain(conversions.map(String::as_str));
    for path in paths {
        if let Err(e) = storage.delete(path).await {
            tracing::warn!(path, "Failed to remove stored file: {}", e);
        }
    }
}

/// Best effort: failures are logged, the row is already gone.
pub async fn delete_files(storage: &Storage, media: &Media) {
    remove_files(storage, &media.path, media.conversions.0.values()).await;
}

/// Deletes every media row and file of a property.
pub async fn purge_property_media(
    db: &DBClient,
    storage: &Storage,
    property_id: i64,
) -> Result<usize, sqlx::Error> {
    let removed = db
        .delete_media_for(MediaModel::Property, &property_id.to_string(), None)
        .await?;
    for media in &removed {
        delete_files(storage, media).await;
    }
    Ok(removed.len())
}

pub fn to_dto(storage: &Storage, media: &Media) -> MediaDto {
    MediaDto {
        id: media.id,
        uuid: media.uuid,
        collection: media.collection_name.clone(),
        file_name: media.file_name.clone(),
        mime_type: media.mime_type.clone(),
        size: media.size,
        url: storage.url(&media.path),
        conversions: media
            .conversions
            .0
            .iter()
            .map(|(name, path)| (name.clone(), storage.url(path)))
            .collect(),
        order: media.order_column,
    }
}

/// 404 unless the media belongs to the property.
pub fn ensure_belongs(media: &Media, property_id: i64) -> Result<(), HttpError> {
    if media.model_type == MediaModel::Property.to_str() && media.model_id == property_id.to_string()
    {
        Ok(())
    } else {
        Err(HttpError::new(
            ErrorMessage::ResourceNotFound.to_string(),
            StatusCode::NOT_FOUND,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 30, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn classifies_allowed_types() {
        assert_eq!(classify("image/JPEG"), Some(MediaKind::Image));
        assert_eq!(classify("video/quicktime"), Some(MediaKind::Video));
        assert_eq!(classify("application/pdf"), None);
    }

    #[test]
    fn fit_preserves_aspect_and_never_upscales() {
        assert_eq!(fit_within(4000, 3000, 1024, 768), (1024, 768));
        assert_eq!(fit_within(3000, 1000, 640, 480), (640, 213));
        assert_eq!(fit_within(1000, 3000, 640, 480), (160, 480));
        assert_eq!(fit_within(200, 100, 640, 480), (200, 100));
    }

    #[test]
    fn renders_all_five_conversions() {
        let out = render_conversions(&png(800, 600)).unwrap();
        let names: Vec<_> = out.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["thumbnail", "small", "medium", "large", "full"]);

        let dims = |bytes: &[u8]| image::load_from_memory(bytes).unwrap().dimensions();
        assert_eq!(dims(&out[0].1), (150, 150));
        assert_eq!(dims(&out[1].1), (320, 240));
        assert_eq!(dims(&out[2].1), (640, 480));
        // Smaller than the box: kept at source size
        assert_eq!(dims(&out[3].1), (800, 600));
        assert_eq!(dims(&out[4].1), (800, 600));
    }

    #[test]
    fn tiny_images_are_not_upscaled_into_thumbnails() {
        let out = render_conversions(&png(100, 60)).unwrap();
        let thumb = image::load_from_memory(&out[0].1).unwrap();
        assert_eq!(thumb.dimensions(), (60, 60));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(render_conversions(b"not an image").is_err());
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("My Photo (1).JPG"), "my-photo-1.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("???.png"), "file.png");
        assert_eq!(sanitize_file_name(".env"), "env");
    }

    #[test]
    fn storage_layout() {
        let id = Uuid::nil();
        assert_eq!(
            conversion_path(7, id, "thumbnail"),
            "properties/7/00000000-0000-0000-0000-000000000000/conversions/thumbnail.jpg"
        );
    }
}
