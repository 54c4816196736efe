//! Product image uploads.
//!
//! Uploads are sniffed from their magic bytes, decoded, scaled down to a
//! large and a thumbnail rendition and re-encoded as JPEG. Files live under
//! `<upload_dir>/products/<product_id>/` and are served from `/uploads`.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, Limits};
use thiserror::Error;
use uuid::Uuid;

pub const LARGE_EDGE: u32 = 1200;
pub const THUMB_EDGE: u32 = 400;
const JPEG_QUALITY: u8 = 85;
const MAX_SOURCE_EDGE: u32 = 10_000;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("unsupported image type")]
    Unsupported,
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("image processing task failed")]
    Task,
}

/// Result of processing one upload, before anything touches the disk.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub large: Vec<u8>,
    pub thumb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Files written for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub id: Uuid,
    pub file_stem: String,
    pub url: String,
    pub thumb_url: String,
    pub width: u32,
    pub height: u32,
}

/// Accepts JPEG, PNG, WebP and GIF, judged by content only.
///
/// # Errors
///
/// Returns [`MediaError::Unsupported`] for anything else.
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, MediaError> {
    match image::guess_format(bytes) {
        Ok(f @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif)) => Ok(f),
        _ => Err(MediaError::Unsupported),
    }
}

/// Scales `img` down to fit a `max_edge` square, keeping the aspect ratio.
/// Smaller images are returned unchanged.
#[must_use]
pub fn fit_within(img: &DynamicImage, max_edge: u32) -> DynamicImage {
    if img.width() <= max_edge && img.height() <= max_edge {
        return img.clone();
    }
    img.resize(max_edge, max_edge, FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, MediaError> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| MediaError::Decode(e.to_string()))?;
    Ok(out)
}

/// Decodes and renders both sizes. CPU-bound; call from a blocking thread.
///
/// # Errors
///
/// Returns [`MediaError::Unsupported`] or [`MediaError::Decode`] for bad input.
pub fn process(bytes: &[u8]) -> Result<ProcessedImage, MediaError> {
    let format = detect_format(bytes)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_EDGE);
    limits.max_image_height = Some(MAX_SOURCE_EDGE);
    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    let img = reader.decode().map_err(|e| MediaError::Decode(e.to_string()))?;

    let large = fit_within(&img, LARGE_EDGE);
    let thumb = fit_within(&large, THUMB_EDGE);
    Ok(ProcessedImage {
        width: large.width(),
        height: large.height(),
        large: encode_jpeg(&large)?,
        thumb: encode_jpeg(&thumb)?,
    })
}

/// Image storage rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    max_bytes: usize,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self { root: root.into(), max_bytes }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn product_dir(&self, product_id: Uuid) -> PathBuf {
        self.root.join("products").join(product_id.to_string())
    }

    /// Processes an upload on the blocking pool and writes both renditions.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::TooLarge`] before decoding anything when the
    /// upload exceeds the size limit, decode errors for bad input, and
    /// [`MediaError::Io`] if the files cannot be written.
    pub async fn store_product_image(
        &self,
        product_id: Uuid,
        bytes: Vec<u8>,
    ) -> Result<StoredImage, MediaError> {
        if bytes.len() > self.max_bytes {
            return Err(MediaError::TooLarge { limit: self.max_bytes });
        }

        let processed = tokio::task::spawn_blocking(move || process(&bytes))
            .await
            .map_err(|_| MediaError::Task)??;

        let id = Uuid::now_v7();
        let file_stem = id.to_string();
        let dir = self.product_dir(product_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(format!("{file_stem}.jpg")), &processed.large).await?;
        tokio::fs::write(dir.join(format!("{file_stem}_thumb.jpg")), &processed.thumb).await?;

        tracing::info!(
            product_id = %product_id,
            image_id = %id,
            width = processed.width,
            height = processed.height,
            "product image stored"
        );

        Ok(StoredImage {
            id,
            url: format!("/uploads/products/{product_id}/{file_stem}.jpg"),
            thumb_url: format!("/uploads/products/{product_id}/{file_stem}_thumb.jpg"),
            file_stem,
            width: processed.width,
            height: processed.height,
        })
    }

    /// Deletes both renditions. Files that are already gone are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Io`] for any other filesystem error.
    pub async fn remove_product_image(&self, product_id: Uuid, file_stem: &str) -> Result<(), MediaError> {
        let dir = self.product_dir(product_id);
        for name in [format!("{file_stem}.jpg"), format!("{file_stem}_thumb.jpg")] {
            match tokio::fs::remove_file(dir.join(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn detects_by_content_not_name() {
        assert_eq!(detect_format(&png(4, 4)).unwrap(), ImageFormat::Png);
        assert!(matches!(detect_format(b"<svg xmlns='...'/>"), Err(MediaError::Unsupported)));
        assert!(matches!(detect_format(b"%PDF-1.7"), Err(MediaError::Unsupported)));
    }

    #[test]
    fn large_images_are_scaled_down_keeping_aspect() {
        let out = process(&png(1600, 800)).unwrap();
        assert_eq!((out.width, out.height), (1200, 600));
        let thumb = image::load_from_memory(&out.thumb).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (400, 200));
        assert_eq!(image::guess_format(&out.large).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let out = process(&png(300, 200)).unwrap();
        assert_eq!((out.width, out.height), (300, 200));
        let thumb = image::load_from_memory(&out.thumb).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (300, 200));
    }

    #[tokio::test]
    async fn store_and_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path(), 5 * 1024 * 1024);
        let product_id = Uuid::new_v4();

        let stored = store.store_product_image(product_id, png(900, 1200)).await.unwrap();
        assert_eq!((stored.width, stored.height), (900, 1200));
        assert_eq!(stored.url, format!("/uploads/products/{product_id}/{}.jpg", stored.file_stem));
        let large = dir.path().join("products").join(product_id.to_string()).join(format!("{}.jpg", stored.file_stem));
        assert!(large.exists());

        store.remove_product_image(product_id, &stored.file_stem).await.unwrap();
        assert!(!large.exists());
        store.remove_product_image(product_id, &stored.file_stem).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_oversized_uploads_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path(), 16);
        let err = store.store_product_image(Uuid::new_v4(), png(10, 10)).await.unwrap_err();
        assert!(matches!(err, MediaError::TooLarge { limit: 16 }));
    }
}
