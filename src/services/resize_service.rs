//! Resize pipeline: one decoded source, one derivative per requested size.
//!
//! Sizes are processed largest first and strictly one at a time: a
//! derivative is encoded and its upload acknowledged before the next size
//! starts. When size K fails, every larger size is already stored and no
//! smaller size has been attempted.
//!
//! Decoding, resizing and encoding are CPU-bound and run on the blocking
//! thread pool. A derivative whose pixel buffer would exceed the decoder's
//! default allocation limit is refused before anything is allocated.

use crate::{
    models::request::{FileType, RequestDescriptor},
    services::{object_store::ObjectStore, storage_service::StorageError},
};
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, imageops::FilterType};
use std::{io::Cursor, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ImageProcessingError {
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode {size}px derivative: {source}")]
    Encode {
        size: u32,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to upload `{key}`: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("{width}x{height} derivative needs {needed} bytes, limit is {limit}")]
    TooLarge {
        width: u32,
        height: u32,
        needed: u64,
        limit: u64,
    },
    #[error("image task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct ResizePipeline {
    store: Arc<dyn ObjectStore>,
}

impl ResizePipeline {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Produce and upload every derivative of `request` from `source`.
    ///
    /// Returns the destination keys in upload order.
    pub async fn run(
        &self,
        request: &RequestDescriptor,
        source: Bytes,
    ) -> Result<Vec<String>, ImageProcessingError> {
        let image = Arc::new(
            tokio::task::spawn_blocking(move || image::load_from_memory(&source))
                .await?
                .map_err(ImageProcessingError::Decode)?,
        );

        let (width, height) = image.dimensions();
        debug!(width, height, "decoded source image");

        let sizes = request.sizes_descending();
        let mut written = Vec::with_capacity(sizes.len());

        for size in sizes {
            let key = request.destination_key(size);
            let data = encode_derivative(image.clone(), size, request.file_type).await?;
            let len = data.len();

            self.store
                .upload(
                    &request.user_container,
                    &key,
                    data,
                    request.file_type.mime_type(),
                )
                .await
                .map_err(|source| ImageProcessingError::Upload {
                    key: key.clone(),
                    source,
                })?;

            info!(container = %request.user_container, key = %key, bytes = len, "derivative stored");
            written.push(key);
        }

        Ok(written)
    }
}

async fn encode_derivative(
    image: Arc<DynamicImage>,
    size: u32,
    file_type: FileType,
) -> Result<Bytes, ImageProcessingError> {
    tokio::task::spawn_blocking(move || {
        let resized = resize_to_width(&image, size)?;
        encode(&resized, file_type).map_err(|source| ImageProcessingError::Encode { size, source })
    })
    .await?
}

/// Resize to exactly `width` pixels wide, keeping the aspect ratio.
pub fn resize_to_width(
    image: &DynamicImage,
    width: u32,
) -> Result<DynamicImage, ImageProcessingError> {
    let (orig_w, orig_h) = image.dimensions();
    let height = scaled_height(orig_w, orig_h, width);
    check_allocation(image, width, height)?;
    Ok(image.resize_exact(width, height, FilterType::Triangle))
}

/// Refuse output buffers larger than `image::Limits::default().max_alloc`.
/// Allocation failure aborts the process, so this has to run first.
fn check_allocation(
    image: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<(), ImageProcessingError> {
    let limit = image::Limits::default().max_alloc.unwrap_or(u64::MAX);
    let needed = u64::from(width)
        .saturating_mul(u64::from(height))
        .saturating_mul(u64::from(image.color().bytes_per_pixel()));
    if needed > limit {
        return Err(ImageProcessingError::TooLarge {
            width,
            height,
            needed,
            limit,
        });
    }
    Ok(())
}

fn scaled_height(orig_w: u32, orig_h: u32, width: u32) -> u32 {
    if orig_w == 0 {
        return 1;
    }
    let height = (orig_h as f64 * width as f64 / orig_w as f64).round() as u32;
    height.max(1)
}

/// Encode into `file_type`. JPEG has no alpha channel, so the image is
/// flattened to RGB first.
pub fn encode(image: &DynamicImage, file_type: FileType) -> Result<Bytes, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    match file_type {
        FileType::Png => image.write_to(&mut buf, file_type.image_format())?,
        FileType::Jpg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut buf, file_type.image_format())?,
    }
    Ok(Bytes::from(buf.into_inner()))
}
