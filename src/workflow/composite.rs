// src/workflow/composite.rs
//! Side-by-side image compositing for two-player mode.
//!
//! The video model accepts three reference images, so each player's sprite
//! and character sheet are merged into one picture before step 3.

use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use uuid::Uuid;

use crate::services::{ObjectStore, ServiceResult};

const COMPOSITE_FOLDER: &str = "retro_games_composites";

/// Downloads both images, joins them left to right and stores the result.
pub async fn create_composite_image(
    storage: &dyn ObjectStore,
    left_uri: &str,
    right_uri: &str,
) -> ServiceResult<String> {
    let left = storage.download(left_uri).await?;
    let right = storage.download(right_uri).await?;

    let png = tokio::task::spawn_blocking(move || compose_side_by_side(&left, &right)).await??;

    let filename = format!("composite_{}.png", Uuid::new_v4());
    let uri = storage.store(COMPOSITE_FOLDER, &filename, "image/png", png).await?;
    tracing::debug!(left = %left_uri, right = %right_uri, composite = %uri, "Composite image stored");
    Ok(uri)
}

/// Scales both images to the taller height and pastes them side by side.
/// Returns PNG bytes.
pub fn compose_side_by_side(left: &[u8], right: &[u8]) -> ServiceResult<Vec<u8>> {
    let left = image::load_from_memory(left)?;
    let right = image::load_from_memory(right)?;

    let height = left.height().max(right.height()).max(1);
    let left = scale_to_height(left, height);
    let right = scale_to_height(right, height);

    let mut canvas = RgbaImage::new(left.width() + right.width(), height);
    imageops::replace(&mut canvas, &left, 0, 0);
    imageops::replace(&mut canvas, &right, i64::from(left.width()), 0);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn scale_to_height(image: DynamicImage, height: u32) -> RgbaImage {
    if image.height() == height {
        return image.to_rgba8();
    }
    let width = ((u64::from(image.width()) * u64::from(height)) / u64::from(image.height().max(1))).max(1) as u32;
    image.resize_exact(width, height, FilterType::Nearest).to_rgba8()
}
