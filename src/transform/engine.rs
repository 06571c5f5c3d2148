//! Pixel operations on decoded images
//!
//! Both operations borrow their input and return a new image, so the caller's
//! buffer is never modified.

use crate::error::TransformError;
use crate::transform::command::{CropRectangle, TransformKind};
use image::DynamicImage;

/// Rotates or flips the whole image.
pub fn apply_transform(img: &DynamicImage, kind: TransformKind) -> DynamicImage {
    match kind {
        TransformKind::RotateClockwise => img.rotate90(),
        TransformKind::RotateCounterClockwise => img.rotate270(),
        TransformKind::FlipVertical => img.flipv(),
        TransformKind::FlipHorizontal => img.fliph(),
    }
}

/// Extracts the part of `img` covered by `rect`.
///
/// The rectangle is clipped to the image first. Fails with
/// [`TransformError::EmptyCropResult`] when nothing is left after clipping.
pub fn crop(img: &DynamicImage, rect: &CropRectangle) -> Result<DynamicImage, TransformError> {
    let (x, y, width, height) = rect
        .intersect(img.width(), img.height())
        .ok_or(TransformError::EmptyCropResult)?;

    Ok(img.crop_imm(x, y, width, height))
}
