//! Image transform commands and the pixel operations behind them
//!
//! - **`command`**: turns a request path into a [`TransformCommand`]
//! - **`engine`**: rotates, flips and crops decoded images
//!
//! A command always runs in the same order: the full image is rotated or
//! flipped first, then the crop rectangle is applied to the *transformed*
//! image.

pub mod command;
pub mod engine;

pub use command::{CropRectangle, TransformCommand, TransformKind};
pub use engine::{apply_transform, crop};
