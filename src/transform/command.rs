use crate::error::TransformError;

/// Characters that separate path segments. `,` is accepted alongside `/` so
/// coordinates can also be written as `x,y,h,w`.
const SEGMENT_SEPARATORS: [char; 2] = ['/', ','];

const TRANSFORM_SEGMENT: usize = 2;

/// Geometric operation applied to the full image before cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// `rotate-cw` - rotate 90 degrees clockwise
    RotateClockwise,
    /// `rotate-ccw` - rotate 90 degrees counter-clockwise
    RotateCounterClockwise,
    /// `flip-v` - mirror top to bottom
    FlipVertical,
    /// `flip-h` - mirror left to right
    FlipHorizontal,
}

impl TransformKind {
    /// Parses a transform from its path token.
    ///
    /// ```
    /// # use image_transformer::transform::TransformKind;
    /// assert_eq!(TransformKind::from_token("flip-h"), Some(TransformKind::FlipHorizontal));
    /// assert_eq!(TransformKind::from_token("spin"), None);
    /// ```
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "rotate-cw" => Some(TransformKind::RotateClockwise),
            "rotate-ccw" => Some(TransformKind::RotateCounterClockwise),
            "flip-v" => Some(TransformKind::FlipVertical),
            "flip-h" => Some(TransformKind::FlipHorizontal),
            _ => None,
        }
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            TransformKind::RotateClockwise => "rotate-cw",
            TransformKind::RotateCounterClockwise => "rotate-ccw",
            TransformKind::FlipVertical => "flip-v",
            TransformKind::FlipHorizontal => "flip-h",
        }
    }

    /// Whether the transform swaps width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(
            self,
            TransformKind::RotateClockwise | TransformKind::RotateCounterClockwise
        )
    }
}

/// Crop region with non-negative extents.
///
/// Coordinates are kept as `i64` so normalizing `i32` input never overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRectangle {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

impl CropRectangle {
    /// Builds a rectangle, normalizing negative extents.
    ///
    /// A negative width means the rectangle extends to the left of `x`, so the
    /// origin moves left by that amount and the width becomes positive. Height
    /// is handled the same way along y.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        let (x, width) = normalize_axis(x.into(), width.into());
        let (y, height) = normalize_axis(y.into(), height.into());
        Self { x, y, width, height }
    }

    pub fn x(&self) -> i64 {
        self.x
    }

    pub fn y(&self) -> i64 {
        self.y
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clips the rectangle to an image of the given size.
    ///
    /// Returns `(x, y, width, height)` of the visible part, or `None` when
    /// the overlap has zero width or height.
    pub fn intersect(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let (x, width) = clip_axis(self.x, self.width, image_width)?;
        let (y, height) = clip_axis(self.y, self.height, image_height)?;
        Some((x, y, width, height))
    }
}

fn normalize_axis(origin: i64, extent: i64) -> (i64, i64) {
    if extent < 0 {
        (origin + extent, -extent)
    } else {
        (origin, extent)
    }
}

fn clip_axis(origin: i64, extent: i64, bound: u32) -> Option<(u32, u32)> {
    let start = origin.max(0);
    let end = (origin + extent).min(i64::from(bound));

    if end <= start {
        return None;
    }

    // Both values lie within 0..=bound here.
    Some((start as u32, (end - start) as u32))
}

/// A fully parsed request: what to do to the image and what to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformCommand {
    pub kind: TransformKind,
    pub crop: CropRectangle,
}

impl TransformCommand {
    /// Parses a request path of the form
    /// `<ignored>/<ignored>/<transform>/<x>/<y>/<h>/<w>`.
    ///
    /// The query string and one leading `/` are dropped, then the path is
    /// split on `/` and `,`. Segments after `w` are ignored. Note the height
    /// comes before the width.
    ///
    /// ```
    /// # use image_transformer::transform::{TransformCommand, TransformKind};
    /// let cmd = TransformCommand::from_path("/api/img/rotate-cw/0/0/10/20").unwrap();
    /// assert_eq!(cmd.kind, TransformKind::RotateClockwise);
    /// assert_eq!(cmd.crop.height(), 10);
    /// assert_eq!(cmd.crop.width(), 20);
    /// ```
    pub fn from_path(path: &str) -> Result<Self, TransformError> {
        let path = path.split('?').next().unwrap_or_default();
        let path = path.strip_prefix('/').unwrap_or(path);

        let segments: Vec<&str> = path.split(SEGMENT_SEPARATORS).collect();

        let token = segments.get(TRANSFORM_SEGMENT).ok_or_else(|| {
            TransformError::MalformedRequest(format!("missing transform segment in {path:?}"))
        })?;
        let kind = TransformKind::from_token(token)
            .ok_or_else(|| TransformError::UnknownTransform(token.to_string()))?;

        let x = parse_coordinate(&segments, TRANSFORM_SEGMENT + 1, "x")?;
        let y = parse_coordinate(&segments, TRANSFORM_SEGMENT + 2, "y")?;
        let height = parse_coordinate(&segments, TRANSFORM_SEGMENT + 3, "h")?;
        let width = parse_coordinate(&segments, TRANSFORM_SEGMENT + 4, "w")?;

        Ok(Self {
            kind,
            crop: CropRectangle::new(x, y, width, height),
        })
    }
}

fn parse_coordinate(segments: &[&str], index: usize, name: &str) -> Result<i32, TransformError> {
    let raw = segments
        .get(index)
        .ok_or_else(|| TransformError::MalformedRequest(format!("missing `{name}` segment")))?;

    raw.parse::<i32>().map_err(|_| {
        TransformError::MalformedRequest(format!("`{name}` is not an integer: {raw:?}"))
    })
}
