//! 2D arithmetic shared by the document and transform layers.
//!
//! Points, sizes and vectors come from [`kurbo`]; this module adds the
//! integer conversions the document model needs and a small scale-then-offset
//! transform with an exact inverse.

pub use kurbo::{Point, Size, Vec2};

/// Round to the nearest integer, ties to even.
///
/// Values outside the `i32` range saturate.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn round_half_even(value: f64) -> i32 {
    value.round_ties_even() as i32
}

/// Convert a document-space vector into whole-unit offsets.
#[must_use]
pub fn integer_offset(by: Vec2) -> (i32, i32) {
    (round_half_even(by.x), round_half_even(by.y))
}

/// Vector from the top-left corner of `size` to its center.
#[must_use]
pub fn center_of(size: Size) -> Vec2 {
    Vec2::new(size.width / 2.0, size.height / 2.0)
}

/// Whether both dimensions are strictly positive.
#[must_use]
pub fn is_positive(size: Size) -> bool {
    size.width > 0.0 && size.height > 0.0
}

/// A uniform scale followed by a translation: `p * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleOffset {
    /// Uniform scale factor.
    pub scale: f64,
    /// Translation applied after scaling.
    pub offset: Vec2,
}

impl ScaleOffset {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        offset: Vec2::ZERO,
    };

    /// Create a transform from its parts.
    #[must_use]
    pub const fn new(scale: f64, offset: Vec2) -> Self {
        Self { scale, offset }
    }

    /// Map a point forward.
    #[must_use]
    pub fn apply(&self, point: Point) -> Point {
        (point.to_vec2() * self.scale + self.offset).to_point()
    }

    /// Map a point backward: subtract the offset, then divide by the scale.
    ///
    /// Returns `None` when the scale is zero or not finite.
    #[must_use]
    pub fn invert(&self, point: Point) -> Option<Point> {
        if self.scale == 0.0 || !self.scale.is_finite() {
            return None;
        }
        Some(((point.to_vec2() - self.offset) / self.scale).to_point())
    }
}

impl Default for ScaleOffset {
    fn default() -> Self {
        Self::IDENTITY
    }
}
