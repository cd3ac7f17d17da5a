use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in `(x1, y1)`-`(x2, y2)` corner form.
///
/// Boxes are used both in pixel space (person detections, the shooter's hand
/// box) and in normalized `[0, 1]` space (hand extents before they are scaled
/// to a frame). Nothing here assumes one or the other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox { x1, y1, x2, y2 })
    }

    /// Intersection area divided by the area of `reference`.
    ///
    /// Not IoU: this measures how much of the reference box is covered.
    /// A degenerate reference box has no coverage.
    pub fn overlap_ratio(&self, reference: &BoundingBox) -> f32 {
        let reference_area = reference.area();
        if reference_area <= 0.0 {
            return 0.0;
        }
        self.intersection(reference)
            .map(|i| i.area() / reference_area)
            .unwrap_or(0.0)
    }

    /// Inclusive on every edge.
    pub fn contains(&self, point: Point) -> bool {
        self.x1 <= point.x && point.x <= self.x2 && self.y1 <= point.y && point.y <= self.y2
    }

    pub fn pad(&self, margin: f32) -> BoundingBox {
        BoundingBox {
            x1: self.x1 - margin,
            y1: self.y1 - margin,
            x2: self.x2 + margin,
            y2: self.y2 + margin,
        }
    }

    pub fn clamp(&self, max_x: f32, max_y: f32) -> BoundingBox {
        BoundingBox {
            x1: self.x1.clamp(0.0, max_x),
            y1: self.y1.clamp(0.0, max_y),
            x2: self.x2.clamp(0.0, max_x),
            y2: self.y2.clamp(0.0, max_y),
        }
    }

    pub fn scale(&self, sx: f32, sy: f32) -> BoundingBox {
        BoundingBox {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }
}
