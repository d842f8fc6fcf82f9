// THEORY:
// The `geometry` module is the smallest building block of the tracking engine.
// Everything above it (association, activity, presentation) speaks in terms of
// axis-aligned boxes in frame pixel coordinates with a top-left origin.
//
// Key architectural principles:
// 1.  **Plain Values**: A `BoundingBox` is `Copy` and carries no identity. It is
//     the same kind of "dumb" container as a detection: it describes where
//     something is in one frame and nothing else.
// 2.  **Total Functions**: Every measurement here is defined for every input.
//     Degenerate boxes (zero, negative or non-finite dimensions) never panic;
//     they report an IoU of zero and are flagged by `is_valid` so the layers
//     above can decide to exclude them.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// The geometric center of the box.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Area of the box, or zero if it is degenerate.
    pub fn area(&self) -> f64 {
        if self.is_valid() {
            self.width * self.height
        } else {
            0.0
        }
    }

    /// A box can take part in matching only if every coordinate is finite and
    /// both dimensions are strictly positive.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Intersection-over-union with another box.
    ///
    /// Returns `0.0` when the boxes do not overlap or either of them is
    /// degenerate, and `1.0` for identical valid boxes. The measure is symmetric.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        if !self.is_valid() || !other.is_valid() {
            return 0.0;
        }

        let x_a = self.x.max(other.x);
        let y_a = self.y.max(other.y);
        let x_b = (self.x + self.width).min(other.x + other.width);
        let y_b = (self.y + self.height).min(other.y + other.height);

        let intersection = (x_b - x_a).max(0.0) * (y_b - y_a).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 { intersection / union } else { 0.0 }
    }

    /// Euclidean distance between the centers of two boxes.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        distance(self.center(), other.center())
    }
}

/// Euclidean distance between two points.
pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
