//! Axis-aligned bounding rectangles.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Bounds {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A degenerate rectangle covering a single point.
    pub fn point(x: f64, y: f64) -> Self {
        Bounds::new(x, y, x, y)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Grow the rectangle to cover the given point.
    pub fn expand(&mut self, x: f64, y: f64) {
        if x < self.min_x {
            self.min_x = x;
        }
        if x > self.max_x {
            self.max_x = x;
        }
        if y < self.min_y {
            self.min_y = y;
        }
        if y > self.max_y {
            self.max_y = y;
        }
    }

    /// Grow the rectangle to cover another rectangle.
    pub fn include(&mut self, other: &Bounds) {
        self.expand(other.min_x, other.min_y);
        self.expand(other.max_x, other.max_y);
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_unions_rectangles() {
        let mut a = Bounds::new(0.0, 0.0, 1.0, 1.0);
        a.include(&Bounds::new(-2.0, 0.5, 0.5, 3.0));
        assert_eq!(a, Bounds::new(-2.0, 0.0, 1.0, 3.0));
    }

    #[test]
    fn intersects_and_contains() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(5.0, 5.0, 15.0, 15.0);
        let c = Bounds::new(2.0, 2.0, 3.0, 3.0);
        assert!(a.intersects(&b));
        assert!(!a.contains(&b));
        assert!(a.contains(&c));
        assert!(!c.intersects(&b));
    }
}
