use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::quadrant::Quadrant;

/// Canonical marker centroids of one physical page template, in pixels at
/// the reference scan resolution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageTemplate {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
    pub page_width: usize,
    pub page_height: usize,
}

impl Default for PageTemplate {
    fn default() -> Self {
        Self {
            top: 139.5,
            bottom: 1861.5,
            left: 126.5,
            right: 1419.5,
            page_width: 1546,
            page_height: 2000,
        }
    }
}

impl PageTemplate {
    /// Horizontal distance between marker centroids.
    #[inline]
    pub fn marker_width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn marker_height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Design position of the marker in page-frame corner `q`.
    pub fn marker(&self, q: Quadrant) -> Point2<f32> {
        match q {
            Quadrant::NW => Point2::new(self.left, self.top),
            Quadrant::NE => Point2::new(self.right, self.top),
            Quadrant::SW => Point2::new(self.left, self.bottom),
            Quadrant::SE => Point2::new(self.right, self.bottom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_geometry() {
        let t = PageTemplate::default();
        assert_eq!(t.marker_width(), 1293.0);
        assert_eq!(t.marker_height(), 1722.0);
        assert_eq!(t.marker(Quadrant::SE), Point2::new(1419.5, 1861.5));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let t: PageTemplate = serde_json::from_str(r#"{"top": 100.0}"#).expect("parse");
        assert_eq!(t.top, 100.0);
        assert_eq!(t.page_width, 1546);
    }
}
