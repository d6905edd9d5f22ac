//! Rectification of a scanned page onto its template and region extraction.

use bundle_intake_core::{affine_from_3pt, warp_affine_gray, AffineTransform, GrayImage, GrayImageView};
use log::warn;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::quadrant::{CornerMap, Quadrant};
use crate::template::PageTemplate;

/// Page-frame corner triples tried in order when building the transform.
const TRIPLES: [[Quadrant; 3]; 2] = [
    [Quadrant::NW, Quadrant::SW, Quadrant::SE],
    [Quadrant::NE, Quadrant::SW, Quadrant::SE],
];

/// Affine map from observed pixel positions to template design positions.
///
/// `page_corners` is keyed by page-frame corner (derived from each marker's
/// printed corner index), not by screen quadrant. The identity is returned
/// when no usable triple is present.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn rectifying_transform(
    page_corners: &CornerMap<Point2<f32>>,
    template: &PageTemplate,
) -> AffineTransform {
    for triple in TRIPLES {
        let (Some(a), Some(b), Some(c)) = (
            page_corners.get(triple[0]),
            page_corners.get(triple[1]),
            page_corners.get(triple[2]),
        ) else {
            continue;
        };

        let src = [*a, *b, *c];
        let dst = triple.map(|q| template.marker(q));
        match affine_from_3pt(&src, &dst) {
            Some(t) => return t,
            None => {
                warn!("collinear markers at {triple:?}; trying next triple");
            }
        }
    }
    AffineTransform::identity()
}

/// Sub-rectangle given as fractions of the marker-bounded region.
///
/// `0.0` is the top (left) marker centroid and `1.0` the bottom (right) one;
/// values outside `[0, 1]` reach past the markers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionFractions {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl RegionFractions {
    /// The whole marker-bounded region.
    pub fn markers() -> Self {
        Self {
            top: 0.0,
            bottom: 1.0,
            left: 0.0,
            right: 1.0,
        }
    }

    /// Half-open pixel window `(x0, y0, x1, y1)` on the righted page.
    pub fn pixel_window(&self, template: &PageTemplate) -> (usize, usize, usize, usize) {
        let top = (template.top + self.top * template.marker_height()).round();
        let bottom = (template.top + self.bottom * template.marker_height()).round();
        let left = (template.left + self.left * template.marker_width()).round();
        let right = (template.left + self.right * template.marker_width()).round();

        let (pw, ph) = (template.page_width as f32, template.page_height as f32);
        if top < 0.0 || left < 0.0 {
            warn!("region top/left ({top}, {left}) outside the page, capping at 0");
        }
        if right > pw || bottom > ph {
            warn!("region right/bottom ({right}, {bottom}) outside the page, capping at {pw}x{ph}");
        }

        let x0 = left.clamp(0.0, pw) as usize;
        let y0 = top.clamp(0.0, ph) as usize;
        let x1 = (right.clamp(0.0, pw) as usize).max(x0);
        let y1 = (bottom.clamp(0.0, ph) as usize).max(y0);
        (x0, y0, x1, y1)
    }
}

/// Warp `src` onto the template page and crop `region`.
///
/// Only the requested window is resampled.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(src, transform, template)))]
pub fn extract_region(
    src: &GrayImageView<'_>,
    transform: &AffineTransform,
    template: &PageTemplate,
    region: RegionFractions,
) -> GrayImage {
    let (x0, y0, x1, y1) = region.pixel_window(template);
    let shift = AffineTransform::from_array([[1.0, 0.0, -(x0 as f64)], [0.0, 1.0, -(y0 as f64)]]);
    warp_affine_gray(src, &shift.compose(transform), x1 - x0, y1 - y0)
}

/// The full righted page at template resolution.
pub fn rectify_page(
    src: &GrayImageView<'_>,
    transform: &AffineTransform,
    template: &PageTemplate,
) -> GrayImage {
    warp_affine_gray(src, transform, template.page_width, template.page_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn corners(points: &[(Quadrant, f32, f32)]) -> CornerMap<Point2<f32>> {
        let mut m = CornerMap::new();
        for &(q, x, y) in points {
            m.insert(q, Point2::new(x, y));
        }
        m
    }

    fn assert_maps(t: &AffineTransform, from: Point2<f32>, to: Point2<f32>) {
        let p = t.apply(from);
        assert_relative_eq!(p.x, to.x, epsilon = 1e-2);
        assert_relative_eq!(p.y, to.y, epsilon = 1e-2);
    }

    #[test]
    fn observed_corners_map_onto_template() {
        let tpl = PageTemplate::default();
        // page scanned at half scale and shifted
        let obs = corners(&[
            (Quadrant::NW, 10.0 + 126.5 / 2.0, 20.0 + 139.5 / 2.0),
            (Quadrant::SW, 10.0 + 126.5 / 2.0, 20.0 + 1861.5 / 2.0),
            (Quadrant::SE, 10.0 + 1419.5 / 2.0, 20.0 + 1861.5 / 2.0),
            (Quadrant::NE, 10.0 + 1419.5 / 2.0, 20.0 + 139.5 / 2.0),
        ]);
        let t = rectifying_transform(&obs, &tpl);
        for q in Quadrant::ORDER {
            assert_maps(&t, *obs.get(q).expect("present"), tpl.marker(q));
        }
    }

    #[test]
    fn falls_back_to_ne_triple() {
        let tpl = PageTemplate::default();
        let obs = corners(&[
            (Quadrant::NE, 1419.5, 139.5),
            (Quadrant::SW, 126.5, 1861.5),
            (Quadrant::SE, 1419.5, 1861.5),
        ]);
        let t = rectifying_transform(&obs, &tpl);
        assert_maps(&t, Point2::new(126.5, 139.5), tpl.marker(Quadrant::NW));
    }

    #[test]
    fn missing_triple_is_identity() {
        let tpl = PageTemplate::default();
        let obs = corners(&[(Quadrant::NW, 1.0, 2.0), (Quadrant::NE, 3.0, 4.0)]);
        assert!(rectifying_transform(&obs, &tpl).is_identity());
    }

    #[test]
    fn region_window_is_fraction_of_marker_box() {
        let tpl = PageTemplate::default();
        assert_eq!(
            RegionFractions::markers().pixel_window(&tpl),
            (127, 140, 1420, 1862)
        );
        let half = RegionFractions {
            top: 0.0,
            bottom: 0.5,
            left: 0.5,
            right: 1.0,
        };
        assert_eq!(half.pixel_window(&tpl), (773, 140, 1420, 1001));
    }

    #[test]
    fn region_window_clamps_to_page() {
        let tpl = PageTemplate::default();
        let wide = RegionFractions {
            top: -1.0,
            bottom: 2.0,
            left: -1.0,
            right: 2.0,
        };
        assert_eq!(wide.pixel_window(&tpl), (0, 0, 1546, 2000));
    }

    #[test]
    fn extract_copies_identity_window() {
        let tpl = PageTemplate::default();
        let mut page = GrayImage::filled(tpl.page_width, tpl.page_height, 0);
        // mark one pixel inside the marker box
        let (px, py) = (200usize, 300usize);
        page.data[py * page.width + px] = 255;

        let region = RegionFractions::markers();
        let out = extract_region(&page.view(), &AffineTransform::identity(), &tpl, region);
        let (x0, y0, x1, y1) = region.pixel_window(&tpl);
        assert_eq!((out.width, out.height), (x1 - x0, y1 - y0));
        assert_eq!(out.get(px - x0, py - y0), Some(255));
        assert_eq!(out.get(0, 0), Some(0));
    }
}
