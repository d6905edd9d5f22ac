//! Placement of read symbols into page quadrants.

use bundle_intake_core::{AffineTransform, GrayImageView};
use log::{debug, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::codec::{decode, DecodeError, FiducialCode};
use crate::orientation::{infer_orientation, Orientation};
use crate::quadrant::{classify_quadrant, CornerMap, Quadrant, QuadrantBands};
use crate::rectify::rectifying_transform;
use crate::template::PageTemplate;

/// One symbol as produced by an optical reader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSymbol {
    pub text: String,
    /// Symbol outline in pixel coordinates.
    pub polygon: Vec<Point2<f32>>,
}

impl RawSymbol {
    /// Mean of the outline vertices.
    pub fn centroid(&self) -> Option<Point2<f32>> {
        if self.polygon.is_empty() {
            return None;
        }
        let n = self.polygon.len() as f32;
        let (sx, sy) = self
            .polygon
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point2::new(sx / n, sy / n))
    }
}

/// Source of raw symbols for a raster.
///
/// Implementations wrap whatever QR reader the deployment uses.
pub trait SymbolReader {
    fn read_symbols(&self, image: &GrayImageView<'_>) -> Vec<RawSymbol>;
}

impl<F> SymbolReader for F
where
    F: Fn(&GrayImageView<'_>) -> Vec<RawSymbol>,
{
    fn read_symbols(&self, image: &GrayImageView<'_>) -> Vec<RawSymbol> {
        self(image)
    }
}

/// Decoded content of one corner symbol plus where it was seen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiducialRecord {
    pub raw: String,
    pub code: FiducialCode,
    pub x: f32,
    pub y: f32,
}

impl FiducialRecord {
    #[inline]
    pub fn position(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }
}

/// Symbol that was read but could not be placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedSymbol {
    pub text: String,
    pub reason: String,
}

/// Result of decoding one page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiducialScan {
    pub width: usize,
    pub height: usize,
    /// Keyed by screen quadrant.
    pub corners: CornerMap<FiducialRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedSymbol>,
}

impl FiducialScan {
    pub fn orientation(&self) -> Option<Orientation> {
        infer_orientation(&self.corners).ok()
    }

    /// Counter-clockwise correction in degrees, 0 when indeterminate.
    pub fn rotation(&self) -> i32 {
        crate::orientation::infer_rotation(&self.corners)
    }

    /// Marker centroids keyed by page-frame corner.
    ///
    /// Page records are placed by their printed corner index. Extra-sheet
    /// records carry no index and keep their screen quadrant.
    pub fn page_frame_centroids(&self) -> CornerMap<Point2<f32>> {
        let mut out = CornerMap::new();
        for (q, record) in self.corners.iter() {
            let frame = record
                .code
                .corner()
                .and_then(Quadrant::from_corner_index)
                .unwrap_or(q);
            if out.insert(frame, record.position()).is_some() {
                debug!("two markers claim page corner {frame}; keeping the later one");
            }
        }
        out
    }

    pub fn rectifying_transform(&self, template: &PageTemplate) -> AffineTransform {
        rectifying_transform(&self.page_frame_centroids(), template)
    }
}

/// Turns read symbols into a [`FiducialScan`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiducialDecoder {
    pub bands: QuadrantBands,
}

impl FiducialDecoder {
    pub fn new(bands: QuadrantBands) -> Self {
        Self { bands }
    }

    /// Decode symbols already read from a `width × height` raster.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, symbols), fields(symbols = symbols.len()))
    )]
    pub fn decode_symbols(&self, width: usize, height: usize, symbols: &[RawSymbol]) -> FiducialScan {
        let mut corners = CornerMap::new();
        let mut rejected = Vec::new();

        for sym in symbols {
            let code = match decode(&sym.text) {
                Ok(code) => code,
                Err(err) => {
                    warn!("skipping symbol {:?}: {err}", sym.text);
                    rejected.push(reject(sym, &err));
                    continue;
                }
            };
            let Some(c) = sym.centroid() else {
                warn!("skipping symbol {:?}: empty outline", sym.text);
                rejected.push(RejectedSymbol {
                    text: sym.text.clone(),
                    reason: "symbol has no outline".to_string(),
                });
                continue;
            };
            let Some(q) = classify_quadrant(c, width, height, &self.bands) else {
                debug!("symbol {:?} at ({:.1}, {:.1}) is in the central band", sym.text, c.x, c.y);
                continue;
            };
            if corners.contains(q) {
                warn!("second symbol in {q} ignored: {:?}", sym.text);
                continue;
            }
            corners.insert(
                q,
                FiducialRecord {
                    raw: sym.text.clone(),
                    code,
                    x: c.x,
                    y: c.y,
                },
            );
        }

        debug!(
            "decoded {} corner(s), rejected {} symbol(s)",
            corners.len(),
            rejected.len()
        );
        FiducialScan {
            width,
            height,
            corners,
            rejected,
        }
    }

    /// Read and decode the symbols of `image`.
    pub fn decode_image(&self, image: &GrayImageView<'_>, reader: &dyn SymbolReader) -> FiducialScan {
        let symbols = reader.read_symbols(image);
        self.decode_symbols(image.width, image.height, &symbols)
    }
}

fn reject(sym: &RawSymbol, err: &DecodeError) -> RejectedSymbol {
    RejectedSymbol {
        text: sym.text.clone(),
        reason: err.to_string(),
    }
}
