//! Page corners and the screen-quadrant classification of symbol centroids.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One of the four page corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quadrant {
    NW,
    NE,
    SW,
    SE,
}

impl Quadrant {
    /// Canonical iteration order. Whenever a single representative corner is
    /// needed, the first present one in this order is used.
    pub const ORDER: [Quadrant; 4] = [Quadrant::NW, Quadrant::NE, Quadrant::SW, Quadrant::SE];

    /// Page-frame corner that carries printed corner index `corner`.
    ///
    /// The printed layout is `2 1 / 3 4`, i.e. NE=1, NW=2, SW=3, SE=4.
    pub fn from_corner_index(corner: u8) -> Option<Quadrant> {
        match corner {
            1 => Some(Quadrant::NE),
            2 => Some(Quadrant::NW),
            3 => Some(Quadrant::SW),
            4 => Some(Quadrant::SE),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quadrant::NW => "NW",
            Quadrant::NE => "NE",
            Quadrant::SW => "SW",
            Quadrant::SE => "SE",
        }
    }
}

impl std::fmt::Display for Quadrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed four-slot map keyed by [`Quadrant`]. Absent corners are `None`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerMap<T> {
    #[serde(rename = "NW", skip_serializing_if = "Option::is_none")]
    pub nw: Option<T>,
    #[serde(rename = "NE", skip_serializing_if = "Option::is_none")]
    pub ne: Option<T>,
    #[serde(rename = "SW", skip_serializing_if = "Option::is_none")]
    pub sw: Option<T>,
    #[serde(rename = "SE", skip_serializing_if = "Option::is_none")]
    pub se: Option<T>,
}

impl<T> Default for CornerMap<T> {
    fn default() -> Self {
        Self {
            nw: None,
            ne: None,
            sw: None,
            se: None,
        }
    }
}

impl<T> CornerMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, q: Quadrant) -> Option<&T> {
        match q {
            Quadrant::NW => self.nw.as_ref(),
            Quadrant::NE => self.ne.as_ref(),
            Quadrant::SW => self.sw.as_ref(),
            Quadrant::SE => self.se.as_ref(),
        }
    }

    #[inline]
    fn slot_mut(&mut self, q: Quadrant) -> &mut Option<T> {
        match q {
            Quadrant::NW => &mut self.nw,
            Quadrant::NE => &mut self.ne,
            Quadrant::SW => &mut self.sw,
            Quadrant::SE => &mut self.se,
        }
    }

    /// Store `value` at `q`, returning the previous occupant.
    pub fn insert(&mut self, q: Quadrant, value: T) -> Option<T> {
        self.slot_mut(q).replace(value)
    }

    pub fn remove(&mut self, q: Quadrant) -> Option<T> {
        self.slot_mut(q).take()
    }

    #[inline]
    pub fn contains(&self, q: Quadrant) -> bool {
        self.get(q).is_some()
    }

    /// Present entries in [`Quadrant::ORDER`].
    pub fn iter(&self) -> impl Iterator<Item = (Quadrant, &T)> + '_ {
        Quadrant::ORDER
            .into_iter()
            .filter_map(move |q| self.get(q).map(|v| (q, v)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First present entry in [`Quadrant::ORDER`].
    pub fn representative(&self) -> Option<(Quadrant, &T)> {
        self.iter().next()
    }

    pub fn map<U>(&self, mut f: impl FnMut(Quadrant, &T) -> U) -> CornerMap<U> {
        let mut out = CornerMap::new();
        for (q, v) in self.iter() {
            out.insert(q, f(q, v));
        }
        out
    }
}

/// Fractional band limits for classifying a centroid.
///
/// Below `low` of the extent is north/west, above `high` is south/east, in
/// between is the ambiguous central band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadrantBands {
    pub low: f32,
    pub high: f32,
}

impl Default for QuadrantBands {
    fn default() -> Self {
        Self {
            low: 0.4,
            high: 0.6,
        }
    }
}

/// Screen quadrant of a centroid in a `width × height` raster.
///
/// Returns `None` when the centroid lies in the central band on either axis.
pub fn classify_quadrant(
    centroid: Point2<f32>,
    width: usize,
    height: usize,
    bands: &QuadrantBands,
) -> Option<Quadrant> {
    let (w, h) = (width as f32, height as f32);

    let north = if centroid.y < bands.low * h {
        true
    } else if centroid.y > bands.high * h {
        false
    } else {
        return None;
    };

    let west = if centroid.x < bands.low * w {
        true
    } else if centroid.x > bands.high * w {
        false
    } else {
        return None;
    };

    Some(match (north, west) {
        (true, true) => Quadrant::NW,
        (true, false) => Quadrant::NE,
        (false, true) => Quadrant::SW,
        (false, false) => Quadrant::SE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroids_map_to_quadrants() {
        let b = QuadrantBands::default();
        let q = |x, y| classify_quadrant(Point2::new(x, y), 1000, 2000, &b);
        assert_eq!(q(100.0, 100.0), Some(Quadrant::NW));
        assert_eq!(q(900.0, 100.0), Some(Quadrant::NE));
        assert_eq!(q(100.0, 1900.0), Some(Quadrant::SW));
        assert_eq!(q(900.0, 1900.0), Some(Quadrant::SE));
    }

    #[test]
    fn central_band_is_absent_on_either_axis() {
        let b = QuadrantBands::default();
        let q = |x, y| classify_quadrant(Point2::new(x, y), 1000, 2000, &b);
        assert_eq!(q(100.0, 1000.0), None);
        assert_eq!(q(500.0, 100.0), None);
        assert_eq!(q(400.0, 100.0), None); // exactly on the boundary
        assert_eq!(q(399.9, 100.0), Some(Quadrant::NW));
    }

    #[test]
    fn corner_map_iterates_in_canonical_order() {
        let mut m = CornerMap::new();
        m.insert(Quadrant::SE, 4);
        m.insert(Quadrant::NE, 1);
        m.insert(Quadrant::SW, 3);
        let order: Vec<_> = m.iter().map(|(q, _)| q).collect();
        assert_eq!(order, vec![Quadrant::NE, Quadrant::SW, Quadrant::SE]);
        assert_eq!(m.representative(), Some((Quadrant::NE, &1)));
        assert_eq!(m.len(), 3);
        assert_eq!(m.remove(Quadrant::NE), Some(1));
        assert!(!m.contains(Quadrant::NE));
    }

    #[test]
    fn corner_map_serializes_only_present_corners() {
        let mut m = CornerMap::new();
        m.insert(Quadrant::NW, 2u8);
        let json = serde_json::to_string(&m).expect("json");
        assert_eq!(json, r#"{"NW":2}"#);
        let back: CornerMap<u8> = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, m);
    }
}
