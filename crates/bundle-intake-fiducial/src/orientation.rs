//! Page orientation from the corner indices seen in each screen quadrant.

use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::decoder::FiducialRecord;
use crate::quadrant::{CornerMap, Quadrant};

/// How the scanned page sits relative to its printed upright position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Upright,
    TurnedLeft,
    TurnedRight,
    UpsideDown,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::Upright,
        Orientation::TurnedLeft,
        Orientation::TurnedRight,
        Orientation::UpsideDown,
    ];

    /// Corner index expected in screen quadrant `q` under this hypothesis.
    pub fn expected_corner(self, q: Quadrant) -> u8 {
        use Orientation::*;
        use Quadrant::*;
        match (q, self) {
            (NE, Upright) => 1,
            (NE, TurnedRight) => 2,
            (NE, TurnedLeft) => 4,
            (NE, UpsideDown) => 3,
            (NW, Upright) => 2,
            (NW, TurnedRight) => 3,
            (NW, TurnedLeft) => 1,
            (NW, UpsideDown) => 4,
            (SW, Upright) => 3,
            (SW, TurnedRight) => 4,
            (SW, TurnedLeft) => 2,
            (SW, UpsideDown) => 1,
            (SE, Upright) => 4,
            (SE, TurnedRight) => 1,
            (SE, TurnedLeft) => 3,
            (SE, UpsideDown) => 2,
        }
    }

    /// Counter-clockwise rotation, in degrees, that rights the page.
    pub fn rotation_degrees(self) -> i32 {
        match self {
            Orientation::Upright => 0,
            Orientation::TurnedRight => 90,
            Orientation::TurnedLeft => -90,
            Orientation::UpsideDown => 180,
        }
    }

    /// Hypothesis under which a marker with `corner` sits in quadrant `q`.
    pub fn matching(q: Quadrant, corner: u8) -> Option<Orientation> {
        Self::ALL
            .into_iter()
            .find(|o| o.expected_corner(q) == corner)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrientationError {
    #[error("page orientation is indeterminate ({voters} voting corners)")]
    Indeterminate { voters: usize },
}

/// Infer orientation from the present corners.
///
/// Every corner with a corner index votes; extra-page records do not. All
/// voters must agree.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(corners)))]
pub fn infer_orientation(
    corners: &CornerMap<FiducialRecord>,
) -> Result<Orientation, OrientationError> {
    let mut agreed: Option<Orientation> = None;
    let mut voters = 0usize;

    for (q, record) in corners.iter() {
        let Some(corner) = record.code.corner() else {
            continue;
        };
        voters += 1;
        let Some(vote) = Orientation::matching(q, corner) else {
            return Err(OrientationError::Indeterminate { voters });
        };
        match agreed {
            None => agreed = Some(vote),
            Some(prev) if prev == vote => {}
            Some(prev) => {
                log::debug!("orientation conflict: {prev:?} vs {vote:?} at {q}");
                return Err(OrientationError::Indeterminate { voters });
            }
        }
    }

    agreed.ok_or(OrientationError::Indeterminate { voters })
}

/// Rotation to apply to the page, 0 when orientation cannot be inferred.
pub fn infer_rotation(corners: &CornerMap<FiducialRecord>) -> i32 {
    match infer_orientation(corners) {
        Ok(o) => o.rotation_degrees(),
        Err(err) => {
            log::debug!("{err}; leaving page unrotated");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FiducialCode, PageCode};

    fn record(corner: u8) -> FiducialRecord {
        FiducialRecord {
            raw: String::new(),
            code: FiducialCode::Page(PageCode {
                paper_id: 7,
                page_id: 1,
                version_id: 1,
                corner,
                public_code: "93849".into(),
            }),
            x: 0.0,
            y: 0.0,
        }
    }

    fn scan_for(o: Orientation) -> CornerMap<FiducialRecord> {
        let mut m = CornerMap::new();
        for q in Quadrant::ORDER {
            m.insert(q, record(o.expected_corner(q)));
        }
        m
    }

    #[test]
    fn full_data_recovers_every_orientation() {
        for o in Orientation::ALL {
            assert_eq!(infer_orientation(&scan_for(o)), Ok(o));
        }
    }

    #[test]
    fn up_to_two_missing_corners_still_agree() {
        for o in Orientation::ALL {
            for a in Quadrant::ORDER {
                for b in Quadrant::ORDER {
                    let mut m = scan_for(o);
                    m.remove(a);
                    m.remove(b);
                    assert_eq!(infer_orientation(&m), Ok(o), "{o:?} without {a},{b}");
                }
            }
        }
    }

    #[test]
    fn conflicting_votes_are_indeterminate() {
        let mut m = scan_for(Orientation::Upright);
        // NE carrying index 2 votes TurnedRight
        m.insert(Quadrant::NE, record(2));
        assert!(infer_orientation(&m).is_err());
        assert_eq!(infer_rotation(&m), 0);
    }

    #[test]
    fn no_voters_is_indeterminate() {
        assert_eq!(
            infer_orientation(&CornerMap::new()),
            Err(OrientationError::Indeterminate { voters: 0 })
        );

        let mut extra = CornerMap::new();
        let mut r = record(1);
        r.code = FiducialCode::Extra;
        extra.insert(Quadrant::NW, r);
        assert!(infer_orientation(&extra).is_err());
    }

    #[test]
    fn rotation_degrees_follow_orientation() {
        assert_eq!(infer_rotation(&scan_for(Orientation::Upright)), 0);
        assert_eq!(infer_rotation(&scan_for(Orientation::TurnedRight)), 90);
        assert_eq!(infer_rotation(&scan_for(Orientation::TurnedLeft)), -90);
        assert_eq!(infer_rotation(&scan_for(Orientation::UpsideDown)), 180);
    }
}
