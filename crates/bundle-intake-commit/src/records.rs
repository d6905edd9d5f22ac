//! Authoritative records written by a commit.

use bundle_intake_fiducial::{CornerMap, FiducialRecord};
use bundle_intake_staging::{BundleId, ImageId};
use serde::{Deserialize, Serialize};

/// A page image that has left staging.
///
/// Linked to exactly one [`FixedPageBinding`], or one or more
/// [`MobilePage`]s, or one [`DiscardRecord`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommittedImage {
    pub id: ImageId,
    pub bundle_id: BundleId,
    pub position: usize,
    pub original_name: String,
    pub file_ref: String,
    pub hash: String,
    pub rotation: i32,
    #[serde(default)]
    pub fiducials: CornerMap<FiducialRecord>,
}

/// Image fields before the store assigns an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewImage {
    pub bundle_id: BundleId,
    pub position: usize,
    pub original_name: String,
    pub file_ref: String,
    pub hash: String,
    pub rotation: i32,
    pub fiducials: CornerMap<FiducialRecord>,
}

impl NewImage {
    pub fn into_committed(self, id: ImageId) -> CommittedImage {
        CommittedImage {
            id,
            bundle_id: self.bundle_id,
            position: self.position,
            original_name: self.original_name,
            file_ref: self.file_ref,
            hash: self.hash,
            rotation: self.rotation,
            fiducials: self.fiducials,
        }
    }
}

/// A `(paper, page)` slot holding its one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPageBinding {
    pub paper_id: u32,
    pub page_id: u32,
    pub version: u32,
    pub image: ImageId,
}

/// Extra-sheet image attached to a question of a paper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobilePage {
    pub paper_id: u32,
    pub question_id: u32,
    pub image: ImageId,
    pub version: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardRecord {
    pub image: ImageId,
    pub reason: String,
}
