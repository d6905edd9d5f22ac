//! Staged bundle and page records.

use std::fmt;

use bundle_intake_fiducial::{CornerMap, FiducialRecord, PageCode};
use serde::{Deserialize, Serialize};

use crate::validation::ConsistencyError;

/// Store-assigned bundle key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(pub u64);

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bundle#{}", self.0)
    }
}

/// Store-assigned key of a committed image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    Uploading,
    Rendering,
    Decoding,
    Ready,
    Committed,
}

impl BundleStatus {
    #[inline]
    pub fn is_committed(self) -> bool {
        self == BundleStatus::Committed
    }
}

/// One uploaded document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    /// SHA-256 of the uploaded bytes; unique across bundles.
    pub hash: String,
    pub name: String,
    pub owner: String,
    pub status: BundleStatus,
    #[serde(default)]
    pub page_count: usize,
}

/// Identity a validated page claims.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecodedIdentity {
    pub paper_id: u32,
    pub page_id: u32,
    pub version_id: u32,
}

impl From<&PageCode> for DecodedIdentity {
    fn from(code: &PageCode) -> Self {
        Self {
            paper_id: code.paper_id,
            page_id: code.page_id,
            version_id: code.version_id,
        }
    }
}

impl fmt::Display for DecodedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "paper {} page {} version {}",
            self.paper_id, self.page_id, self.version_id
        )
    }
}

/// Operator-chosen destination of an extra sheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraAssignment {
    pub paper_id: u32,
    pub question_ids: Vec<u32>,
}

/// Why a page is in the `Error` category.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageError {
    #[error(transparent)]
    Consistency(ConsistencyError),
    #[error("{identity} also appears at bundle position(s) {siblings:?}")]
    InternalCollision {
        identity: DecodedIdentity,
        siblings: Vec<usize>,
    },
}

/// Classification of a staged page. Exactly one applies at any time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum PageCategory {
    /// No fiducials found.
    Unknown,
    Known { identity: DecodedIdentity },
    Extra {
        #[serde(default)]
        assignment: Option<ExtraAssignment>,
    },
    Error { reason: PageError },
    Discard { reason: String },
}

impl PageCategory {
    pub fn name(&self) -> &'static str {
        match self {
            PageCategory::Unknown => "unknown",
            PageCategory::Known { .. } => "known",
            PageCategory::Extra { .. } => "extra",
            PageCategory::Error { .. } => "error",
            PageCategory::Discard { .. } => "discard",
        }
    }

    #[inline]
    pub fn identity(&self) -> Option<&DecodedIdentity> {
        match self {
            PageCategory::Known { identity } => Some(identity),
            _ => None,
        }
    }
}

/// One rasterized page awaiting commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagedPage {
    pub bundle_id: BundleId,
    /// Zero-based position within the bundle.
    pub position: usize,
    pub image_hash: String,
    /// Counter-clockwise correction in degrees.
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub fiducials: CornerMap<FiducialRecord>,
    pub category: PageCategory,
    /// Set once fiducial processing has finished for this page.
    #[serde(default)]
    pub decoded: bool,
}

impl StagedPage {
    /// A freshly rendered page that has not been decoded yet.
    pub fn rendered(bundle_id: BundleId, position: usize, image_hash: impl Into<String>) -> Self {
        Self {
            bundle_id,
            position,
            image_hash: image_hash.into(),
            rotation: 0,
            fiducials: CornerMap::new(),
            category: PageCategory::Unknown,
            decoded: false,
        }
    }

    pub fn identity(&self) -> Option<&DecodedIdentity> {
        self.category.identity()
    }

    /// Text of the error reason, if the page is in the `Error` category.
    pub fn error_reason(&self) -> Option<String> {
        match &self.category {
            PageCategory::Error { reason } => Some(reason.to_string()),
            _ => None,
        }
    }
}
