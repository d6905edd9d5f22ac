use bundle_intake_staging::{BundleId, BundleStatus, ImageId};

use crate::store::StoreError;

/// Reasons a whole-bundle commit is refused. Nothing is written in any case.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("{0} not found")]
    BundleNotFound(BundleId),
    #[error("{0} is already committed")]
    AlreadyCommitted(BundleId),
    #[error("{bundle} is not ready (status {status:?}, {undecoded} page(s) still decoding)")]
    BundleNotReady {
        bundle: BundleId,
        status: BundleStatus,
        undecoded: usize,
    },
    #[error("pages at positions {positions:?} are unknown or in error")]
    PagesUnresolved { positions: Vec<usize> },
    #[error("pages at positions {positions:?} collide with each other")]
    UnresolvedInternalCollision { positions: Vec<usize> },
    #[error("extra pages at positions {positions:?} have no paper/question assignment")]
    ExtraPagesUnassigned { positions: Vec<usize> },
    #[error("position {position}: paper {paper_id} page {page_id} is already bound to {existing}")]
    SlotOccupied {
        position: usize,
        paper_id: u32,
        page_id: u32,
        existing: ImageId,
    },
    #[error("paper {paper_id} has no recorded version for question {question_id}")]
    UnknownQuestionVersion { paper_id: u32, question_id: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}
