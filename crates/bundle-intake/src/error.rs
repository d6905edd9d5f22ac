use bundle_intake_commit::{CommitError, StoreError};
use bundle_intake_staging::BundleId;

use crate::render::RenderError;

/// Errors produced by [`IntakeService`](crate::IntakeService).
#[derive(thiserror::Error, Debug)]
pub enum IntakeError {
    #[error("bundle content {hash} was already uploaded as {existing}")]
    DuplicateBundle { hash: String, existing: BundleId },
    #[error("{0} not found")]
    BundleNotFound(BundleId),
    #[error("{0} is committed")]
    BundleCommitted(BundleId),
    #[error("{0} has no pages")]
    EmptyBundle(BundleId),
    #[error("{bundle} has no page at position {position}")]
    PageNotFound { bundle: BundleId, position: usize },
    #[error("page at position {position} is {category}, not an extra page")]
    NotAnExtraPage {
        position: usize,
        category: &'static str,
    },
    #[error("page at position {position} is {category}; only error and unknown pages can be replaced")]
    NotReplaceable {
        position: usize,
        category: &'static str,
    },
    #[error("extra page at position {position} must be assigned to at least one question")]
    EmptyAssignment { position: usize },
    #[error("paper {paper_id} has no question {question_id}")]
    UnknownQuestion { paper_id: u32, question_id: u32 },
    #[error("job result was already taken")]
    ResultTaken,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for IntakeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateBundleHash { hash, existing } => {
                IntakeError::DuplicateBundle { hash, existing }
            }
            StoreError::BundleNotFound(id) => IntakeError::BundleNotFound(id),
            StoreError::BundleCommitted(id) => IntakeError::BundleCommitted(id),
            other => IntakeError::Store(other),
        }
    }
}
