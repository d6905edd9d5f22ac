//! Commit side of bundle intake.
//!
//! [`CommitEngine::commit_bundle`] moves every staged page of a ready bundle
//! into the authoritative records inside one [`RecordStore`] transaction, then
//! tells the marking and identification services which work became possible.

mod engine;
mod error;
mod readiness;
mod records;
mod store;
mod tasks;

pub use engine::{CommitEngine, CommitOutcome};
pub use error::CommitError;
pub use readiness::{question_readiness, Readiness};
pub use records::{CommittedImage, DiscardRecord, FixedPageBinding, MobilePage, NewImage};
pub use store::{
    MemoryState, MemoryStore, RecordStore, StoreError, StoreRead, StoreTransaction,
};
pub use tasks::{IdentificationTaskService, MarkingTaskService, TaskLedger, TaskSignal};
