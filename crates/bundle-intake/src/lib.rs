//! High-level facade for the `bundle-intake-*` workspace.
//!
//! Scanned exam bundles go through these steps:
//! upload, render to page rasters, decode the corner fiducials of each page,
//! classify the page, let an operator fix what is left, then commit the
//! whole bundle in one transaction.
//!
//! ## Quickstart
//!
//! ```
//! use std::sync::Arc;
//! use bundle_intake::{IntakeConfig, IntakeService, MemoryStore, TaskLedger};
//! use bundle_intake::staging::ExamSpec;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = ExamSpec::new("93849").with_uniform_paper(7, 4, 1);
//! let ledger = Arc::new(TaskLedger::new());
//! let service = IntakeService::new(
//!     MemoryStore::new(),
//!     Arc::new(spec),
//!     ledger.clone(),
//!     ledger,
//!     &IntakeConfig::default(),
//! );
//!
//! let bundle = service.upload_bundle(b"%PDF-1.7 ...", "scan.pdf", "alice")?;
//! service.stage_page_hashes(bundle.id, &["page-0".to_string()])?;
//! service.process_symbols(bundle.id, 0, 1546, 2000, &[])?;
//! assert!(service.bundle_progress(bundle.id)?.is_ready());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `bundle_intake::core`: rasters, affine warps, hashing, logging.
//! - `bundle_intake::fiducial`: fiducial codec, orientation and rectification.
//! - `bundle_intake::staging`: staged pages, validation, classification, collisions.
//! - `bundle_intake::commit`: record store, commit engine, readiness and task signals.
//! - [`IntakeService`]: the bundle lifecycle on top of a [`RecordStore`].

pub use bundle_intake_commit as commit;
pub use bundle_intake_core as core;
pub use bundle_intake_fiducial as fiducial;
pub use bundle_intake_staging as staging;

pub use bundle_intake_commit::{
    CommitError, CommitOutcome, MemoryStore, Readiness, RecordStore, TaskLedger, TaskSignal,
};
pub use bundle_intake_core::{init_with_level, GrayImage};
pub use bundle_intake_fiducial::{
    FiducialDecoder, FiducialScan, PageTemplate, RawSymbol, RegionFractions, SymbolReader,
};
pub use bundle_intake_staging::{
    Bundle, BundleId, BundleStatus, ExamSpec, PageCategory, SpecificationService, StagedPage,
};

#[cfg(feature = "tracing")]
pub use bundle_intake_core::init_tracing;

mod config;
mod error;
mod ingest;
mod queue;
mod render;

pub use config::{IntakeConfig, IntakeIoError, SymbolSidecar};
pub use error::IntakeError;
pub use ingest::{BundleProgress, IntakeService, PageJob};
pub use queue::{InlineQueue, JobHandle, JobStatus, PageTask, RayonQueue, WorkQueue};
pub use render::{PageRenderer, RasterPages, RenderError};

#[cfg(feature = "image")]
pub use render::{gray_view, load_gray, save_gray, ImageFileRenderer};
