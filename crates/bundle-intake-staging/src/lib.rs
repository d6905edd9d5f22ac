//! Staging side of bundle intake: what each scanned page claims to be.
//!
//! - [`validate_fiducials`] checks that a page's corners agree with each other
//!   and with the assessment ([`SpecificationService`]),
//! - [`classify`] turns that verdict into a [`PageCategory`],
//! - [`apply_internal_collisions`] and [`find_external_collisions`] look for
//!   pages that claim the same slot.

mod classify;
mod collision;
mod model;
mod spec;
mod validation;

pub use classify::classify;
pub use collision::{
    apply_internal_collisions, find_external_collisions, find_internal_collisions,
    release_collisions, ExternalCollision, SlotOccupancy,
};
pub use model::{
    Bundle, BundleId, BundleStatus, DecodedIdentity, ExtraAssignment, ImageId, PageCategory,
    PageError, StagedPage,
};
pub use spec::{ExamSpec, PaperVersions, SpecIoError, SpecificationService};
pub use validation::{validate_fiducials, ConsistencyError, ValidatedPage};
