//! Corner fiducials of a scanned exam page.
//!
//! Pipeline for one page:
//! 1. a [`SymbolReader`] yields raw symbols (text + outline),
//! 2. [`FiducialDecoder`] decodes each text with [`decode`] and places it in a
//!    screen [`Quadrant`],
//! 3. [`infer_orientation`] votes on how the page is turned,
//! 4. [`rectifying_transform`] and [`extract_region`] map the page onto its
//!    [`PageTemplate`].
//!
//! ## Quickstart
//!
//! ```
//! use bundle_intake_fiducial::{FiducialDecoder, RawSymbol};
//! use nalgebra::Point2;
//!
//! let sym = |x: f32, y: f32, text: &str| RawSymbol {
//!     text: text.into(),
//!     polygon: vec![Point2::new(x, y)],
//! };
//! let scan = FiducialDecoder::default().decode_symbols(
//!     1546,
//!     2000,
//!     &[
//!         sym(1419.5, 139.5, "00007001001193849"),
//!         sym(126.5, 139.5, "00007001001293849"),
//!     ],
//! );
//! assert_eq!(scan.rotation(), 0);
//! ```

mod codec;
mod decoder;
mod orientation;
mod quadrant;
mod rectify;
mod template;

pub use codec::{
    decode, encode, CodeField, DecodeError, EncodeError, FiducialCode, PageCode,
    CORNER_WIDTH, EXTRA_PAGE_SENTINEL, PAGE_CODE_LEN, PAGE_ID_WIDTH, PAPER_ID_WIDTH,
    PUBLIC_CODE_WIDTH, VERSION_ID_WIDTH,
};
pub use decoder::{
    FiducialDecoder, FiducialRecord, FiducialScan, RawSymbol, RejectedSymbol, SymbolReader,
};
pub use orientation::{infer_orientation, infer_rotation, Orientation, OrientationError};
pub use quadrant::{classify_quadrant, CornerMap, Quadrant, QuadrantBands};
pub use rectify::{extract_region, rectify_page, rectifying_transform, RegionFractions};
pub use template::PageTemplate;
