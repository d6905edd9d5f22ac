//! Cross-corner consistency checks of a page's fiducial payload.

use bundle_intake_fiducial::{CodeField, CornerMap, FiducialRecord, PageCode};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::model::DecodedIdentity;
use crate::spec::SpecificationService;

/// Page type agreed by all corners.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatedPage {
    Normal(DecodedIdentity),
    Extra,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyError {
    #[error("inconsistent page type, check for folded page")]
    InconsistentPageType,
    #[error("inconsistent {field}, check for folded page or cross-assessment contamination")]
    InconsistentField { field: CodeField },
    #[error("wrong assessment: public code {found} does not match this assessment's code {expected}")]
    WrongAssessment { expected: String, found: String },
    #[error("unknown paper/page: paper {paper_id} page {page_id} does not exist in this assessment")]
    UnknownPaperOrPage { paper_id: u32, page_id: u32 },
    #[error("version mismatch: paper {paper_id} page {page_id} is version {expected}, fiducials say {found}")]
    VersionMismatch {
        paper_id: u32,
        page_id: u32,
        expected: u32,
        found: u32,
    },
}

/// Fields compared across corners, in check order.
const AGREEMENT_ORDER: [CodeField; 4] = [
    CodeField::PublicCode,
    CodeField::PaperId,
    CodeField::PageId,
    CodeField::VersionId,
];

fn field_agrees(a: &PageCode, b: &PageCode, field: CodeField) -> bool {
    match field {
        CodeField::PublicCode => a.public_code == b.public_code,
        CodeField::PaperId => a.paper_id == b.paper_id,
        CodeField::PageId => a.page_id == b.page_id,
        CodeField::VersionId => a.version_id == b.version_id,
        CodeField::Corner => true,
    }
}

/// Validate the corners of one page.
///
/// `Ok(None)` means the page has no fiducials at all. Checks run in a fixed
/// order and stop at the first failure.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn validate_fiducials(
    payload: &CornerMap<FiducialRecord>,
    spec: &dyn SpecificationService,
) -> Result<Option<ValidatedPage>, ConsistencyError> {
    let Some((_, first)) = payload.representative() else {
        return Ok(None);
    };

    let extra = first.code.is_extra();
    if payload.iter().any(|(_, r)| r.code.is_extra() != extra) {
        return Err(ConsistencyError::InconsistentPageType);
    }
    if extra {
        return Ok(Some(ValidatedPage::Extra));
    }

    let codes: Vec<&PageCode> = payload
        .iter()
        .filter_map(|(_, r)| r.code.as_page())
        .collect();
    let Some(&rep) = codes.first() else {
        return Ok(None);
    };
    for field in AGREEMENT_ORDER {
        if codes.iter().any(|c| !field_agrees(rep, c, field)) {
            return Err(ConsistencyError::InconsistentField { field });
        }
    }

    if rep.public_code != spec.public_code() {
        return Err(ConsistencyError::WrongAssessment {
            expected: spec.public_code().to_string(),
            found: rep.public_code.clone(),
        });
    }

    let Some(expected) = spec.page_version(rep.paper_id, rep.page_id) else {
        return Err(ConsistencyError::UnknownPaperOrPage {
            paper_id: rep.paper_id,
            page_id: rep.page_id,
        });
    };
    if expected != rep.version_id {
        return Err(ConsistencyError::VersionMismatch {
            paper_id: rep.paper_id,
            page_id: rep.page_id,
            expected,
            found: rep.version_id,
        });
    }

    Ok(Some(ValidatedPage::Normal(DecodedIdentity::from(rep))))
}
