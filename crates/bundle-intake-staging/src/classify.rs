use bundle_intake_fiducial::{CornerMap, FiducialRecord};
use log::debug;

use crate::model::{PageCategory, PageError};
use crate::spec::SpecificationService;
use crate::validation::{validate_fiducials, ValidatedPage};

/// Category of a freshly decoded page.
///
/// `Discard` is never produced here; it is an operator decision.
pub fn classify(payload: &CornerMap<FiducialRecord>, spec: &dyn SpecificationService) -> PageCategory {
    match validate_fiducials(payload, spec) {
        Ok(None) => PageCategory::Unknown,
        Ok(Some(ValidatedPage::Extra)) => PageCategory::Extra { assignment: None },
        Ok(Some(ValidatedPage::Normal(identity))) => PageCategory::Known { identity },
        Err(err) => {
            debug!("page failed validation: {err}");
            PageCategory::Error {
                reason: PageError::Consistency(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DecodedIdentity;
    use crate::spec::tests::sample_spec;
    use crate::validation::tests::payload;
    use crate::validation::ConsistencyError;
    use bundle_intake_fiducial::{CodeField, Quadrant};

    #[test]
    fn categories_follow_validation() {
        let spec = sample_spec();
        assert_eq!(classify(&CornerMap::new(), &spec), PageCategory::Unknown);
        assert_eq!(
            classify(&payload(&[(Quadrant::SE, "plomX")]), &spec),
            PageCategory::Extra { assignment: None }
        );
        assert_eq!(
            classify(&payload(&[(Quadrant::SE, "00008004002493849")]), &spec),
            PageCategory::Known {
                identity: DecodedIdentity {
                    paper_id: 8,
                    page_id: 4,
                    version_id: 2
                }
            }
        );
    }

    #[test]
    fn public_code_disagreement_is_error_page() {
        let spec = sample_spec();
        let p = payload(&[
            (Quadrant::NE, "00007001001193849"),
            (Quadrant::NW, "00007001001222339"),
            (Quadrant::SW, "00007001001393849"),
        ]);
        assert_eq!(
            classify(&p, &spec),
            PageCategory::Error {
                reason: PageError::Consistency(ConsistencyError::InconsistentField {
                    field: CodeField::PublicCode
                })
            }
        );
    }
}
