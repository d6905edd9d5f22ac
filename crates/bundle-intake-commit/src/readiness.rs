use serde::{Deserialize, Serialize};

use bundle_intake_staging::SpecificationService;

use crate::store::StoreRead;

/// Whether a `(paper, question)` pair has every page it needs for marking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    NotReady,
    PartiallyReady,
    Ready,
}

/// Readiness of `question_id` on `paper_id` as seen by `view`.
///
/// Questions with fixed pages are ready when all of them are bound. Questions
/// without fixed pages are ready once any extra sheet is attached.
pub fn question_readiness(
    view: &dyn StoreRead,
    spec: &dyn SpecificationService,
    paper_id: u32,
    question_id: u32,
) -> Readiness {
    let pages = spec.question_pages(question_id);
    if pages.is_empty() {
        return if view.mobile_pages(paper_id, question_id).is_empty() {
            Readiness::NotReady
        } else {
            Readiness::Ready
        };
    }

    let bound = pages
        .iter()
        .filter(|&&page| view.fixed_page_image(paper_id, page).is_some())
        .count();
    match bound {
        0 => Readiness::NotReady,
        n if n == pages.len() => Readiness::Ready,
        _ => Readiness::PartiallyReady,
    }
}
