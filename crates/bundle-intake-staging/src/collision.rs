//! Duplicate-identity detection within a bundle and against committed slots.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::model::{DecodedIdentity, ImageId, PageCategory, PageError, StagedPage};

/// Lookup of already-committed fixed-page slots.
pub trait SlotOccupancy {
    fn occupant(&self, paper_id: u32, page_id: u32) -> Option<ImageId>;
}

/// A staged page whose slot is already bound to a committed image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCollision {
    pub position: usize,
    pub existing_image: ImageId,
    pub paper_id: u32,
    pub page_id: u32,
}

/// Positions of `Known` pages grouped by identity, only groups of two or more.
pub fn find_internal_collisions(pages: &[StagedPage]) -> BTreeMap<DecodedIdentity, Vec<usize>> {
    let mut groups: BTreeMap<DecodedIdentity, Vec<usize>> = BTreeMap::new();
    for page in pages {
        if let Some(identity) = page.identity() {
            groups.entry(*identity).or_default().push(page.position);
        }
    }
    groups.retain(|_, positions| positions.len() > 1);
    groups
}

/// Return every collision-flagged page to `Known` under its own identity.
fn clear_collision_flags(pages: &mut [StagedPage]) -> usize {
    let mut cleared = 0;
    for page in pages.iter_mut() {
        if let PageCategory::Error {
            reason: PageError::InternalCollision { identity, .. },
        } = &page.category
        {
            page.category = PageCategory::Known {
                identity: *identity,
            };
            cleared += 1;
        }
    }
    cleared
}

/// Re-derive internal collisions from scratch.
///
/// Earlier collision flags are cleared first, so a page that was re-decoded
/// or whose siblings changed category is judged against the current bundle
/// only. Every member of a remaining group is reclassified as `Error`.
///
/// Returns the number of pages flagged.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn apply_internal_collisions(pages: &mut [StagedPage]) -> usize {
    let cleared = clear_collision_flags(pages);
    let groups = find_internal_collisions(pages);
    if groups.is_empty() {
        if cleared > 0 {
            debug!("{cleared} stale collision flag(s) cleared");
        }
        return 0;
    }

    let mut flagged = 0;
    for page in pages.iter_mut() {
        let Some(identity) = page.identity().copied() else {
            continue;
        };
        let Some(positions) = groups.get(&identity) else {
            continue;
        };
        let siblings = positions
            .iter()
            .copied()
            .filter(|&p| p != page.position)
            .collect();
        page.category = PageCategory::Error {
            reason: PageError::InternalCollision { identity, siblings },
        };
        flagged += 1;
    }
    info!(
        "{} identities collide inside the bundle; {flagged} page(s) flagged",
        groups.len()
    );
    flagged
}

/// Re-derive collisions after an operator change, e.g. a discarded duplicate.
///
/// Returns the number of previously flagged pages now back to `Known`.
pub fn release_collisions(pages: &mut [StagedPage]) -> usize {
    let was_flagged: Vec<usize> = pages
        .iter()
        .filter(|p| {
            matches!(
                p.category,
                PageCategory::Error {
                    reason: PageError::InternalCollision { .. }
                }
            )
        })
        .map(|p| p.position)
        .collect();

    apply_internal_collisions(pages);

    let mut released = 0;
    for page in pages.iter().filter(|p| was_flagged.contains(&p.position)) {
        if let Some(identity) = page.identity() {
            debug!("position {} is the last page for {identity}; back to known", page.position);
            released += 1;
        }
    }
    released
}

/// Report `Known` pages whose slot is already taken by a committed image.
///
/// Pages are not reclassified.
pub fn find_external_collisions(
    pages: &[StagedPage],
    slots: &dyn SlotOccupancy,
) -> Vec<ExternalCollision> {
    let mut out = Vec::new();
    for page in pages {
        let Some(identity) = page.identity() else {
            continue;
        };
        if let Some(existing) = slots.occupant(identity.paper_id, identity.page_id) {
            warn!(
                "position {} ({identity}) collides with committed {existing}",
                page.position
            );
            out.push(ExternalCollision {
                position: page.position,
                existing_image: existing,
                paper_id: identity.paper_id,
                page_id: identity.page_id,
            });
        }
    }
    out
}

impl<F> SlotOccupancy for F
where
    F: Fn(u32, u32) -> Option<ImageId>,
{
    fn occupant(&self, paper_id: u32, page_id: u32) -> Option<ImageId> {
        self(paper_id, page_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BundleId;

    fn known(position: usize, paper_id: u32, page_id: u32) -> StagedPage {
        let mut p = StagedPage::rendered(BundleId(1), position, format!("h{position}"));
        p.category = PageCategory::Known {
            identity: DecodedIdentity {
                paper_id,
                page_id,
                version_id: 1,
            },
        };
        p.decoded = true;
        p
    }

    fn extra(position: usize) -> StagedPage {
        let mut p = StagedPage::rendered(BundleId(1), position, format!("h{position}"));
        p.category = PageCategory::Extra { assignment: None };
        p
    }

    #[test]
    fn duplicate_identity_flags_both_pages() {
        let mut pages = vec![known(0, 7, 1), known(1, 7, 2), known(2, 7, 1), extra(3), extra(4)];
        assert_eq!(apply_internal_collisions(&mut pages), 2);

        match &pages[0].category {
            PageCategory::Error {
                reason: PageError::InternalCollision { siblings, .. },
            } => assert_eq!(siblings, &vec![2]),
            other => panic!("unexpected {other:?}"),
        }
        match &pages[2].category {
            PageCategory::Error {
                reason: PageError::InternalCollision { siblings, .. },
            } => assert_eq!(siblings, &vec![0]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(pages[1].identity().is_some());
        assert_eq!(pages[3].category.name(), "extra");
    }

    #[test]
    fn triple_collision_lists_all_siblings() {
        let pages = vec![known(0, 3, 3), known(5, 3, 3), known(9, 3, 3)];
        let groups = find_internal_collisions(&pages);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.values().next(), Some(&vec![0, 5, 9]));
    }

    #[test]
    fn discarding_a_duplicate_releases_its_sibling() {
        let mut pages = vec![known(0, 7, 1), known(1, 7, 1), known(2, 7, 1)];
        apply_internal_collisions(&mut pages);

        pages[1].category = PageCategory::Discard {
            reason: "duplicate".into(),
        };
        assert_eq!(release_collisions(&mut pages), 0);
        match &pages[0].category {
            PageCategory::Error {
                reason: PageError::InternalCollision { siblings, .. },
            } => assert_eq!(siblings, &vec![2]),
            other => panic!("unexpected {other:?}"),
        }

        pages[2].category = PageCategory::Discard {
            reason: "duplicate".into(),
        };
        assert_eq!(release_collisions(&mut pages), 1);
        assert_eq!(pages[0].identity().map(|i| i.page_id), Some(1));
    }

    #[test]
    fn external_collisions_are_reported_not_reclassified() {
        let pages = vec![known(0, 7, 1), known(1, 7, 2), extra(2)];
        let taken = |paper: u32, page: u32| (paper == 7 && page == 2).then_some(ImageId(42));
        let hits = find_external_collisions(&pages, &taken);
        assert_eq!(
            hits,
            vec![ExternalCollision {
                position: 1,
                existing_image: ImageId(42),
                paper_id: 7,
                page_id: 2
            }]
        );
        assert!(pages[1].identity().is_some());
    }

    #[test]
    fn redecoded_page_is_judged_against_the_current_bundle() {
        let mut pages = vec![known(0, 7, 1), known(1, 7, 1), known(2, 7, 2)];
        assert_eq!(apply_internal_collisions(&mut pages), 2);

        // position 0 decoded again with the same identity
        pages[0] = known(0, 7, 1);
        assert_eq!(apply_internal_collisions(&mut pages), 2);
        assert_eq!(pages[0].category.name(), "error");
        assert_eq!(pages[1].category.name(), "error");

        pages[2].category = PageCategory::Discard {
            reason: "blank".into(),
        };
        assert_eq!(release_collisions(&mut pages), 0);
        assert!(pages[0].identity().is_none());
        assert!(pages[1].identity().is_none());

        // position 0 turns out to be page 3
        pages[0] = known(0, 7, 3);
        assert_eq!(apply_internal_collisions(&mut pages), 0);
        assert_eq!(pages[1].identity().map(|i| i.page_id), Some(1));
        assert!(pages[1].error_reason().is_none());
    }
}
