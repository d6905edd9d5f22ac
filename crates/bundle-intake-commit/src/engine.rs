//! Whole-bundle commit.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use bundle_intake_staging::{
    find_internal_collisions, BundleId, BundleStatus, ExtraAssignment, ImageId, PageCategory,
    PageError, SpecificationService, StagedPage,
};

use crate::error::CommitError;
use crate::readiness::{question_readiness, Readiness};
use crate::records::{DiscardRecord, FixedPageBinding, MobilePage, NewImage};
use crate::store::{RecordStore, StoreError, StoreTransaction};
use crate::tasks::{IdentificationTaskService, MarkingTaskService};

/// What a successful commit wrote and signalled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub bundle_id: BundleId,
    pub images: Vec<ImageId>,
    pub fixed_bindings: usize,
    pub mobile_pages: usize,
    pub discards: usize,
    /// Readiness after the commit of every pair this bundle touched.
    pub readiness: Vec<((u32, u32), Readiness)>,
    /// Pairs that became ready in this commit.
    pub newly_ready: Vec<(u32, u32)>,
    /// Papers whose identification page was bound in this commit.
    pub id_pages_bound: Vec<u32>,
}

/// Commits ready bundles and notifies the task services.
pub struct CommitEngine<'a> {
    spec: &'a dyn SpecificationService,
    marking: &'a dyn MarkingTaskService,
    identification: &'a dyn IdentificationTaskService,
}

impl<'a> CommitEngine<'a> {
    pub fn new(
        spec: &'a dyn SpecificationService,
        marking: &'a dyn MarkingTaskService,
        identification: &'a dyn IdentificationTaskService,
    ) -> Self {
        Self {
            spec,
            marking,
            identification,
        }
    }

    /// Commit every page of `bundle_id` in one transaction.
    ///
    /// Task signals go out only after the transaction has committed.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, store)))]
    pub fn commit_bundle<S: RecordStore>(
        &self,
        store: &S,
        bundle_id: BundleId,
    ) -> Result<CommitOutcome, CommitError> {
        let outcome = store.transaction(|txn| self.commit_in(txn, bundle_id))?;

        for &(paper_id, question_id) in &outcome.newly_ready {
            debug!("marking task for paper {paper_id} question {question_id}");
            self.marking.create_task(paper_id, question_id);
        }
        for &paper_id in &outcome.id_pages_bound {
            if !self.identification.task_exists(paper_id) {
                debug!("identification task for paper {paper_id}");
                self.identification.create_task(paper_id);
            }
        }

        info!(
            "committed {bundle_id}: {} image(s), {} fixed, {} mobile, {} discarded, {} newly ready",
            outcome.images.len(),
            outcome.fixed_bindings,
            outcome.mobile_pages,
            outcome.discards,
            outcome.newly_ready.len()
        );
        Ok(outcome)
    }

    fn commit_in<T: StoreTransaction>(
        &self,
        txn: &mut T,
        bundle_id: BundleId,
    ) -> Result<CommitOutcome, CommitError> {
        let bundle = txn
            .bundle(bundle_id)
            .ok_or(CommitError::BundleNotFound(bundle_id))?;
        if bundle.status.is_committed() {
            return Err(CommitError::AlreadyCommitted(bundle_id));
        }
        let pages = txn.staged_pages(bundle_id);
        check_preconditions(bundle_id, bundle.status, &pages)?;

        let touched = self.touched_pairs(&pages);
        let before: BTreeMap<(u32, u32), Readiness> = touched
            .iter()
            .map(|&(p, q)| ((p, q), question_readiness(&*txn, self.spec, p, q)))
            .collect();

        let mut outcome = CommitOutcome {
            bundle_id,
            images: Vec::with_capacity(pages.len()),
            fixed_bindings: 0,
            mobile_pages: 0,
            discards: 0,
            readiness: Vec::with_capacity(before.len()),
            newly_ready: Vec::new(),
            id_pages_bound: Vec::new(),
        };
        let id_page = self.spec.id_page();
        let mut id_papers = BTreeSet::new();

        for page in &pages {
            let image = txn.insert_image(NewImage {
                bundle_id,
                position: page.position,
                original_name: format!("{} p{}", bundle.name, page.position + 1),
                file_ref: format!("{}/{:04}", bundle.hash, page.position),
                hash: page.image_hash.clone(),
                rotation: page.rotation,
                fiducials: page.fiducials.clone(),
            });
            outcome.images.push(image);

            match &page.category {
                PageCategory::Known { identity } => {
                    let binding = FixedPageBinding {
                        paper_id: identity.paper_id,
                        page_id: identity.page_id,
                        version: identity.version_id,
                        image,
                    };
                    txn.bind_fixed_page(binding).map_err(|err| match err {
                        StoreError::SlotTaken {
                            paper_id,
                            page_id,
                            image: existing,
                        } => CommitError::SlotOccupied {
                            position: page.position,
                            paper_id,
                            page_id,
                            existing,
                        },
                        other => CommitError::Store(other),
                    })?;
                    outcome.fixed_bindings += 1;
                    if Some(identity.page_id) == id_page {
                        id_papers.insert(identity.paper_id);
                    }
                }
                PageCategory::Extra {
                    assignment: Some(ExtraAssignment {
                        paper_id,
                        question_ids,
                    }),
                } => {
                    for &question_id in question_ids {
                        let version = self
                            .spec
                            .question_version(*paper_id, question_id)
                            .ok_or(CommitError::UnknownQuestionVersion {
                                paper_id: *paper_id,
                                question_id,
                            })?;
                        txn.insert_mobile_page(MobilePage {
                            paper_id: *paper_id,
                            question_id,
                            image,
                            version,
                        })?;
                        outcome.mobile_pages += 1;
                    }
                }
                PageCategory::Discard { reason } => {
                    txn.insert_discard(DiscardRecord {
                        image,
                        reason: reason.clone(),
                    })?;
                    outcome.discards += 1;
                }
                // excluded by the preconditions
                PageCategory::Unknown
                | PageCategory::Error { .. }
                | PageCategory::Extra { assignment: None } => {
                    return Err(CommitError::PagesUnresolved {
                        positions: vec![page.position],
                    });
                }
            }
        }

        txn.set_bundle_status(bundle_id, BundleStatus::Committed)?;

        for (&pair, &was) in &before {
            let now = question_readiness(&*txn, self.spec, pair.0, pair.1);
            if now == Readiness::Ready && was != Readiness::Ready {
                outcome.newly_ready.push(pair);
            }
            outcome.readiness.push((pair, now));
        }
        outcome.id_pages_bound = id_papers.into_iter().collect();
        Ok(outcome)
    }

    /// `(paper, question)` pairs whose pages this bundle contributes.
    fn touched_pairs(&self, pages: &[StagedPage]) -> BTreeSet<(u32, u32)> {
        let mut pairs = BTreeSet::new();
        for page in pages {
            match &page.category {
                PageCategory::Known { identity } => {
                    for q in self.spec.questions_on_page(identity.page_id) {
                        pairs.insert((identity.paper_id, q));
                    }
                }
                PageCategory::Extra {
                    assignment: Some(a),
                } => {
                    for &q in &a.question_ids {
                        pairs.insert((a.paper_id, q));
                    }
                }
                _ => {}
            }
        }
        pairs
    }
}

fn check_preconditions(
    bundle_id: BundleId,
    status: BundleStatus,
    pages: &[StagedPage],
) -> Result<(), CommitError> {
    let undecoded = pages.iter().filter(|p| !p.decoded).count();
    if status != BundleStatus::Ready || undecoded > 0 {
        return Err(CommitError::BundleNotReady {
            bundle: bundle_id,
            status,
            undecoded,
        });
    }

    let mut colliding: Vec<usize> = find_internal_collisions(pages)
        .into_values()
        .flatten()
        .collect();
    colliding.extend(pages.iter().filter_map(|p| match &p.category {
        PageCategory::Error {
            reason: PageError::InternalCollision { .. },
        } => Some(p.position),
        _ => None,
    }));
    if !colliding.is_empty() {
        colliding.sort_unstable();
        colliding.dedup();
        return Err(CommitError::UnresolvedInternalCollision {
            positions: colliding,
        });
    }

    let unresolved: Vec<usize> = pages
        .iter()
        .filter(|p| {
            matches!(
                p.category,
                PageCategory::Unknown | PageCategory::Error { .. }
            )
        })
        .map(|p| p.position)
        .collect();
    if !unresolved.is_empty() {
        return Err(CommitError::PagesUnresolved {
            positions: unresolved,
        });
    }

    let unassigned: Vec<usize> = pages
        .iter()
        .filter(|p| matches!(p.category, PageCategory::Extra { assignment: None }))
        .map(|p| p.position)
        .collect();
    if !unassigned.is_empty() {
        return Err(CommitError::ExtraPagesUnassigned {
            positions: unassigned,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreRead};
    use crate::tasks::{TaskLedger, TaskSignal};
    use bundle_intake_staging::{DecodedIdentity, ExamSpec};

    fn spec() -> ExamSpec {
        ExamSpec::new("93849")
            .with_id_page(1)
            .with_question(1, [2, 3])
            .with_question(2, [4])
            .with_question(3, [])
            .with_uniform_paper(7, 4, 1)
    }

    fn known(paper_id: u32, page_id: u32) -> PageCategory {
        PageCategory::Known {
            identity: DecodedIdentity {
                paper_id,
                page_id,
                version_id: 1,
            },
        }
    }

    /// Stage a ready bundle whose pages have the given categories.
    fn stage(store: &MemoryStore, hash: &str, categories: Vec<PageCategory>) -> BundleId {
        store
            .transaction(|txn| {
                let b = txn.insert_bundle(hash, "scan.pdf", "alice")?;
                for (pos, category) in categories.into_iter().enumerate() {
                    let mut page = StagedPage::rendered(b.id, pos, format!("{hash}-{pos}"));
                    page.category = category;
                    page.decoded = true;
                    txn.put_staged_page(page)?;
                }
                txn.set_bundle_status(b.id, BundleStatus::Ready)?;
                Ok::<_, StoreError>(b.id)
            })
            .expect("stage")
    }

    #[test]
    fn commit_writes_every_page_kind() {
        let spec = spec();
        let ledger = TaskLedger::new();
        let engine = CommitEngine::new(&spec, &ledger, &ledger);
        let store = MemoryStore::new();
        let b = stage(
            &store,
            "b1",
            vec![
                known(7, 1),
                known(7, 4),
                PageCategory::Extra {
                    assignment: Some(ExtraAssignment {
                        paper_id: 7,
                        question_ids: vec![1, 3],
                    }),
                },
                PageCategory::Discard {
                    reason: "blank".into(),
                },
            ],
        );

        let out = engine.commit_bundle(&store, b).expect("commit");
        assert_eq!(out.images.len(), 4);
        assert_eq!((out.fixed_bindings, out.mobile_pages, out.discards), (2, 2, 1));
        assert_eq!(out.newly_ready, vec![(7, 2), (7, 3)]);
        assert_eq!(out.id_pages_bound, vec![7]);
        assert!(out
            .readiness
            .contains(&((7, 1), Readiness::NotReady)));

        let snap = store.snapshot();
        assert_eq!(snap.image_count(), 4);
        assert_eq!(snap.discard_count(), 1);
        assert_eq!(snap.bundle(b).map(|x| x.status), Some(BundleStatus::Committed));
        assert_eq!(
            ledger.signals(),
            vec![
                TaskSignal::Marking {
                    paper_id: 7,
                    question_id: 2
                },
                TaskSignal::Marking {
                    paper_id: 7,
                    question_id: 3
                },
                TaskSignal::Identification { paper_id: 7 },
            ]
        );
    }

    #[test]
    fn second_commit_is_rejected_without_writes() {
        let spec = spec();
        let ledger = TaskLedger::new();
        let engine = CommitEngine::new(&spec, &ledger, &ledger);
        let store = MemoryStore::new();
        let b = stage(&store, "b1", vec![known(7, 2)]);
        engine.commit_bundle(&store, b).expect("first");
        let images = store.snapshot().image_count();

        assert_eq!(
            engine.commit_bundle(&store, b),
            Err(CommitError::AlreadyCommitted(b))
        );
        assert_eq!(store.snapshot().image_count(), images);
    }

    #[test]
    fn readiness_spans_commits() {
        let spec = spec();
        let ledger = TaskLedger::new();
        let engine = CommitEngine::new(&spec, &ledger, &ledger);
        let store = MemoryStore::new();

        let first = stage(&store, "b1", vec![known(7, 2)]);
        let out = engine.commit_bundle(&store, first).expect("first");
        assert_eq!(out.readiness, vec![((7, 1), Readiness::PartiallyReady)]);
        assert!(out.newly_ready.is_empty());

        let second = stage(&store, "b2", vec![known(7, 3)]);
        let out = engine.commit_bundle(&store, second).expect("second");
        assert_eq!(out.newly_ready, vec![(7, 1)]);
        let marking: Vec<_> = ledger
            .signals()
            .into_iter()
            .filter(|s| matches!(s, TaskSignal::Marking { .. }))
            .collect();
        assert_eq!(
            marking,
            vec![TaskSignal::Marking {
                paper_id: 7,
                question_id: 1
            }]
        );
    }

    #[test]
    fn occupied_slot_aborts_whole_commit() {
        let spec = spec();
        let ledger = TaskLedger::new();
        let engine = CommitEngine::new(&spec, &ledger, &ledger);
        let store = MemoryStore::new();

        let a = stage(&store, "a", vec![known(7, 2)]);
        let b = stage(&store, "b", vec![known(7, 4), known(7, 2)]);
        engine.commit_bundle(&store, a).expect("a");
        let before = store.snapshot().image_count();

        let err = engine.commit_bundle(&store, b).expect_err("race");
        assert!(matches!(
            err,
            CommitError::SlotOccupied {
                position: 1,
                paper_id: 7,
                page_id: 2,
                ..
            }
        ));
        let snap = store.snapshot();
        assert_eq!(snap.image_count(), before);
        assert_eq!(snap.fixed_page_image(7, 4), None);
        assert_eq!(snap.bundle(b).map(|x| x.status), Some(BundleStatus::Ready));
    }

    #[test]
    fn preconditions_block_commit() {
        let spec = spec();
        let ledger = TaskLedger::new();
        let engine = CommitEngine::new(&spec, &ledger, &ledger);
        let store = MemoryStore::new();

        let unknown = stage(&store, "u", vec![known(7, 1), PageCategory::Unknown]);
        assert_eq!(
            engine.commit_bundle(&store, unknown),
            Err(CommitError::PagesUnresolved { positions: vec![1] })
        );

        let dup = stage(&store, "d", vec![known(7, 1), known(7, 1)]);
        assert_eq!(
            engine.commit_bundle(&store, dup),
            Err(CommitError::UnresolvedInternalCollision {
                positions: vec![0, 1]
            })
        );

        let extra = stage(&store, "e", vec![PageCategory::Extra { assignment: None }]);
        assert_eq!(
            engine.commit_bundle(&store, extra),
            Err(CommitError::ExtraPagesUnassigned { positions: vec![0] })
        );

        let bad_q = stage(
            &store,
            "q",
            vec![PageCategory::Extra {
                assignment: Some(ExtraAssignment {
                    paper_id: 7,
                    question_ids: vec![9],
                }),
            }],
        );
        assert_eq!(
            engine.commit_bundle(&store, bad_q),
            Err(CommitError::UnknownQuestionVersion {
                paper_id: 7,
                question_id: 9
            })
        );

        assert_eq!(
            engine.commit_bundle(&store, BundleId(999)),
            Err(CommitError::BundleNotFound(BundleId(999)))
        );
        assert_eq!(store.snapshot().image_count(), 0);
        assert!(ledger.signals().is_empty());
    }

    #[test]
    fn bundle_must_be_ready() {
        let spec = spec();
        let ledger = TaskLedger::new();
        let engine = CommitEngine::new(&spec, &ledger, &ledger);
        let store = MemoryStore::new();
        let b = store
            .transaction(|txn| {
                let b = txn.insert_bundle("x", "x.pdf", "alice")?;
                txn.put_staged_page(StagedPage::rendered(b.id, 0, "h"))?;
                txn.set_bundle_status(b.id, BundleStatus::Decoding)?;
                Ok::<_, StoreError>(b.id)
            })
            .expect("stage");
        assert_eq!(
            engine.commit_bundle(&store, b),
            Err(CommitError::BundleNotReady {
                bundle: b,
                status: BundleStatus::Decoding,
                undecoded: 1
            })
        );
    }
}
