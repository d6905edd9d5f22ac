//! Bundle lifecycle: upload, render, decode, operator fixes and commit.

use std::sync::Arc;

use bundle_intake_commit::{
    CommitEngine, CommitOutcome, IdentificationTaskService, MarkingTaskService, RecordStore,
    StoreRead, StoreTransaction,
};
use bundle_intake_core::{raster_hash, sha256_hex, GrayImage};
use bundle_intake_fiducial::{
    extract_region, FiducialDecoder, FiducialScan, PageTemplate, RawSymbol, RegionFractions,
    SymbolReader,
};
use bundle_intake_staging::{
    apply_internal_collisions, classify, find_external_collisions, release_collisions, Bundle,
    BundleId, BundleStatus, ExternalCollision, ExtraAssignment, PageCategory, SpecificationService,
    StagedPage,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::queue::{JobHandle, WorkQueue};
use crate::render::{PageRenderer, RenderError};

/// A rendered page waiting for fiducial decoding.
#[derive(Clone, Debug, PartialEq)]
pub struct PageJob {
    pub bundle_id: BundleId,
    pub position: usize,
    pub image: GrayImage,
}

/// Decoding progress of one bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleProgress {
    pub total: usize,
    pub decoded: usize,
    pub status: BundleStatus,
    /// Pages flagged as internal collisions when the bundle became ready.
    pub collisions_flagged: usize,
}

impl BundleProgress {
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.status, BundleStatus::Ready | BundleStatus::Committed)
    }
}

/// Entry point tying the staging and commit crates to a record store.
pub struct IntakeService<S: RecordStore> {
    store: S,
    spec: Arc<dyn SpecificationService>,
    marking: Arc<dyn MarkingTaskService>,
    identification: Arc<dyn IdentificationTaskService>,
    decoder: FiducialDecoder,
    template: PageTemplate,
}

impl<S: RecordStore> IntakeService<S> {
    pub fn new(
        store: S,
        spec: Arc<dyn SpecificationService>,
        marking: Arc<dyn MarkingTaskService>,
        identification: Arc<dyn IdentificationTaskService>,
        config: &IntakeConfig,
    ) -> Self {
        Self {
            store,
            spec,
            marking,
            identification,
            decoder: config.decoder(),
            template: config.template,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn spec(&self) -> &dyn SpecificationService {
        self.spec.as_ref()
    }

    pub fn bundle(&self, bundle_id: BundleId) -> Result<Bundle, IntakeError> {
        self.store
            .read(|s| s.bundle(bundle_id))
            .ok_or(IntakeError::BundleNotFound(bundle_id))
    }

    pub fn staged_pages(&self, bundle_id: BundleId) -> Vec<StagedPage> {
        self.store.read(|s| s.staged_pages(bundle_id))
    }

    /// Register an uploaded document. Identical content is rejected.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, bytes), fields(len = bytes.len())))]
    pub fn upload_bundle(&self, bytes: &[u8], name: &str, owner: &str) -> Result<Bundle, IntakeError> {
        let hash = sha256_hex(bytes);
        let bundle = self
            .store
            .transaction(|txn| txn.insert_bundle(&hash, name, owner))?;
        info!("uploaded {} ({name}, {} bytes)", bundle.id, bytes.len());
        Ok(bundle)
    }

    /// Render every page and stage it as undecoded.
    ///
    /// Returns one job per page for [`process_page`](Self::process_page).
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, renderer)))]
    pub fn stage_bundle(
        &self,
        bundle_id: BundleId,
        renderer: &dyn PageRenderer,
    ) -> Result<Vec<PageJob>, IntakeError> {
        let previous = self.begin_rendering(bundle_id)?;

        let jobs = match render_jobs(bundle_id, renderer) {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!("{bundle_id}: rendering failed, back to {previous:?}: {err}");
                self.store
                    .transaction(|txn| txn.set_bundle_status(bundle_id, previous))?;
                return Err(err.into());
            }
        };
        let hashes: Vec<String> = jobs.iter().map(|j| raster_hash(&j.image)).collect();
        self.stage_page_hashes(bundle_id, &hashes)?;
        Ok(jobs)
    }

    /// Stage pages rendered elsewhere, one per content hash.
    pub fn stage_page_hashes(&self, bundle_id: BundleId, hashes: &[String]) -> Result<(), IntakeError> {
        if hashes.is_empty() {
            return Err(IntakeError::EmptyBundle(bundle_id));
        }
        self.store.transaction(|txn| -> Result<(), IntakeError> {
            let bundle = txn
                .bundle(bundle_id)
                .ok_or(IntakeError::BundleNotFound(bundle_id))?;
            if bundle.status.is_committed() {
                return Err(IntakeError::BundleCommitted(bundle_id));
            }
            let stale = txn.clear_staged_pages(bundle_id)?;
            if stale > 0 {
                debug!("{bundle_id}: dropped {stale} previously staged page(s)");
            }
            for (position, hash) in hashes.iter().enumerate() {
                txn.put_staged_page(StagedPage::rendered(bundle_id, position, hash.clone()))?;
            }
            txn.set_page_count(bundle_id, hashes.len())?;
            txn.set_bundle_status(bundle_id, BundleStatus::Decoding)?;
            Ok(())
        })?;
        info!("{bundle_id}: staged {} page(s)", hashes.len());
        Ok(())
    }

    /// Returns the status the bundle had before.
    fn begin_rendering(&self, bundle_id: BundleId) -> Result<BundleStatus, IntakeError> {
        self.store.transaction(|txn| -> Result<BundleStatus, IntakeError> {
            let bundle = txn
                .bundle(bundle_id)
                .ok_or(IntakeError::BundleNotFound(bundle_id))?;
            txn.set_bundle_status(bundle_id, BundleStatus::Rendering)?;
            Ok(bundle.status)
        })
    }

    /// Decode, classify and persist one page. Re-running overwrites the page.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, job, reader), fields(bundle = job.bundle_id.0, position = job.position))
    )]
    pub fn process_page(&self, job: &PageJob, reader: &dyn SymbolReader) -> Result<StagedPage, IntakeError> {
        let scan = self.decoder.decode_image(&job.image.view(), reader);
        self.record_scan(job.bundle_id, job.position, &scan)
    }

    /// Same as [`process_page`](Self::process_page) for symbols read elsewhere.
    pub fn process_symbols(
        &self,
        bundle_id: BundleId,
        position: usize,
        width: usize,
        height: usize,
        symbols: &[RawSymbol],
    ) -> Result<StagedPage, IntakeError> {
        let scan = self.decoder.decode_symbols(width, height, symbols);
        self.record_scan(bundle_id, position, &scan)
    }

    fn record_scan(
        &self,
        bundle_id: BundleId,
        position: usize,
        scan: &FiducialScan,
    ) -> Result<StagedPage, IntakeError> {
        let category = classify(&scan.corners, self.spec.as_ref());
        let rotation = scan.rotation();
        debug!(
            "{bundle_id} position {position}: {} corner(s), rotation {rotation}, {}",
            scan.corners.len(),
            category.name()
        );

        self.store.transaction(|txn| -> Result<StagedPage, IntakeError> {
            let mut page = txn
                .staged_page(bundle_id, position)
                .ok_or(IntakeError::PageNotFound {
                    bundle: bundle_id,
                    position,
                })?;
            page.fiducials = scan.corners.clone();
            page.rotation = rotation;
            page.category = category;
            page.decoded = true;
            txn.put_staged_page(page.clone())?;

            // collisions are recomputed when the bundle becomes ready again
            if txn.bundle(bundle_id).map(|b| b.status) == Some(BundleStatus::Ready) {
                txn.set_bundle_status(bundle_id, BundleStatus::Decoding)?;
            }
            Ok(page)
        })
    }

    /// Process every job on the rayon pool. Results keep job order.
    pub fn process_all(
        &self,
        jobs: &[PageJob],
        reader: &(dyn SymbolReader + Sync),
    ) -> Vec<Result<StagedPage, IntakeError>> {
        jobs.par_iter()
            .map(|job| self.process_page(job, reader))
            .collect()
    }

    /// Poll decoding progress.
    ///
    /// Once every page is decoded the bundle is promoted to `ready` and
    /// internal collisions are written back to the affected pages.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn bundle_progress(&self, bundle_id: BundleId) -> Result<BundleProgress, IntakeError> {
        self.store.transaction(|txn| -> Result<BundleProgress, IntakeError> {
            let bundle = txn
                .bundle(bundle_id)
                .ok_or(IntakeError::BundleNotFound(bundle_id))?;
            let mut pages = txn.staged_pages(bundle_id);
            let total = pages.len();
            let decoded = pages.iter().filter(|p| p.decoded).count();
            let mut progress = BundleProgress {
                total,
                decoded,
                status: bundle.status,
                collisions_flagged: 0,
            };

            if bundle.status == BundleStatus::Decoding && total > 0 && decoded == total {
                let before: Vec<PageCategory> =
                    pages.iter().map(|p| p.category.clone()).collect();
                let flagged = apply_internal_collisions(&mut pages);
                for (page, old) in pages.into_iter().zip(before) {
                    if page.category != old {
                        txn.put_staged_page(page)?;
                    }
                }
                txn.set_bundle_status(bundle_id, BundleStatus::Ready)?;
                info!("{bundle_id} ready: {total} page(s), {flagged} collision page(s)");
                progress.status = BundleStatus::Ready;
                progress.collisions_flagged = flagged;
            }
            Ok(progress)
        })
    }

    /// Known pages whose slot is already bound to a committed image.
    pub fn external_collisions(&self, bundle_id: BundleId) -> Result<Vec<ExternalCollision>, IntakeError> {
        self.store.read(|s| -> Result<Vec<ExternalCollision>, IntakeError> {
            s.bundle(bundle_id)
                .ok_or(IntakeError::BundleNotFound(bundle_id))?;
            let pages = s.staged_pages(bundle_id);
            let slots = |paper_id: u32, page_id: u32| s.fixed_page_image(paper_id, page_id);
            Ok(find_external_collisions(&pages, &slots))
        })
    }

    /// Operator action: mark a page as not to be kept.
    pub fn discard_page(
        &self,
        bundle_id: BundleId,
        position: usize,
        reason: &str,
    ) -> Result<(), IntakeError> {
        self.store.transaction(|txn| -> Result<(), IntakeError> {
            let mut pages = txn.staged_pages(bundle_id);
            let page = pages
                .iter_mut()
                .find(|p| p.position == position)
                .ok_or(IntakeError::PageNotFound {
                    bundle: bundle_id,
                    position,
                })?;
            page.category = PageCategory::Discard {
                reason: reason.to_string(),
            };
            let released = release_collisions(&mut pages);
            if released > 0 {
                debug!("{bundle_id}: discarding {position} released {released} page(s)");
            }
            for page in pages {
                txn.put_staged_page(page)?;
            }
            Ok(())
        })?;
        info!("{bundle_id}: discarded position {position} ({reason})");
        Ok(())
    }

    /// Operator action: swap in a rescan for an `error` or `unknown` page.
    ///
    /// The page is reset to undecoded under the new content hash and its
    /// collision siblings are re-derived. Returns the job to decode it with.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, image)))]
    pub fn replace_page(
        &self,
        bundle_id: BundleId,
        position: usize,
        image: GrayImage,
    ) -> Result<PageJob, IntakeError> {
        let hash = raster_hash(&image);
        self.store.transaction(|txn| -> Result<(), IntakeError> {
            let bundle = txn
                .bundle(bundle_id)
                .ok_or(IntakeError::BundleNotFound(bundle_id))?;
            let mut pages = txn.staged_pages(bundle_id);
            let page = pages
                .iter_mut()
                .find(|p| p.position == position)
                .ok_or(IntakeError::PageNotFound {
                    bundle: bundle_id,
                    position,
                })?;
            if !matches!(page.category, PageCategory::Error { .. } | PageCategory::Unknown) {
                return Err(IntakeError::NotReplaceable {
                    position,
                    category: page.category.name(),
                });
            }
            *page = StagedPage::rendered(bundle_id, position, hash.clone());
            let released = release_collisions(&mut pages);
            if released > 0 {
                debug!("{bundle_id}: replacing {position} released {released} page(s)");
            }
            for page in pages {
                txn.put_staged_page(page)?;
            }
            if bundle.status == BundleStatus::Ready {
                txn.set_bundle_status(bundle_id, BundleStatus::Decoding)?;
            }
            Ok(())
        })?;
        info!("{bundle_id}: position {position} replaced by a rescan");
        Ok(PageJob {
            bundle_id,
            position,
            image,
        })
    }

    /// Operator action: attach an extra sheet to questions of a paper.
    pub fn assign_extra_page(
        &self,
        bundle_id: BundleId,
        position: usize,
        paper_id: u32,
        question_ids: &[u32],
    ) -> Result<(), IntakeError> {
        if question_ids.is_empty() {
            return Err(IntakeError::EmptyAssignment { position });
        }
        for &question_id in question_ids {
            if self.spec.question_version(paper_id, question_id).is_none() {
                return Err(IntakeError::UnknownQuestion {
                    paper_id,
                    question_id,
                });
            }
        }

        self.store.transaction(|txn| -> Result<(), IntakeError> {
            let mut page = txn
                .staged_page(bundle_id, position)
                .ok_or(IntakeError::PageNotFound {
                    bundle: bundle_id,
                    position,
                })?;
            if !matches!(page.category, PageCategory::Extra { .. }) {
                return Err(IntakeError::NotAnExtraPage {
                    position,
                    category: page.category.name(),
                });
            }
            let mut questions = question_ids.to_vec();
            questions.sort_unstable();
            questions.dedup();
            page.category = PageCategory::Extra {
                assignment: Some(ExtraAssignment {
                    paper_id,
                    question_ids: questions,
                }),
            };
            txn.put_staged_page(page)?;
            Ok(())
        })
    }

    /// Remove an uncommitted bundle with all of its staged pages.
    pub fn delete_bundle(&self, bundle_id: BundleId) -> Result<usize, IntakeError> {
        let removed = self
            .store
            .transaction(|txn| txn.delete_bundle(bundle_id))?;
        info!("deleted {bundle_id} ({removed} staged page(s))");
        Ok(removed)
    }

    /// Commit all pages of a ready bundle.
    pub fn commit_bundle(&self, bundle_id: BundleId) -> Result<CommitOutcome, IntakeError> {
        let bundle = self.bundle(bundle_id)?;
        let external = match bundle.status {
            BundleStatus::Committed => Vec::new(),
            _ => self.external_collisions(bundle_id)?,
        };
        if !external.is_empty() {
            warn!(
                "{bundle_id}: {} page(s) collide with committed images; commit will be refused",
                external.len()
            );
        }
        let engine = CommitEngine::new(
            self.spec.as_ref(),
            self.marking.as_ref(),
            self.identification.as_ref(),
        );
        Ok(engine.commit_bundle(&self.store, bundle_id)?)
    }

    /// Warp `image` onto the page template and cut out `region`.
    pub fn extract_region(
        &self,
        image: &GrayImage,
        scan: &FiducialScan,
        region: RegionFractions,
    ) -> GrayImage {
        let transform = scan.rectifying_transform(&self.template);
        extract_region(&image.view(), &transform, &self.template, region)
    }
}

fn render_jobs(
    bundle_id: BundleId,
    renderer: &dyn PageRenderer,
) -> Result<Vec<PageJob>, RenderError> {
    (0..renderer.page_count())
        .map(|position| {
            Ok(PageJob {
                bundle_id,
                position,
                image: renderer.page_image(position)?,
            })
        })
        .collect()
}

impl<S: RecordStore + 'static> IntakeService<S> {
    /// Queue every job; each task decodes with `reader`.
    pub fn submit_pages(
        self: &Arc<Self>,
        jobs: Vec<PageJob>,
        reader: Arc<dyn SymbolReader + Send + Sync>,
        queue: &dyn WorkQueue,
    ) -> Vec<JobHandle> {
        jobs.into_iter()
            .map(|job| {
                let service = Arc::clone(self);
                let reader = Arc::clone(&reader);
                queue.submit(Box::new(move || service.process_page(&job, reader.as_ref())))
            })
            .collect()
    }
}
