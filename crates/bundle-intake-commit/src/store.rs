//! Record-store seam and the in-memory reference store.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use bundle_intake_staging::{Bundle, BundleId, BundleStatus, ImageId, StagedPage};

use crate::records::{CommittedImage, DiscardRecord, FixedPageBinding, MobilePage, NewImage};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    BundleNotFound(BundleId),
    #[error("a bundle with hash {hash} already exists ({existing})")]
    DuplicateBundleHash { hash: String, existing: BundleId },
    #[error("{0} is committed and can no longer change")]
    BundleCommitted(BundleId),
    #[error("paper {paper_id} page {page_id} is already bound to {image}")]
    SlotTaken {
        paper_id: u32,
        page_id: u32,
        image: ImageId,
    },
    #[error("{0} not found")]
    ImageNotFound(ImageId),
}

/// Queries available both inside and outside a transaction.
pub trait StoreRead {
    fn bundle(&self, id: BundleId) -> Option<Bundle>;
    fn bundle_by_hash(&self, hash: &str) -> Option<Bundle>;
    fn bundles(&self) -> Vec<Bundle>;
    /// Staged pages of a bundle, ordered by position.
    fn staged_pages(&self, id: BundleId) -> Vec<StagedPage>;
    fn staged_page(&self, id: BundleId, position: usize) -> Option<StagedPage>;
    fn fixed_page_image(&self, paper_id: u32, page_id: u32) -> Option<ImageId>;
    fn image(&self, id: ImageId) -> Option<CommittedImage>;
    fn mobile_pages(&self, paper_id: u32, question_id: u32) -> Vec<MobilePage>;
    fn discard(&self, image: ImageId) -> Option<DiscardRecord>;
}

/// Writes, only reachable inside [`RecordStore::transaction`].
pub trait StoreTransaction: StoreRead {
    /// New bundle in `uploading` status. Content hashes are unique.
    fn insert_bundle(&mut self, hash: &str, name: &str, owner: &str) -> Result<Bundle, StoreError>;
    fn set_bundle_status(&mut self, id: BundleId, status: BundleStatus) -> Result<(), StoreError>;
    fn set_page_count(&mut self, id: BundleId, page_count: usize) -> Result<(), StoreError>;
    /// Remove an uncommitted bundle and its staged pages; returns the page count removed.
    fn delete_bundle(&mut self, id: BundleId) -> Result<usize, StoreError>;
    /// Insert or overwrite the staged page at its `(bundle, position)`.
    fn put_staged_page(&mut self, page: StagedPage) -> Result<(), StoreError>;
    /// Drop every staged page of an uncommitted bundle; returns how many.
    fn clear_staged_pages(&mut self, id: BundleId) -> Result<usize, StoreError>;
    fn insert_image(&mut self, image: NewImage) -> ImageId;
    fn bind_fixed_page(&mut self, binding: FixedPageBinding) -> Result<(), StoreError>;
    fn insert_mobile_page(&mut self, page: MobilePage) -> Result<(), StoreError>;
    fn insert_discard(&mut self, record: DiscardRecord) -> Result<(), StoreError>;
}

/// A store that runs closures atomically.
///
/// When the closure passed to [`transaction`](RecordStore::transaction)
/// returns `Err`, none of its writes are visible afterwards.
pub trait RecordStore: Send + Sync {
    type Txn: StoreTransaction;

    fn read<R>(&self, f: impl FnOnce(&Self::Txn) -> R) -> R;

    fn transaction<R, E>(&self, f: impl FnOnce(&mut Self::Txn) -> Result<R, E>) -> Result<R, E>;
}

/// Inverse of one write, replayed newest first when a transaction fails.
#[derive(Clone, Debug)]
enum Undo {
    Counters { next_bundle: u64, next_image: u64 },
    Bundle(BundleId, Option<Bundle>),
    Staged((BundleId, usize), Option<StagedPage>),
    Image(ImageId),
    Fixed((u32, u32)),
    Mobile(usize),
    Discard(ImageId, Option<DiscardRecord>),
}

/// Contents of a [`MemoryStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    next_bundle: u64,
    next_image: u64,
    bundles: BTreeMap<BundleId, Bundle>,
    staged: BTreeMap<(BundleId, usize), StagedPage>,
    images: BTreeMap<ImageId, CommittedImage>,
    fixed: BTreeMap<(u32, u32), FixedPageBinding>,
    mobile: Vec<MobilePage>,
    discards: BTreeMap<ImageId, DiscardRecord>,
    journal: Vec<Undo>,
}

impl MemoryState {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn fixed_bindings(&self) -> impl Iterator<Item = &FixedPageBinding> {
        self.fixed.values()
    }

    pub fn mobile_page_count(&self) -> usize {
        self.mobile.len()
    }

    pub fn discard_count(&self) -> usize {
        self.discards.len()
    }

    fn bundle_mut(&mut self, id: BundleId) -> Result<&mut Bundle, StoreError> {
        self.bundles
            .get_mut(&id)
            .ok_or(StoreError::BundleNotFound(id))
    }

    fn save_counters(&mut self) {
        self.journal.push(Undo::Counters {
            next_bundle: self.next_bundle,
            next_image: self.next_image,
        });
    }

    fn save_bundle(&mut self, id: BundleId) {
        let prior = self.bundles.get(&id).cloned();
        self.journal.push(Undo::Bundle(id, prior));
    }

    fn save_staged(&mut self, key: (BundleId, usize)) {
        let prior = self.staged.get(&key).cloned();
        self.journal.push(Undo::Staged(key, prior));
    }

    /// Undo every journaled write, newest first.
    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Counters {
                    next_bundle,
                    next_image,
                } => {
                    self.next_bundle = next_bundle;
                    self.next_image = next_image;
                }
                Undo::Bundle(id, prior) => restore(&mut self.bundles, id, prior),
                Undo::Staged(key, prior) => restore(&mut self.staged, key, prior),
                Undo::Image(id) => {
                    self.images.remove(&id);
                }
                Undo::Fixed(key) => {
                    self.fixed.remove(&key);
                }
                Undo::Mobile(len) => self.mobile.truncate(len),
                Undo::Discard(id, prior) => restore(&mut self.discards, id, prior),
            }
        }
    }

    fn uncommitted(&mut self, id: BundleId) -> Result<(), StoreError> {
        if self.bundle_mut(id)?.status.is_committed() {
            return Err(StoreError::BundleCommitted(id));
        }
        Ok(())
    }

    fn require_image(&self, id: ImageId) -> Result<(), StoreError> {
        if self.images.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ImageNotFound(id))
        }
    }
}

fn restore<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

impl StoreRead for MemoryState {
    fn bundle(&self, id: BundleId) -> Option<Bundle> {
        self.bundles.get(&id).cloned()
    }

    fn bundle_by_hash(&self, hash: &str) -> Option<Bundle> {
        self.bundles.values().find(|b| b.hash == hash).cloned()
    }

    fn bundles(&self) -> Vec<Bundle> {
        self.bundles.values().cloned().collect()
    }

    fn staged_pages(&self, id: BundleId) -> Vec<StagedPage> {
        self.staged
            .range((id, 0)..=(id, usize::MAX))
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn staged_page(&self, id: BundleId, position: usize) -> Option<StagedPage> {
        self.staged.get(&(id, position)).cloned()
    }

    fn fixed_page_image(&self, paper_id: u32, page_id: u32) -> Option<ImageId> {
        self.fixed.get(&(paper_id, page_id)).map(|b| b.image)
    }

    fn image(&self, id: ImageId) -> Option<CommittedImage> {
        self.images.get(&id).cloned()
    }

    fn mobile_pages(&self, paper_id: u32, question_id: u32) -> Vec<MobilePage> {
        self.mobile
            .iter()
            .filter(|m| m.paper_id == paper_id && m.question_id == question_id)
            .copied()
            .collect()
    }

    fn discard(&self, image: ImageId) -> Option<DiscardRecord> {
        self.discards.get(&image).cloned()
    }
}

impl StoreTransaction for MemoryState {
    fn insert_bundle(&mut self, hash: &str, name: &str, owner: &str) -> Result<Bundle, StoreError> {
        if let Some(existing) = self.bundle_by_hash(hash) {
            return Err(StoreError::DuplicateBundleHash {
                hash: hash.to_string(),
                existing: existing.id,
            });
        }
        self.save_counters();
        self.next_bundle += 1;
        let bundle = Bundle {
            id: BundleId(self.next_bundle),
            hash: hash.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            status: BundleStatus::Uploading,
            page_count: 0,
        };
        self.journal.push(Undo::Bundle(bundle.id, None));
        self.bundles.insert(bundle.id, bundle.clone());
        Ok(bundle)
    }

    fn set_bundle_status(&mut self, id: BundleId, status: BundleStatus) -> Result<(), StoreError> {
        self.uncommitted(id)?;
        self.save_bundle(id);
        self.bundle_mut(id)?.status = status;
        Ok(())
    }

    fn set_page_count(&mut self, id: BundleId, page_count: usize) -> Result<(), StoreError> {
        self.bundle_mut(id)?;
        self.save_bundle(id);
        self.bundle_mut(id)?.page_count = page_count;
        Ok(())
    }

    fn delete_bundle(&mut self, id: BundleId) -> Result<usize, StoreError> {
        let removed = self.clear_staged_pages(id)?;
        self.save_bundle(id);
        self.bundles.remove(&id);
        Ok(removed)
    }

    fn put_staged_page(&mut self, page: StagedPage) -> Result<(), StoreError> {
        self.uncommitted(page.bundle_id)?;
        let key = (page.bundle_id, page.position);
        self.save_staged(key);
        self.staged.insert(key, page);
        Ok(())
    }

    fn clear_staged_pages(&mut self, id: BundleId) -> Result<usize, StoreError> {
        self.uncommitted(id)?;
        let keys: Vec<(BundleId, usize)> = self
            .staged
            .range((id, 0)..=(id, usize::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            self.save_staged(*key);
            self.staged.remove(key);
        }
        Ok(keys.len())
    }

    fn insert_image(&mut self, image: NewImage) -> ImageId {
        self.save_counters();
        self.next_image += 1;
        let id = ImageId(self.next_image);
        self.journal.push(Undo::Image(id));
        self.images.insert(id, image.into_committed(id));
        id
    }

    fn bind_fixed_page(&mut self, binding: FixedPageBinding) -> Result<(), StoreError> {
        self.require_image(binding.image)?;
        let key = (binding.paper_id, binding.page_id);
        if let Some(existing) = self.fixed.get(&key) {
            return Err(StoreError::SlotTaken {
                paper_id: binding.paper_id,
                page_id: binding.page_id,
                image: existing.image,
            });
        }
        self.journal.push(Undo::Fixed(key));
        self.fixed.insert(key, binding);
        Ok(())
    }

    fn insert_mobile_page(&mut self, page: MobilePage) -> Result<(), StoreError> {
        self.require_image(page.image)?;
        self.journal.push(Undo::Mobile(self.mobile.len()));
        self.mobile.push(page);
        Ok(())
    }

    fn insert_discard(&mut self, record: DiscardRecord) -> Result<(), StoreError> {
        self.require_image(record.image)?;
        let prior = self.discards.get(&record.image).cloned();
        self.journal.push(Undo::Discard(record.image, prior));
        self.discards.insert(record.image, record);
        Ok(())
    }
}

/// Reference [`RecordStore`]: transactions run one at a time and journal
/// their writes, which are undone if the closure fails or panics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> MemoryState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RecordStore for MemoryStore {
    type Txn = MemoryState;

    fn read<R>(&self, f: impl FnOnce(&Self::Txn) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        guard.rollback();
        f(&guard)
    }

    fn transaction<R, E>(&self, f: impl FnOnce(&mut Self::Txn) -> Result<R, E>) -> Result<R, E> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // left over from a transaction that panicked
        guard.rollback();
        match f(&mut *guard) {
            Ok(out) => {
                guard.journal.clear();
                Ok(out)
            }
            Err(err) => {
                guard.rollback();
                Err(err)
            }
        }
    }
}
