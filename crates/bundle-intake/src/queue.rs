//! Background dispatch of per-page work.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use bundle_intake_staging::StagedPage;
use serde::{Deserialize, Serialize};

use crate::error::IntakeError;

/// One unit of page work.
pub type PageTask = Box<dyn FnOnce() -> Result<StagedPage, IntakeError> + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Started,
    Complete,
    Failed,
}

struct JobState {
    status: JobStatus,
    result: Option<Result<StagedPage, IntakeError>>,
}

type Shared = Arc<(Mutex<JobState>, Condvar)>;

/// Caller side of a submitted task.
pub struct JobHandle {
    shared: Shared,
}

impl JobHandle {
    fn queued() -> (Self, Shared) {
        let shared = Arc::new((
            Mutex::new(JobState {
                status: JobStatus::Queued,
                result: None,
            }),
            Condvar::new(),
        ));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            shared,
        )
    }

    pub fn status(&self) -> JobStatus {
        self.shared
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// Take the result if the task has finished.
    pub fn result(&self) -> Option<Result<StagedPage, IntakeError>> {
        self.shared
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .result
            .take()
    }

    /// Block until the task finishes.
    pub fn wait(self) -> Result<StagedPage, IntakeError> {
        let (lock, ready) = &*self.shared;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = state.result.take() {
                return result;
            }
            if matches!(state.status, JobStatus::Complete | JobStatus::Failed) {
                return Err(IntakeError::ResultTaken);
            }
            state = ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn run(task: PageTask, shared: &Shared) {
    let (lock, ready) = &**shared;
    lock.lock().unwrap_or_else(PoisonError::into_inner).status = JobStatus::Started;

    let result = task();

    let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
    state.status = if result.is_ok() {
        JobStatus::Complete
    } else {
        JobStatus::Failed
    };
    state.result = Some(result);
    ready.notify_all();
}

/// Where page tasks run.
pub trait WorkQueue: Send + Sync {
    fn submit(&self, task: PageTask) -> JobHandle;
}

/// Runs every task on the submitting thread before returning.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineQueue;

impl WorkQueue for InlineQueue {
    fn submit(&self, task: PageTask) -> JobHandle {
        let (handle, shared) = JobHandle::queued();
        run(task, &shared);
        handle
    }
}

/// Runs tasks on a rayon thread pool.
pub struct RayonQueue {
    pool: rayon::ThreadPool,
}

impl RayonQueue {
    /// Pool with `threads` workers; `0` lets rayon choose.
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("intake-page-{i}"))
            .build()?;
        Ok(Self { pool })
    }
}

impl WorkQueue for RayonQueue {
    fn submit(&self, task: PageTask) -> JobHandle {
        let (handle, shared) = JobHandle::queued();
        self.pool.spawn(move || run(task, &shared));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle_intake_staging::BundleId;

    fn task(position: usize) -> PageTask {
        Box::new(move || Ok(StagedPage::rendered(BundleId(1), position, "h")))
    }

    #[test]
    fn inline_queue_completes_on_submit() {
        let handle = InlineQueue.submit(task(3));
        assert_eq!(handle.status(), JobStatus::Complete);
        assert_eq!(handle.wait().expect("page").position, 3);
    }

    #[test]
    fn failures_are_reported() {
        let handle = InlineQueue.submit(Box::new(|| Err(IntakeError::BundleNotFound(BundleId(9)))));
        assert_eq!(handle.status(), JobStatus::Failed);
        assert!(matches!(handle.result(), Some(Err(IntakeError::BundleNotFound(_)))));
        assert!(handle.result().is_none());
        assert!(matches!(handle.wait(), Err(IntakeError::ResultTaken)));
    }

    #[test]
    fn rayon_queue_runs_all_tasks() {
        let queue = RayonQueue::new(2).expect("pool");
        let handles: Vec<_> = (0..8).map(|i| queue.submit(task(i))).collect();
        let mut positions: Vec<_> = handles
            .into_iter()
            .map(|h| h.wait().expect("page").position)
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, (0..8).collect::<Vec<_>>());
    }
}
