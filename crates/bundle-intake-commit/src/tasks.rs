//! Downstream task services notified after a commit.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Creates marking tasks. Creating an existing task is a no-op.
pub trait MarkingTaskService: Send + Sync {
    fn create_task(&self, paper_id: u32, question_id: u32);
}

pub trait IdentificationTaskService: Send + Sync {
    fn create_task(&self, paper_id: u32);
    fn task_exists(&self, paper_id: u32) -> bool;
}

/// A task creation that actually happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskSignal {
    Marking { paper_id: u32, question_id: u32 },
    Identification { paper_id: u32 },
}

#[derive(Debug, Default)]
struct LedgerState {
    marking: BTreeSet<(u32, u32)>,
    identification: BTreeSet<u32>,
    signals: Vec<TaskSignal>,
}

/// In-memory implementation of both task services.
#[derive(Debug, Default)]
pub struct TaskLedger {
    state: Mutex<LedgerState>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task creations in the order they happened.
    pub fn signals(&self) -> Vec<TaskSignal> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .signals
            .clone()
    }

    pub fn has_marking_task(&self, paper_id: u32, question_id: u32) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .marking
            .contains(&(paper_id, question_id))
    }
}

impl MarkingTaskService for TaskLedger {
    fn create_task(&self, paper_id: u32, question_id: u32) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.marking.insert((paper_id, question_id)) {
            state.signals.push(TaskSignal::Marking {
                paper_id,
                question_id,
            });
        }
    }
}

impl IdentificationTaskService for TaskLedger {
    fn create_task(&self, paper_id: u32) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.identification.insert(paper_id) {
            state.signals.push(TaskSignal::Identification { paper_id });
        }
    }

    fn task_exists(&self, paper_id: u32) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .identification
            .contains(&paper_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creations_are_idempotent() {
        let ledger = TaskLedger::new();
        MarkingTaskService::create_task(&ledger, 7, 1);
        MarkingTaskService::create_task(&ledger, 7, 1);
        IdentificationTaskService::create_task(&ledger, 7);
        IdentificationTaskService::create_task(&ledger, 7);
        assert_eq!(
            ledger.signals(),
            vec![
                TaskSignal::Marking {
                    paper_id: 7,
                    question_id: 1
                },
                TaskSignal::Identification { paper_id: 7 },
            ]
        );
        assert!(ledger.task_exists(7));
        assert!(ledger.has_marking_task(7, 1));
        assert!(!ledger.has_marking_task(7, 2));
    }
}
