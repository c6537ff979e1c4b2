//! Shared state between the orchestrator and its workers for one run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::error::{Error, Result};
use crate::worker::Block;

/// Pre-sized result map: one set-once slot per chunk index.
///
/// Workers own disjoint indices, so every slot is filled at most once; a
/// second fill is reported rather than overwriting.
pub struct ResultSlots {
    slots: Vec<OnceLock<Vec<u8>>>,
}

impl ResultSlots {
    pub fn new(count: usize) -> Self {
        Self { slots: (0..count).map(|_| OnceLock::new()).collect() }
    }

    pub fn fill(&self, block: Block) -> Result<()> {
        let slot = self.slots.get(block.index).ok_or_else(|| {
            Error::Internal(format!(
                "chunk index {} outside the planned {} chunks", block.index, self.slots.len()
            ))
        })?;
        slot.set(block.payload).map_err(|_| {
            Error::Internal(format!("chunk index {} produced twice", block.index))
        })
    }

    /// Drain the slots in ascending index order.  Every slot must be filled.
    pub fn into_ordered(self) -> Result<Vec<Vec<u8>>> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.into_inner().ok_or_else(|| {
                    Error::Internal(format!("chunk {index} never completed"))
                })
            })
            .collect()
    }
}

/// Records the first failure of a run and tells everyone else to stop.
#[derive(Default)]
pub struct FailureLatch {
    abort: AtomicBool,
    first: Mutex<Option<Error>>,
}

impl FailureLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `err` if it is the first one; later errors are dropped.
    pub fn trip(&self, err: Error) {
        let mut guard = self.first.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            *guard = Some(err);
            self.abort.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn into_result(self) -> Result<()> {
        match self.first.into_inner().unwrap_or_else(|p| p.into_inner()) {
            Some(err) => Err(err),
            None      => Ok(()),
        }
    }
}
