//! Cell identity and ancestry.

use cellsim_core::CellId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out cell ids for one run
#[derive(Debug)]
pub struct LineageRegistry {
    counter: AtomicU64,
}

impl LineageRegistry {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Next id; the first one handed out is 1
    pub fn next_id(&self) -> CellId {
        CellId(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Most recently issued id, if any
    pub fn last_id(&self) -> Option<CellId> {
        match self.counter.load(Ordering::Relaxed) {
            0 => None,
            n => Some(CellId(n)),
        }
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

impl Default for LineageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Ancestry of a single cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub parent_id: Option<CellId>,
    /// Ancestor ids, oldest first
    pub history: Vec<CellId>,
    /// Simulation time of birth, in seconds
    pub birth_time: f64,
}

impl Lineage {
    /// Lineage of an offspring of `parent` born at `time`
    pub fn descend(&self, parent: CellId, time: f64) -> Self {
        let mut history = self.history.clone();
        history.push(parent);
        Self {
            parent_id: Some(parent),
            history,
            birth_time: time,
        }
    }

    pub fn generation(&self) -> usize {
        self.history.len()
    }
}
