//! The chamber contents: live cells, boundaries and queued changes.

use crate::cell::Cell;
use cellsim_core::{CellId, Error, Polyline, Result};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Structural changes waiting for the next commit
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    to_add: Vec<Cell>,
    to_remove: Vec<CellId>,
}

impl PendingChanges {
    pub fn add(&mut self, cell: Cell) {
        self.to_add.push(cell);
    }

    pub fn remove(&mut self, cell: CellId) {
        self.to_remove.push(cell);
    }

    pub fn additions(&self) -> &[Cell] {
        &self.to_add
    }

    pub fn removals(&self) -> &[CellId] {
        &self.to_remove
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn clear(&mut self) {
        self.to_add.clear();
        self.to_remove.clear();
    }
}

/// Cells and boundaries of one simulation instant.
///
/// Structural changes are two-phase: [`World::add`] and [`World::remove`]
/// only queue, [`World::commit`] applies everything at once. Cloning yields
/// an independent deep copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    pub cells: Vec<Cell>,
    pub boundaries: Vec<Polyline>,
    #[serde(skip)]
    pending: PendingChanges,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cell: Cell) {
        self.pending.add(cell);
    }

    pub fn remove(&mut self, cell: CellId) {
        self.pending.remove(cell);
    }

    pub fn add_boundary(&mut self, coordinates: impl IntoIterator<Item = DVec2>) {
        self.boundaries.push(coordinates.into_iter().collect());
    }

    /// Drop every cell, boundary and queued change
    pub fn clear(&mut self) {
        self.cells.clear();
        self.boundaries.clear();
        self.pending.clear();
    }

    /// Check that every queued removal names a cell that is live or queued
    /// for addition, and is removed only once
    pub fn validate_pending(&self) -> Result<()> {
        if self.pending.removals().is_empty() {
            return Ok(());
        }

        let mut available: BTreeSet<CellId> = self
            .cells
            .iter()
            .chain(self.pending.additions())
            .map(|cell| cell.id)
            .collect();
        for id in self.pending.removals() {
            if !available.remove(id) {
                return Err(Error::UnknownCell(*id));
            }
        }
        Ok(())
    }

    /// Apply queued additions, then queued removals.
    ///
    /// Fails without touching anything if [`World::validate_pending`] does.
    pub fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.validate_pending()?;

        let removals: BTreeSet<CellId> = self.pending.to_remove.drain(..).collect();
        self.cells.append(&mut self.pending.to_add);
        self.cells.retain(|cell| !removals.contains(&cell.id));
        Ok(())
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.id == id)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|cell| cell.id == id)
    }

    pub fn pending_additions(&self) -> &[Cell] {
        self.pending.additions()
    }

    pub fn pending_removals(&self) -> &[CellId] {
        self.pending.removals()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Live cells and the change queue, borrowed separately so cells can
    /// queue changes while being iterated
    pub(crate) fn split_mut(&mut self) -> (&mut [Cell], &mut PendingChanges) {
        (&mut self.cells, &mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::GrowthModel;
    use crate::shape::Shape;
    use cellsim_core::Pose;
    use proptest::prelude::*;

    fn cell(id: u64) -> Cell {
        Cell::new(
            CellId(id),
            Shape::rod(2.0, 1.0),
            GrowthModel::Inert,
            Pose::new(DVec2::new(id as f64, 0.0), 0.0),
        )
    }

    fn ids(world: &World) -> Vec<u64> {
        world.cells.iter().map(|c| c.id.0).collect()
    }

    #[test]
    fn test_changes_wait_for_commit() {
        let mut world = World::new();
        world.add(cell(1));
        world.add(cell(2));
        assert!(world.is_empty());
        assert_eq!(world.pending_additions().len(), 2);

        world.commit().unwrap();
        assert_eq!(ids(&world), vec![1, 2]);

        world.remove(CellId(1));
        world.add(cell(3));
        assert_eq!(ids(&world), vec![1, 2]);

        world.commit().unwrap();
        assert_eq!(ids(&world), vec![2, 3]);
        assert!(world.pending_additions().is_empty());
        assert!(world.pending_removals().is_empty());
    }

    #[test]
    fn test_queued_cell_can_be_removed_in_same_commit() {
        let mut world = World::new();
        world.add(cell(1));
        world.remove(CellId(1));
        world.commit().unwrap();
        assert!(world.is_empty());
    }

    #[test]
    fn test_unknown_removal_fails_atomically() {
        let mut world = World::new();
        world.add(cell(1));
        world.commit().unwrap();

        world.add(cell(2));
        world.remove(CellId(1));
        world.remove(CellId(42));
        assert!(matches!(world.commit(), Err(Error::UnknownCell(CellId(42)))));
        assert_eq!(ids(&world), vec![1]);
        assert_eq!(world.pending_additions().len(), 1);
    }

    #[test]
    fn test_validate_pending_leaves_queues_alone() {
        let mut world = World::new();
        world.add(cell(1));
        assert!(world.validate_pending().is_ok());
        world.remove(CellId(7));
        assert!(matches!(
            world.validate_pending(),
            Err(Error::UnknownCell(CellId(7)))
        ));
        assert_eq!(world.pending_additions().len(), 1);
        assert_eq!(world.pending_removals(), &[CellId(7)]);
    }

    #[test]
    fn test_double_removal_is_unknown() {
        let mut world = World::new();
        world.add(cell(1));
        world.commit().unwrap();
        world.remove(CellId(1));
        world.remove(CellId(1));
        assert!(world.commit().is_err());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut world = World::new();
        world.add_boundary([DVec2::new(0.0, 0.0), DVec2::new(0.0, 10.0)]);
        world.add(cell(1));
        world.commit().unwrap();
        world.add(cell(2));

        world.clear();
        assert!(world.boundaries.is_empty());
        assert!(world.cells.is_empty());
        assert!(world.pending_additions().is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut world = World::new();
        world.add(cell(1));
        world.commit().unwrap();

        let mut copy = world.clone();
        copy.cell_mut(CellId(1)).unwrap().position = DVec2::new(9.0, 9.0);
        copy.add(cell(2));
        copy.commit().unwrap();

        assert_eq!(world.len(), 1);
        assert_eq!(world.cell(CellId(1)).unwrap().position, DVec2::new(1.0, 0.0));
        assert_eq!(copy.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_commit_applies_all_queued_changes(
            initial in 1u64..10,
            added in 0u64..10,
            removed in proptest::collection::btree_set(1u64..10, 0..10),
        ) {
            let mut world = World::new();
            for id in 1..=initial {
                world.add(cell(id));
            }
            world.commit().unwrap();
            let before = ids(&world);

            for id in 100..100 + added {
                world.add(cell(id));
            }
            let removed: Vec<u64> = removed.into_iter().filter(|id| *id <= initial).collect();
            for id in &removed {
                world.remove(CellId(*id));
            }
            prop_assert_eq!(ids(&world), before);

            world.commit().unwrap();
            for id in 100..100 + added {
                prop_assert!(world.cell(CellId(id)).is_some());
            }
            for id in &removed {
                prop_assert!(world.cell(CellId(*id)).is_none());
            }
            prop_assert_eq!(world.len() as u64, initial + added - removed.len() as u64);
            prop_assert!(world.pending_additions().is_empty());
            prop_assert!(world.pending_removals().is_empty());
        }
    }
}
