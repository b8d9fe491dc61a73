//! Placement that never moves anything.

use super::SubSimulator;
use crate::cell::Cell;
use cellsim_core::{CellId, PoseUpdate, Result};
use glam::DVec2;

/// Placement that leaves every cell where it is
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlacement;

impl SubSimulator for NullPlacement {
    fn name(&self) -> &'static str {
        "null"
    }

    fn add(&mut self, _cell: &Cell) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, _cell: CellId) -> Result<()> {
        Ok(())
    }

    fn add_boundary(&mut self, _coordinates: &[DVec2]) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) {}

    fn step(&mut self, _timestep: f64) -> Result<Vec<PoseUpdate>> {
        Ok(Vec::new())
    }
}
