//! Placement for solvers with a hard per-body vertex ceiling.

use super::space::{Body, Space, SpaceSettings};
use super::{cell_shape_defs, BodyIndex, SubSimulator};
use crate::cell::Cell;
use cellsim_core::{CellId, Error, PlacementConfig, PoseUpdate, Result, Simplification};
use glam::DVec2;
use tracing::debug;

/// Cheaper engine: simplified outlines or circles only, one solver step per
/// timestep and no convergence loop
pub struct BoundedPlacement {
    config: PlacementConfig,
    index: BodyIndex,
}

impl BoundedPlacement {
    pub fn new(config: &PlacementConfig) -> Result<Self> {
        if config.simplification == Simplification::Full {
            return Err(Error::PlacementPrecondition(
                "bounded placement requires simplification level 1 or 2".to_string(),
            ));
        }

        let settings = SpaceSettings::from_config(config, config.bounded_iterations);
        Ok(Self {
            config: config.clone(),
            index: BodyIndex::new(Space::new(settings)),
        })
    }

    pub fn index(&self) -> &BodyIndex {
        &self.index
    }
}

impl SubSimulator for BoundedPlacement {
    fn name(&self) -> &'static str {
        "bounded"
    }

    fn add(&mut self, cell: &Cell) -> Result<()> {
        let shapes = cell_shape_defs(cell, self.config.simplification, 0.0)?;
        if let Some(shape) = shapes
            .iter()
            .find(|shape| shape.vertex_count() > self.config.max_polygon_vertices)
        {
            return Err(Error::PlacementPrecondition(format!(
                "cell {} outline has {} vertices, at most {} are supported",
                cell.id,
                shape.vertex_count(),
                self.config.max_polygon_vertices
            )));
        }

        let body = Body::dynamic(
            self.config.body_mass,
            self.config.body_moment,
            cell.position,
            cell.angle,
        );
        self.index.insert_cell(cell.id, body, shapes)
    }

    fn remove(&mut self, cell: CellId) -> Result<()> {
        self.index.remove_cell(cell)
    }

    fn add_boundary(&mut self, coordinates: &[DVec2]) -> Result<()> {
        self.index.insert_boundary(coordinates)
    }

    fn clear(&mut self) {
        self.index.clear();
    }

    fn step(&mut self, timestep: f64) -> Result<Vec<PoseUpdate>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        self.index.space_mut().step(timestep);
        debug!(cells = self.index.cell_count(), "bounded placement step");

        Ok(self.index.pose_updates())
    }
}
