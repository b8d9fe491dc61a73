//! Physical placement of cells.
//!
//! Placement engines are sub-simulators: each step the simulator clears them,
//! re-adds every boundary and live cell, steps them and writes the returned
//! poses back onto its cells.

pub mod bounded;
pub mod collision;
pub mod null;
pub mod relaxation;
pub mod space;

pub use bounded::BoundedPlacement;
pub use null::NullPlacement;
pub use relaxation::{InnerStepReport, RelaxationPlacement};
pub use space::{Body, BodyHandle, ShapeDef, ShapeHandle, Space, SpaceSettings};

use crate::cell::Cell;
use cellsim_core::{
    CellId, Error, PlacementConfig, PlacementEngine, Pose, PoseUpdate, Result, Simplification,
};
use glam::DVec2;
use std::collections::BTreeMap;

/// A simulator driven by the main simulator after every cell step
pub trait SubSimulator: Send {
    fn name(&self) -> &'static str;

    /// Start tracking `cell`
    fn add(&mut self, cell: &Cell) -> Result<()>;

    /// Stop tracking a cell
    fn remove(&mut self, cell: CellId) -> Result<()>;

    /// Register a static open polyline
    fn add_boundary(&mut self, coordinates: &[DVec2]) -> Result<()>;

    /// Forget every cell and boundary
    fn clear(&mut self);

    /// Advance by `timestep` seconds, returning the resolved cell poses
    fn step(&mut self, timestep: f64) -> Result<Vec<PoseUpdate>>;
}

/// Build the configured placement engine
pub fn build_placement(config: &PlacementConfig) -> Result<Box<dyn SubSimulator>> {
    Ok(match config.engine {
        PlacementEngine::Relaxation => Box::new(RelaxationPlacement::new(config)),
        PlacementEngine::Bounded => Box::new(BoundedPlacement::new(config)?),
        PlacementEngine::Null => Box::new(NullPlacement),
    })
}

/// Collision shapes of a cell at the given fidelity
pub fn cell_shape_defs(
    cell: &Cell,
    simplification: Simplification,
    skin_radius: f64,
) -> Result<Vec<ShapeDef>> {
    match simplification {
        Simplification::Circles => Ok(cell
            .shape
            .approximation_circles()?
            .into_iter()
            .map(|circle| ShapeDef::circle(circle.radius, circle.offset))
            .collect()),
        Simplification::Full | Simplification::Simplified => {
            let points = cell
                .shape
                .raw_points(simplification == Simplification::Simplified)?;
            Ok(vec![ShapeDef::polygon(&points, skin_radius)?])
        }
    }
}

/// Bodies and shapes of one engine, indexed by cell identity
#[derive(Debug, Clone)]
pub struct BodyIndex {
    space: Space,
    cell_bodies: BTreeMap<CellId, BodyHandle>,
    cell_shapes: BTreeMap<CellId, Vec<ShapeHandle>>,
    boundary_bodies: Vec<BodyHandle>,
    boundary_shapes: Vec<Vec<ShapeHandle>>,
    boundaries: Vec<[DVec2; 2]>,
}

impl BodyIndex {
    pub fn new(space: Space) -> Self {
        Self {
            space,
            cell_bodies: BTreeMap::new(),
            cell_shapes: BTreeMap::new(),
            boundary_bodies: Vec::new(),
            boundary_shapes: Vec::new(),
            boundaries: Vec::new(),
        }
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut Space {
        &mut self.space
    }

    pub fn insert_cell(&mut self, cell: CellId, body: Body, shapes: Vec<ShapeDef>) -> Result<()> {
        if self.cell_bodies.contains_key(&cell) {
            return Err(Error::InvalidState(format!("cell {} is already placed", cell)));
        }

        let handle = self.space.add_body(body);
        let shapes = shapes
            .into_iter()
            .map(|def| self.space.add_shape(handle, def))
            .collect::<Result<Vec<_>>>()?;

        self.cell_bodies.insert(cell, handle);
        self.cell_shapes.insert(cell, shapes);
        Ok(())
    }

    pub fn remove_cell(&mut self, cell: CellId) -> Result<()> {
        let handle = self
            .cell_bodies
            .remove(&cell)
            .ok_or(Error::UnknownCell(cell))?;
        self.cell_shapes.remove(&cell);
        self.space.remove_body(handle)
    }

    /// Static segments between consecutive points; the polyline is not closed
    pub fn insert_boundary(&mut self, coordinates: &[DVec2]) -> Result<()> {
        let body = self.space.add_body(Body::fixed());
        let mut shapes = Vec::new();
        for pair in coordinates.windows(2) {
            self.boundaries.push([pair[0], pair[1]]);
            shapes.push(
                self.space
                    .add_shape(body, ShapeDef::segment(pair[0], pair[1], 0.0))?,
            );
        }
        self.boundary_bodies.push(body);
        self.boundary_shapes.push(shapes);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.space.clear();
        self.cell_bodies.clear();
        self.cell_shapes.clear();
        self.boundary_bodies.clear();
        self.boundary_shapes.clear();
        self.boundaries.clear();
    }

    pub fn cell_count(&self) -> usize {
        self.cell_bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_bodies.is_empty()
    }

    pub fn boundaries(&self) -> &[[DVec2; 2]] {
        &self.boundaries
    }

    pub fn boundary_shape_count(&self) -> usize {
        self.boundary_shapes.iter().map(Vec::len).sum()
    }

    pub fn shapes_of(&self, cell: CellId) -> Option<&[ShapeHandle]> {
        self.cell_shapes.get(&cell).map(Vec::as_slice)
    }

    pub fn pose(&self, cell: CellId) -> Option<Pose> {
        let handle = self.cell_bodies.get(&cell)?;
        let body = self.space.body(*handle)?;
        Some(Pose::new(body.position, body.angle))
    }

    /// Cell body positions in cell id order
    pub fn positions(&self) -> Vec<DVec2> {
        self.cell_bodies
            .values()
            .filter_map(|handle| self.space.body(*handle))
            .map(|body| body.position)
            .collect()
    }

    pub fn pose_updates(&self) -> Vec<PoseUpdate> {
        self.cell_bodies
            .keys()
            .filter_map(|cell| {
                self.pose(*cell).map(|pose| PoseUpdate { cell: *cell, pose })
            })
            .collect()
    }
}
