//! Cell agents, the chamber world and the simulator that drives them.
//!
//! Cells grow and divide through two-phase world commits; placement engines
//! then push overlapping cells apart.

pub mod cell;
pub mod growth;
pub mod initialization;
pub mod lineage;
pub mod placement;
pub mod shape;
pub mod simulation;
pub mod world;

pub use cell::{Cell, CellContext, CellState};
pub use growth::{GrowthBehavior, GrowthKind, GrowthModel, GrowthSource, Sizer, Timer};
pub use initialization::{CellInitializer, CellTemplate};
pub use lineage::{Lineage, LineageRegistry};
pub use placement::{build_placement, SubSimulator};
pub use shape::{Bend, Shape, ShapeKind};
pub use simulation::{RunSummary, Simulation, Simulator, Timestep};
pub use world::{PendingChanges, World};
