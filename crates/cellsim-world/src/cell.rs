//! Cell agents and their growth/division lifecycle.

use crate::growth::{GrowthBehavior, GrowthModel, GrowthSource};
use crate::lineage::{Lineage, LineageRegistry};
use crate::shape::{division_positions, Shape};
use crate::simulation::Timestep;
use crate::world::PendingChanges;
use cellsim_core::{CellId, Error, Pose, Result};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    /// Constructed, growth parameters not drawn yet
    Unborn,
    Alive,
    /// Replaced by its offspring; never mutated again
    Divided,
}

/// Everything a cell may touch while stepping
pub struct CellContext<'a> {
    pub timestep: &'a Timestep,
    pub changes: &'a mut PendingChanges,
    pub lineage: &'a LineageRegistry,
    pub growth: &'a mut GrowthSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub lineage: Lineage,
    pub position: DVec2,
    /// Radians
    pub angle: f64,
    pub shape: Shape,
    pub growth: GrowthModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluorescences: Option<Vec<f64>>,
    pub state: CellState,
}

impl Cell {
    pub fn new(id: CellId, shape: Shape, growth: GrowthModel, pose: Pose) -> Self {
        Self {
            id,
            lineage: Lineage::default(),
            position: pose.position,
            angle: pose.angle,
            shape,
            growth,
            fluorescences: None,
            state: CellState::Unborn,
        }
    }

    pub fn with_fluorescences(mut self, fluorescences: Vec<f64>) -> Self {
        self.fluorescences = Some(fluorescences);
        self
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.angle)
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.angle = pose.angle;
    }

    pub fn length(&self) -> f64 {
        self.shape.length
    }

    pub fn is_alive(&self) -> bool {
        self.state == CellState::Alive
    }

    /// Draw the growth parameters; called once right after construction
    pub fn birth(&mut self, source: &mut GrowthSource) {
        self.growth.birth(source);
        self.state = CellState::Alive;
    }

    pub fn step(&mut self, ctx: &mut CellContext<'_>) -> Result<()> {
        match self.state {
            CellState::Unborn => Err(Error::InvalidState(format!(
                "cell {} stepped before birth",
                self.id
            ))),
            CellState::Divided => Ok(()),
            CellState::Alive => self.grow(ctx),
        }
    }

    /// Elongate for one timestep and divide once the growth model says so
    pub fn grow(&mut self, ctx: &mut CellContext<'_>) -> Result<()> {
        self.shape.length += self.growth.elongation_rate() * ctx.timestep.hours();

        if self
            .growth
            .should_divide(self.shape.length, self.lineage.birth_time, ctx.timestep.time())
        {
            self.divide(ctx)?;
        }
        Ok(())
    }

    /// Replace this cell by two offspring split along its axis.
    ///
    /// Both offspring are queued for addition and this cell for removal, so
    /// the division becomes visible atomically at the next commit.
    pub fn divide(&mut self, ctx: &mut CellContext<'_>) -> Result<[CellId; 2]> {
        if self.state != CellState::Alive {
            return Err(Error::InvalidState(format!(
                "cell {} cannot divide in state {:?}",
                self.id, self.state
            )));
        }

        let now = ctx.timestep.time();
        let positions = division_positions(&self.pose(), self.shape.length);
        let lineage = self.lineage.descend(self.id, now);
        let length = self.growth.offspring_length(self.shape.length);

        let mut offspring: Vec<Cell> = positions
            .iter()
            .map(|position| {
                let mut child = self.clone();
                child.id = ctx.lineage.next_id();
                child.position = *position;
                child.lineage = lineage.clone();
                child.state = CellState::Unborn;
                child
            })
            .collect();

        for child in offspring.iter_mut() {
            child.birth(ctx.growth);
            child.shape.length = length;
        }

        let ids = [offspring[0].id, offspring[1].id];
        for child in offspring {
            ctx.changes.add(child);
        }
        ctx.changes.remove(self.id);
        self.state = CellState::Divided;

        debug!(
            parent = %self.id,
            offspring_a = %ids[0],
            offspring_b = %ids[1],
            time = now,
            length,
            "cell divided"
        );

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::{GrowthKind, Sizer};
    use cellsim_core::{GrowthConfig, RngKind, Rrf};

    struct Harness {
        changes: PendingChanges,
        lineage: LineageRegistry,
        growth: GrowthSource,
    }

    impl Harness {
        fn new() -> Self {
            let mut rrf = Rrf::new(1, RngKind::ChaCha12);
            Self {
                changes: PendingChanges::default(),
                lineage: LineageRegistry::new(),
                growth: GrowthSource::new(&GrowthConfig::default(), &mut rrf).unwrap(),
            }
        }

        fn context<'a>(&'a mut self, timestep: &'a Timestep) -> CellContext<'a> {
            CellContext {
                timestep,
                changes: &mut self.changes,
                lineage: &self.lineage,
                growth: &mut self.growth,
            }
        }
    }

    fn sizer_cell(harness: &mut Harness, length: f64, division_size: f64) -> Cell {
        let mut cell = Cell::new(
            harness.lineage.next_id(),
            Shape::rod(length, 1.0),
            GrowthModel::unborn(GrowthKind::Sizer),
            Pose::new(DVec2::new(5.0, 5.0), 0.0),
        );
        cell.birth(&mut harness.growth);
        cell.growth = GrowthModel::Sizer(Sizer {
            division_size,
            elongation_rate: 1.5,
        });
        cell
    }

    #[test]
    fn test_unborn_cell_cannot_step() {
        let mut harness = Harness::new();
        let mut cell = Cell::new(
            CellId(1),
            Shape::rod(2.0, 1.0),
            GrowthModel::Inert,
            Pose::new(DVec2::ZERO, 0.0),
        );
        let timestep = Timestep::new(60.0, 60.0);
        assert!(matches!(
            cell.step(&mut harness.context(&timestep)),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_growth_is_euler_step() {
        let mut harness = Harness::new();
        let mut cell = sizer_cell(&mut harness, 2.0, 10.0);
        let timestep = Timestep::new(1800.0, 1800.0);
        cell.step(&mut harness.context(&timestep)).unwrap();
        assert!((cell.length() - 2.75).abs() < 1e-12);
        assert!(harness.changes.is_empty());
    }

    #[test]
    fn test_division_lineage_and_queueing() {
        let mut harness = Harness::new();
        let mut cell = sizer_cell(&mut harness, 2.9, 3.0);
        cell.lineage = Lineage {
            parent_id: Some(CellId(99)),
            history: vec![CellId(99)],
            birth_time: 0.0,
        };
        let timestep = Timestep::new(600.0, 1200.0);

        cell.step(&mut harness.context(&timestep)).unwrap();

        let parent_length = 2.9 + 1.5 / 6.0;
        assert_eq!(cell.state, CellState::Divided);
        assert_eq!(harness.changes.removals(), &[cell.id]);

        let offspring = harness.changes.additions();
        assert_eq!(offspring.len(), 2);
        for child in offspring {
            assert_ne!(child.id, cell.id);
            assert_eq!(child.lineage.parent_id, Some(cell.id));
            assert_eq!(child.lineage.history, vec![CellId(99), cell.id]);
            assert_eq!(child.lineage.birth_time, 1200.0);
            assert!(child.is_alive());
            assert!((child.length() - parent_length / 2.0).abs() < 1e-12);
        }
        assert_eq!(offspring[0].id.0 + 1, offspring[1].id.0);
        let summed: f64 = offspring.iter().map(Cell::length).sum();
        assert!((summed - parent_length).abs() < 1e-12);

        let midpoint = (offspring[0].position + offspring[1].position) / 2.0;
        assert!((midpoint - cell.position).length() < 1e-12);
        assert!(
            ((offspring[1].position - offspring[0].position).length() - parent_length / 2.0).abs()
                < 1e-12
        );
    }

    #[test]
    fn test_divided_cell_is_inert() {
        let mut harness = Harness::new();
        let mut cell = sizer_cell(&mut harness, 2.9, 3.0);
        let timestep = Timestep::new(600.0, 600.0);
        cell.step(&mut harness.context(&timestep)).unwrap();
        let length = cell.length();

        cell.step(&mut harness.context(&timestep)).unwrap();
        assert_eq!(cell.length(), length);
        assert_eq!(harness.changes.additions().len(), 2);
        assert!(cell.divide(&mut harness.context(&timestep)).is_err());
    }

    #[test]
    fn test_timer_cell_divides_after_interval() {
        let mut harness = Harness::new();
        let mut cell = Cell::new(
            harness.lineage.next_id(),
            Shape::rod(2.0, 1.0),
            GrowthModel::unborn(GrowthKind::Timer),
            Pose::new(DVec2::ZERO, 0.0),
        );
        cell.birth(&mut harness.growth);

        let early = Timestep::new(60.0, 3600.0);
        cell.step(&mut harness.context(&early)).unwrap();
        assert!(cell.is_alive());

        let late = Timestep::new(60.0, 3660.0);
        cell.step(&mut harness.context(&late)).unwrap();
        assert_eq!(cell.state, CellState::Divided);
    }
}
