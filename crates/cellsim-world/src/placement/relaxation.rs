//! Iterative relaxation of overlapping cells until motion dies down.

use super::space::{Body, Space, SpaceSettings};
use super::{cell_shape_defs, BodyIndex, SubSimulator};
use crate::cell::Cell;
use cellsim_core::{CellId, PlacementConfig, PoseUpdate, Result};
use glam::DVec2;
use serde::Serialize;
use tracing::{debug, trace};

/// Outcome of one relaxation pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InnerStepReport {
    /// Summed displacement of all bodies between the first and last snapshot
    pub total_distance: f64,
    /// Substeps actually executed
    pub substeps: usize,
    /// Whether the pass stopped before exhausting its budget
    pub converged: bool,
}

/// Default placement engine: full fidelity, skin radius on polygons and a
/// convergence-seeking substep loop
pub struct RelaxationPlacement {
    config: PlacementConfig,
    index: BodyIndex,
}

fn mean_distance(before: &[DVec2], after: &[DVec2]) -> f64 {
    if before.is_empty() {
        return 0.0;
    }
    before
        .iter()
        .zip(after)
        .map(|(b, a)| (*a - *b).length())
        .sum::<f64>()
        / before.len() as f64
}

fn total_distance(before: &[DVec2], after: &[DVec2]) -> f64 {
    before.iter().zip(after).map(|(b, a)| (*a - *b).length()).sum()
}

impl RelaxationPlacement {
    pub fn new(config: &PlacementConfig) -> Self {
        let settings = SpaceSettings::from_config(config, config.solver_iterations);
        Self {
            config: config.clone(),
            index: BodyIndex::new(Space::new(settings)),
        }
    }

    pub fn index(&self) -> &BodyIndex {
        &self.index
    }

    /// Run up to `iterations` substeps of `time_step` seconds.
    ///
    /// With `converge`, motion is sampled every check interval; the pass stops
    /// once it stayed below `epsilon` for more than the look-back threshold
    /// of checks, or, after motion was seen at least once, as soon as it drops
    /// below `epsilon`.
    pub fn inner_step(
        &mut self,
        time_step: f64,
        iterations: usize,
        converge: bool,
        epsilon: f64,
    ) -> InnerStepReport {
        let first_positions = self.index.positions();

        let (substeps, converged) = if converge {
            self.step_attempt_converge(time_step, iterations, epsilon, &first_positions)
        } else {
            for _ in 0..iterations {
                self.index.space_mut().step(time_step);
            }
            (iterations, false)
        };

        let after_positions = self.index.positions();

        InnerStepReport {
            total_distance: total_distance(&first_positions, &after_positions),
            substeps,
            converged,
        }
    }

    fn step_attempt_converge(
        &mut self,
        time_step: f64,
        iterations: usize,
        epsilon: f64,
        first_positions: &[DVec2],
    ) -> (usize, bool) {
        let interval = self.config.convergence_check_interval.max(1);
        let threshold = self.config.look_back_threshold;

        let mut converging = false;
        let mut look_back = 0u32;
        let mut countdown = interval;
        let mut before_positions = first_positions.to_vec();

        for substep in 1..=iterations {
            self.index.space_mut().step(time_step);

            countdown -= 1;
            if countdown > 0 {
                continue;
            }
            countdown = interval;

            let after_positions = self.index.positions();
            let distance =
                mean_distance(&before_positions, &after_positions) * time_step * interval as f64;
            before_positions = after_positions;

            if distance < epsilon {
                look_back += 1;
            } else {
                look_back = 0;
            }

            trace!(substep, distance, look_back, "convergence check");

            if look_back > threshold {
                debug!(substep, "stopping due to look back threshold");
                return (substep, true);
            }

            if !converging {
                if distance > 0.0 {
                    converging = true;
                }
            } else if distance < epsilon {
                debug!(substep, "relaxation converged");
                return (substep, true);
            }
        }

        (iterations, false)
    }
}

impl SubSimulator for RelaxationPlacement {
    fn name(&self) -> &'static str {
        "relaxation"
    }

    fn add(&mut self, cell: &Cell) -> Result<()> {
        let shapes = cell_shape_defs(cell, self.config.simplification, self.config.skin_radius)?;
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

        let resolution = self.config.resolution;
        let substeps = (timestep / resolution) as usize;
        let report = self.inner_step(resolution, substeps, self.config.converge, self.config.epsilon);

        debug!(
            cells = self.index.cell_count(),
            substeps = report.substeps,
            budget = substeps,
            converged = report.converged,
            total_distance = report.total_distance,
            "placement pass finished"
        );

        Ok(self.index.pose_updates())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::GrowthModel;
    use crate::shape::Shape;
    use cellsim_core::{Pose, Simplification};
    use proptest::prelude::*;

    fn rod_at(id: u64, x: f64, y: f64, angle: f64) -> Cell {
        Cell::new(
            CellId(id),
            Shape::rod(3.0, 1.0),
            GrowthModel::Inert,
            Pose::new(DVec2::new(x, y), angle),
        )
    }

    fn engine() -> RelaxationPlacement {
        RelaxationPlacement::new(&PlacementConfig::default())
    }

    #[test]
    fn test_empty_engine_is_a_no_op() {
        let mut engine = engine();
        assert!(engine.step(60.0).unwrap().is_empty());
    }

    #[test]
    fn test_overlapping_cells_are_pushed_apart() {
        let mut engine = engine();
        let a = rod_at(1, 10.0, 10.0, 0.0);
        let b = rod_at(2, 10.8, 10.3, 0.0);
        let initial = (b.position - a.position).length();
        engine.add(&a).unwrap();
        engine.add(&b).unwrap();

        let updates = engine.step(60.0).unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.pose.is_finite()));

        let separation = (updates[1].pose.position - updates[0].pose.position).length();
        assert!(separation > initial);
    }

    #[test]
    fn test_resting_system_stops_after_look_back() {
        let mut engine = engine();
        engine.add(&rod_at(1, 0.0, 0.0, 0.0)).unwrap();
        engine.add(&rod_at(2, 0.0, 5.0, 0.0)).unwrap();

        let report = engine.inner_step(1.0, 200, true, 1e-12);
        // six quiet checks of fifteen substeps each
        assert_eq!(report.substeps, 90);
        assert!(report.converged);
        assert_eq!(report.total_distance, 0.0);
    }

    #[test]
    fn test_moving_system_stops_once_quiet() {
        let mut engine = engine();
        engine.add(&rod_at(1, 10.0, 10.0, 0.0)).unwrap();
        engine.add(&rod_at(2, 10.5, 10.4, 0.0)).unwrap();

        let report = engine.inner_step(1.0, 600, true, 1e-12);
        assert!(report.converged);
        assert!(report.substeps < 600);
        assert!(report.total_distance > 0.0);
    }

    #[test]
    fn test_without_convergence_runs_full_budget() {
        let mut engine = engine();
        engine.add(&rod_at(1, 0.0, 0.0, 0.0)).unwrap();
        let report = engine.inner_step(1.0, 42, false, 1e-12);
        assert_eq!(report.substeps, 42);
        assert!(!report.converged);
    }

    #[test]
    fn test_boundary_holds_cell_back() {
        let mut engine = engine();
        engine
            .add_boundary(&[DVec2::new(0.0, -10.0), DVec2::new(0.0, 10.0)])
            .unwrap();
        engine.add(&rod_at(1, 1.2, 0.0, 0.0)).unwrap();

        let updates = engine.step(60.0).unwrap();
        assert_eq!(updates.len(), 1);
        // the rod reaches 0.3 past the wall and is pushed to the right
        assert!(updates[0].pose.position.x > 1.2);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut engine = engine();
        engine.add(&rod_at(1, 0.0, 0.0, 0.0)).unwrap();
        engine.add(&rod_at(2, 5.0, 0.0, 0.0)).unwrap();
        engine.remove(CellId(1)).unwrap();
        assert_eq!(engine.index().cell_count(), 1);
        assert!(engine.remove(CellId(1)).is_err());

        engine.add_boundary(&[DVec2::ZERO, DVec2::X]).unwrap();
        engine.clear();
        assert!(engine.index().is_empty());
        assert!(engine.index().boundaries().is_empty());
        assert!(engine.step(60.0).unwrap().is_empty());
    }

    #[test]
    fn test_circle_fidelity_separates_cells() {
        let config = PlacementConfig {
            simplification: Simplification::Circles,
            ..PlacementConfig::default()
        };
        let mut engine = RelaxationPlacement::new(&config);
        let a = rod_at(1, 10.0, 10.0, 0.3);
        let b = rod_at(2, 10.2, 10.6, 0.3);
        engine.add(&a).unwrap();
        engine.add(&b).unwrap();

        let updates = engine.step(60.0).unwrap();
        let separation = (updates[1].pose.position - updates[0].pose.position).length();
        assert!(separation > (b.position - a.position).length());
    }

    proptest! {
        #[test]
        fn prop_inner_step_respects_budget(
            offsets in proptest::collection::vec((-2.0f64..2.0, -2.0f64..2.0, 0.0f64..3.1), 1..5),
            budget in 0usize..120,
            converge in any::<bool>(),
        ) {
            let mut engine = engine();
            for (i, (dx, dy, angle)) in offsets.into_iter().enumerate() {
                engine.add(&rod_at(i as u64 + 1, 10.0 + dx, 10.0 + dy, angle)).unwrap();
            }
            let report = engine.inner_step(1.0, budget, converge, 1e-12);
            prop_assert!(report.substeps <= budget);
            prop_assert!(report.total_distance.is_finite());
            for update in engine.index().pose_updates() {
                prop_assert!(update.pose.is_finite());
            }
        }
    }
}
