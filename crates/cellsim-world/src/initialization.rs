//! Random initial cells.

use crate::cell::Cell;
use crate::growth::{GrowthKind, GrowthModel};
use crate::shape::{Bend, Shape, ShapeKind};
use crate::simulation::Simulator;
use cellsim_core::random::{chain, compose, enforce_bounds, wrap, BoxedSequence};
use cellsim_core::{CellId, Error, Pose, Result, Rrf, SimulationConfig};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What kind of cell the initializer produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellTemplate {
    pub shape: ShapeKind,
    pub growth: GrowthKind,
    pub fluorescent: bool,
}

impl Default for CellTemplate {
    fn default() -> Self {
        Self {
            shape: ShapeKind::Rod,
            growth: GrowthKind::Sizer,
            fluorescent: false,
        }
    }
}

/// Draws shape, pose and fluorescence of new cells from seeded sequences
pub struct CellInitializer {
    length_width: BoxedSequence<(f64, f64)>,
    bend_overall: BoxedSequence<f64>,
    bend_upper: BoxedSequence<f64>,
    bend_lower: BoxedSequence<f64>,
    position: BoxedSequence<DVec2>,
    angle: BoxedSequence<f64>,
    fluorescences: BoxedSequence<Vec<f64>>,
}

fn draw<T>(sequence: &mut BoxedSequence<T>, name: &str) -> Result<T> {
    sequence
        .next()
        .ok_or_else(|| Error::Distribution(format!("{} sequence exhausted", name)))
}

impl CellInitializer {
    /// Spawns, in order: length subtypes, subtype choice, width, the three
    /// bends, position radius and angle, cell angle, fluorescences
    pub fn new(config: &SimulationConfig, rrf: &mut Rrf) -> Result<Self> {
        config.validate()?;
        let cells = &config.new_cells;

        let raw_lengths = enforce_bounds(
            rrf.multivariate_normal(
                vec![cells.length1_mean, cells.length2_mean],
                vec![
                    vec![cells.length1_std.powi(2), 0.0],
                    vec![0.0, cells.length2_std.powi(2)],
                ],
            )?,
            cells.length_min,
            cells.length_max,
        );
        let subtypes = if cells.mixed_length_subtypes { 2 } else { 1 };
        let choice = rrf.integers(0, subtypes)?;
        let mut lengths = compose(
            |(raw, choice): (Vec<f64>, i64)| raw[choice as usize],
            (raw_lengths, choice),
        );
        let mut widths = enforce_bounds(
            rrf.normal(cells.width_mean, cells.width_std)?,
            cells.width_min,
            cells.width_max,
        );
        let length_width = chain(move || {
            let length = lengths.next()?;
            let width = widths.next()?;
            (length > width).then_some((length, width))
        });

        let bend_overall = rrf.uniform(cells.bend_overall_lower, cells.bend_overall_upper)?;
        let bend_upper = rrf.uniform(cells.bend_upper_lower, cells.bend_upper_upper)?;
        let bend_lower = rrf.uniform(cells.bend_lower_lower, cells.bend_lower_upper)?;

        let center = DVec2::new(config.chamber.width / 2.0, config.chamber.height / 2.0);
        let position = compose(
            move |(radius, angle): (f64, f64)| center + DVec2::from_angle(angle) * radius,
            (
                rrf.uniform(0.0, cells.radius_from_center)?,
                wrap(rrf.uniform(0.0, 360.0)?, f64::to_radians),
            ),
        );
        let angle = wrap(rrf.uniform(0.0, 360.0)?, f64::to_radians);
        let fluorescences = rrf.uniform_array(0.0, 360.0, cells.fluorescence_channels)?;

        Ok(Self {
            length_width: Box::new(length_width),
            bend_overall: Box::new(bend_overall),
            bend_upper: Box::new(bend_upper),
            bend_lower: Box::new(bend_lower),
            position: Box::new(position),
            angle: Box::new(angle),
            fluorescences: Box::new(fluorescences),
        })
    }

    /// The next unborn cell; every sequence advances by one draw whatever
    /// the template uses
    pub fn next_cell(&mut self, template: &CellTemplate, id: CellId) -> Result<Cell> {
        let (length, width) = draw(&mut self.length_width, "length/width")?;
        let bend = Bend {
            overall: draw(&mut self.bend_overall, "overall bend")?,
            upper: draw(&mut self.bend_upper, "upper bend")?,
            lower: draw(&mut self.bend_lower, "lower bend")?,
        };
        let position = draw(&mut self.position, "position")?;
        let angle = draw(&mut self.angle, "angle")?;
        let fluorescences = draw(&mut self.fluorescences, "fluorescence")?;

        let shape = match template.shape {
            ShapeKind::Rod => Shape::rod(length, width),
            ShapeKind::BentRod => Shape::bent_rod(length, width, bend),
            ShapeKind::Coccoid => Shape::coccoid(length),
            ShapeKind::Square => Shape::new(ShapeKind::Square, length, length),
            kind @ (ShapeKind::Ellipsoid | ShapeKind::Rectangle) => {
                Shape::new(kind, length, width)
            }
        };
        shape.validate()?;

        let cell = Cell::new(
            id,
            shape,
            GrowthModel::unborn(template.growth),
            Pose::new(position, angle),
        );
        Ok(if template.fluorescent {
            cell.with_fluorescences(fluorescences)
        } else {
            cell
        })
    }

    /// Birth `count` new cells and queue them on the simulator
    pub fn populate(
        &mut self,
        simulator: &mut Simulator,
        count: usize,
        template: &CellTemplate,
    ) -> Result<Vec<CellId>> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let cell = self.next_cell(template, simulator.new_cell_id())?;
            ids.push(simulator.introduce(cell));
        }

        info!(
            count,
            shape = ?template.shape,
            growth = ?template.growth,
            "Chamber populated"
        );
        Ok(ids)
    }
}
