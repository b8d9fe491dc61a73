//! Growth models deciding how fast a cell elongates and when it divides.

use cellsim_core::random::{enforce_bounds, BoxedSequence};
use cellsim_core::{h_to_s, GrowthConfig, Result, Rrf};
use serde::{Deserialize, Serialize};

/// Shared random streams growth models draw from at birth.
///
/// One stream per drawn quantity, shared by every cell of the run, so the
/// n-th birth always receives the n-th draw.
pub struct GrowthSource {
    division_size: BoxedSequence<f64>,
    elongation_rate: BoxedSequence<f64>,
    sizer_elongation_rate: f64,
    timer_division_time: f64,
}

impl GrowthSource {
    /// Spawns the division size stream, then the elongation rate stream.
    ///
    /// Division sizes stay above the configured floor and timer elongation
    /// rates stay positive.
    pub fn new(config: &GrowthConfig, rrf: &mut Rrf) -> Result<Self> {
        let division_size = enforce_bounds(
            rrf.normal(
                config.sizer_division_size_mean,
                config.sizer_division_size_std,
            )?,
            config.sizer_division_size_min,
            f64::INFINITY,
        );
        let elongation_rate = enforce_bounds(
            rrf.normal(
                config.timer_elongation_rate_mean,
                config.timer_elongation_rate_std,
            )?,
            0.0,
            f64::INFINITY,
        );

        Ok(Self {
            division_size: Box::new(division_size),
            elongation_rate: Box::new(elongation_rate),
            sizer_elongation_rate: config.sizer_elongation_rate,
            timer_division_time: h_to_s(config.timer_division_time_hours),
        })
    }

    fn next_division_size(&mut self) -> f64 {
        self.division_size.next().unwrap_or(f64::INFINITY)
    }

    fn next_elongation_rate(&mut self) -> f64 {
        self.elongation_rate.next().unwrap_or(0.0)
    }
}

/// Per-cell growth behavior
pub trait GrowthBehavior {
    /// Draw the model's per-cell parameters
    fn birth(&mut self, source: &mut GrowthSource);

    /// Elongation in µm per hour
    fn elongation_rate(&self) -> f64;

    /// Whether a cell of `length`, born at `birth_time`, divides at `now`
    fn should_divide(&self, length: f64, birth_time: f64, now: f64) -> bool;

    fn offspring_length(&self, parent_length: f64) -> f64 {
        parent_length / 2.0
    }
}

/// Divides once longer than a threshold drawn at birth
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sizer {
    pub division_size: f64,
    pub elongation_rate: f64,
}

impl GrowthBehavior for Sizer {
    fn birth(&mut self, source: &mut GrowthSource) {
        self.division_size = source.next_division_size();
        self.elongation_rate = source.sizer_elongation_rate;
    }

    fn elongation_rate(&self) -> f64 {
        self.elongation_rate
    }

    fn should_divide(&self, length: f64, _birth_time: f64, _now: f64) -> bool {
        length > self.division_size
    }
}

/// Divides a fixed time after birth, elongating at a rate drawn at birth
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub elongation_rate: f64,
    /// Seconds
    pub division_time: f64,
}

impl GrowthBehavior for Timer {
    fn birth(&mut self, source: &mut GrowthSource) {
        self.elongation_rate = source.next_elongation_rate();
        self.division_time = source.timer_division_time;
    }

    fn elongation_rate(&self) -> f64 {
        self.elongation_rate
    }

    fn should_divide(&self, _length: f64, birth_time: f64, now: f64) -> bool {
        now > birth_time + self.division_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthKind {
    Inert,
    Sizer,
    Timer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum GrowthModel {
    /// Never grows nor divides
    Inert,
    Sizer(Sizer),
    Timer(Timer),
}

impl GrowthModel {
    /// Model with its parameters not drawn yet
    pub fn unborn(kind: GrowthKind) -> Self {
        match kind {
            GrowthKind::Inert => GrowthModel::Inert,
            GrowthKind::Sizer => GrowthModel::Sizer(Sizer::default()),
            GrowthKind::Timer => GrowthModel::Timer(Timer::default()),
        }
    }

    pub fn kind(&self) -> GrowthKind {
        match self {
            GrowthModel::Inert => GrowthKind::Inert,
            GrowthModel::Sizer(_) => GrowthKind::Sizer,
            GrowthModel::Timer(_) => GrowthKind::Timer,
        }
    }
}

impl GrowthBehavior for GrowthModel {
    fn birth(&mut self, source: &mut GrowthSource) {
        match self {
            GrowthModel::Inert => {}
            GrowthModel::Sizer(sizer) => sizer.birth(source),
            GrowthModel::Timer(timer) => timer.birth(source),
        }
    }

    fn elongation_rate(&self) -> f64 {
        match self {
            GrowthModel::Inert => 0.0,
            GrowthModel::Sizer(sizer) => sizer.elongation_rate(),
            GrowthModel::Timer(timer) => timer.elongation_rate(),
        }
    }

    fn should_divide(&self, length: f64, birth_time: f64, now: f64) -> bool {
        match self {
            GrowthModel::Inert => false,
            GrowthModel::Sizer(sizer) => sizer.should_divide(length, birth_time, now),
            GrowthModel::Timer(timer) => timer.should_divide(length, birth_time, now),
        }
    }
}
