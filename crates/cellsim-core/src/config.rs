//! Configuration types for the simulation.
//!
//! All values are read when objects are constructed; changing a config after
//! construction has no effect on already built simulators or initializers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Chamber (output canvas) parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChamberConfig {
    /// Width of the simulated chamber in µm
    pub width: f64,
    /// Height of the simulated chamber in µm
    pub height: f64,
    /// Calibration for outputs, µm per pixel
    pub calibration: f64,
    /// Static obstacle polylines, each an open sequence of `[x, y]` points
    pub boundaries: Vec<Vec<[f64; 2]>>,
}

impl Default for ChamberConfig {
    fn default() -> Self {
        Self {
            width: 40.0,
            height: 60.0,
            calibration: 0.065,
            boundaries: Vec::new(),
        }
    }
}

/// Distribution parameters for newly initialized cells
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewCellConfig {
    /// Number of cells to seed the chamber with
    pub count: usize,
    /// Maximum distance from the chamber center for new cells
    pub radius_from_center: f64,
    pub width_mean: f64,
    pub width_std: f64,
    pub width_min: f64,
    pub width_max: f64,
    /// Mean length of subtype one
    pub length1_mean: f64,
    pub length1_std: f64,
    /// Mean length of subtype two
    pub length2_mean: f64,
    pub length2_std: f64,
    pub length_min: f64,
    pub length_max: f64,
    /// Draw the length subtype from both subtypes instead of only the first
    pub mixed_length_subtypes: bool,
    pub bend_overall_lower: f64,
    pub bend_overall_upper: f64,
    pub bend_upper_lower: f64,
    pub bend_upper_upper: f64,
    pub bend_lower_lower: f64,
    pub bend_lower_upper: f64,
    /// Number of fluorescence channels for fluorescent cells
    pub fluorescence_channels: usize,
}

impl Default for NewCellConfig {
    fn default() -> Self {
        Self {
            count: 1,
            radius_from_center: 5.0,
            width_mean: 1.0,
            width_std: 0.1,
            width_min: 0.75,
            width_max: 1.5,
            length1_mean: 2.5,
            length1_std: 0.15,
            length2_mean: 1.25,
            length2_std: 0.15,
            length_min: 0.8,
            length_max: 3.5,
            mixed_length_subtypes: false,
            bend_overall_lower: -0.1,
            bend_overall_upper: 0.1,
            bend_upper_lower: -0.1,
            bend_upper_upper: 0.1,
            bend_lower_lower: -0.1,
            bend_lower_upper: 0.1,
            fluorescence_channels: 1,
        }
    }
}

/// Growth model constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Mean division length of sizer cells (µm)
    pub sizer_division_size_mean: f64,
    pub sizer_division_size_std: f64,
    /// Division sizes are redrawn until they exceed this floor (µm). At
    /// twice the maximum width, halved offspring stay longer than wide.
    pub sizer_division_size_min: f64,
    /// Fixed elongation rate of sizer cells (µm/h)
    pub sizer_elongation_rate: f64,
    /// Mean elongation rate of timer cells (µm/h)
    pub timer_elongation_rate_mean: f64,
    pub timer_elongation_rate_std: f64,
    /// Interval between birth and division of timer cells (h)
    pub timer_division_time_hours: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            sizer_division_size_mean: 3.0,
            sizer_division_size_std: 0.25,
            sizer_division_size_min: 3.0,
            sizer_elongation_rate: 1.5,
            timer_elongation_rate_mean: 1.5,
            timer_elongation_rate_std: 0.25,
            timer_division_time_hours: 1.0,
        }
    }
}

/// Bit generator family used for every random stream of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RngKind {
    ChaCha8,
    ChaCha12,
    ChaCha20,
}

/// Random number generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomConfig {
    /// Seed for reproducibility
    pub seed: u64,
    pub generator: RngKind,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            generator: RngKind::ChaCha12,
        }
    }
}

/// Which placement back-end the simulator drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementEngine {
    /// Iterative relaxation with convergence detection
    Relaxation,
    /// Vertex-limited engine, one solver step per timestep
    Bounded,
    /// No physical placement at all
    Null,
}

/// Collision shape fidelity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Simplification {
    /// Full polygon outline
    Full,
    /// Reduced vertex polygon outline
    Simplified,
    /// Union of circles along the long axis
    Circles,
}

impl Simplification {
    pub fn level(self) -> u8 {
        match self {
            Simplification::Full => 0,
            Simplification::Simplified => 1,
            Simplification::Circles => 2,
        }
    }
}

impl TryFrom<u8> for Simplification {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Simplification::Full),
            1 => Ok(Simplification::Simplified),
            2 => Ok(Simplification::Circles),
            other => Err(Error::Validation(format!(
                "simplification level must be 0, 1 or 2, got {}",
                other
            ))),
        }
    }
}

/// Physical placement parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub engine: PlacementEngine,
    pub simplification: Simplification,
    /// Additional radius around polygon outlines
    pub skin_radius: f64,
    /// Physics substep length in seconds, independent of the caller's timestep
    pub resolution: f64,
    /// Stop relaxing early once motion stays below this rate
    pub converge: bool,
    pub epsilon: f64,
    /// Consecutive quiet checks tolerated before stopping
    pub look_back_threshold: u32,
    /// Substeps between two convergence checks
    pub convergence_check_interval: u32,
    /// Sequential impulse iterations per substep
    pub solver_iterations: u32,
    /// Penetration tolerated without correction
    pub collision_slop: f64,
    /// Fraction of overlap left uncorrected after one second
    pub collision_bias: f64,
    pub body_mass: f64,
    pub body_moment: f64,
    /// Fraction of velocity kept after one second
    pub damping: f64,
    /// Vertex ceiling of the bounded engine
    pub max_polygon_vertices: usize,
    /// Solver iterations of the bounded engine's single step
    pub bounded_iterations: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            engine: PlacementEngine::Relaxation,
            simplification: Simplification::Full,
            skin_radius: 0.05,
            resolution: 1.0,
            converge: true,
            epsilon: 1e-12,
            look_back_threshold: 5,
            convergence_check_interval: 15,
            solver_iterations: 10,
            collision_slop: 0.01,
            collision_bias: 0.9f64.powi(60),
            body_mass: 1.0,
            body_moment: 1.0,
            damping: 1.0,
            max_polygon_vertices: 16,
            bounded_iterations: 30,
        }
    }
}

/// Complete configuration of a simulation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub chamber: ChamberConfig,
    pub new_cells: NewCellConfig,
    pub growth: GrowthConfig,
    pub random: RandomConfig,
    pub placement: PlacementConfig,
    /// Seconds advanced per simulator step
    pub timestep_seconds: f64,
    /// Total simulated time of a run
    pub duration_hours: f64,
}

pub const DEFAULT_TIMESTEP_SECONDS: f64 = 60.0;
pub const DEFAULT_DURATION_HOURS: f64 = 1.0;

impl SimulationConfig {
    /// Defaults with a one minute timestep over one hour.
    /// (`Default` leaves both at zero so partial JSON stays explicit.)
    pub fn standard() -> Self {
        Self {
            timestep_seconds: DEFAULT_TIMESTEP_SECONDS,
            duration_hours: DEFAULT_DURATION_HOURS,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random.seed = seed;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check every parameter combination the simulation relies on
    pub fn validate(&self) -> Result<()> {
        let cells = &self.new_cells;
        if cells.length1_mean <= cells.width_mean || cells.length2_mean <= cells.width_mean {
            return Err(Error::Validation(format!(
                "length means ({}, {}) must exceed the width mean {}",
                cells.length1_mean, cells.length2_mean, cells.width_mean
            )));
        }
        check_range("width bounds", cells.width_min, cells.width_max)?;
        check_range("length bounds", cells.length_min, cells.length_max)?;
        check_range("overall bend", cells.bend_overall_lower, cells.bend_overall_upper)?;
        check_range("upper bend", cells.bend_upper_lower, cells.bend_upper_upper)?;
        check_range("lower bend", cells.bend_lower_lower, cells.bend_lower_upper)?;
        if cells.width_min < 0.0 || cells.length_min < 0.0 {
            return Err(Error::Validation(
                "absolute shape minimums must not be negative".to_string(),
            ));
        }
        if cells.radius_from_center < 0.0 {
            return Err(Error::Validation(
                "radius_from_center must not be negative".to_string(),
            ));
        }
        for (name, std) in [
            ("width_std", cells.width_std),
            ("length1_std", cells.length1_std),
            ("length2_std", cells.length2_std),
            ("sizer_division_size_std", self.growth.sizer_division_size_std),
            ("timer_elongation_rate_std", self.growth.timer_elongation_rate_std),
        ] {
            if !(std >= 0.0) {
                return Err(Error::Validation(format!("{} must not be negative", name)));
            }
        }

        let growth = &self.growth;
        if growth.sizer_division_size_min / 2.0 < cells.width_max {
            return Err(Error::Validation(format!(
                "sizer_division_size_min {} must be at least twice width_max {}",
                growth.sizer_division_size_min, cells.width_max
            )));
        }
        if growth.sizer_division_size_min
            > growth.sizer_division_size_mean + 4.0 * growth.sizer_division_size_std
        {
            return Err(Error::Validation(format!(
                "sizer_division_size_min {} is out of reach of N({}, {})",
                growth.sizer_division_size_min,
                growth.sizer_division_size_mean,
                growth.sizer_division_size_std
            )));
        }
        if !(growth.sizer_elongation_rate >= 0.0) {
            return Err(Error::Validation(
                "sizer_elongation_rate must not be negative".to_string(),
            ));
        }

        let placement = &self.placement;
        if !(placement.resolution > 0.0) {
            return Err(Error::Validation("placement resolution must be positive".to_string()));
        }
        if placement.convergence_check_interval == 0 {
            return Err(Error::Validation(
                "convergence_check_interval must be at least 1".to_string(),
            ));
        }
        if !(placement.body_mass > 0.0) || !(placement.body_moment > 0.0) {
            return Err(Error::Validation("body mass and moment must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&placement.damping) || !(0.0..=1.0).contains(&placement.collision_bias) {
            return Err(Error::Validation(
                "damping and collision_bias must lie within [0, 1]".to_string(),
            ));
        }
        if placement.engine == PlacementEngine::Bounded
            && placement.simplification == Simplification::Full
        {
            return Err(Error::Validation(
                "the bounded placement engine requires simplification level 1 or 2".to_string(),
            ));
        }

        if !(self.timestep_seconds >= 0.0) || !(self.duration_hours >= 0.0) {
            return Err(Error::Validation(
                "timestep and duration must not be negative".to_string(),
            ));
        }
        if self.chamber.boundaries.iter().any(|boundary| boundary.len() < 2) {
            return Err(Error::Validation(
                "every boundary needs at least two points".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_range(name: &str, lower: f64, upper: f64) -> Result<()> {
    if lower > upper {
        return Err(Error::Validation(format!(
            "{}: lower {} exceeds upper {}",
            name, lower, upper
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let chamber = ChamberConfig::default();
        assert_eq!(chamber.width, 40.0);
        assert_eq!(chamber.height, 60.0);

        let placement = PlacementConfig::default();
        assert_eq!(placement.look_back_threshold, 5);
        assert_eq!(placement.convergence_check_interval, 15);
        assert_eq!(placement.simplification, Simplification::Full);

        let random = RandomConfig::default();
        assert_eq!(random.seed, 1);

        let config = SimulationConfig::standard();
        assert_eq!(config.timestep_seconds, 60.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_keep_offspring_longer_than_wide() {
        let growth = GrowthConfig::default();
        let cells = NewCellConfig::default();
        // widths lie strictly below width_max and parents divide strictly
        // above the floor, so half the floor may equal width_max
        assert!(growth.sizer_division_size_min / 2.0 >= cells.width_max);
        assert!(cells.length1_mean > cells.width_mean);
    }

    #[test]
    fn test_validation_rejects_low_division_floor() {
        let mut config = SimulationConfig::standard();
        config.growth.sizer_division_size_min = 2.9;
        assert!(matches!(config.validate(), Err(Error::Validation(_))));

        config.growth.sizer_division_size_min = 3.0;
        config.new_cells.width_max = 1.6;
        assert!(config.validate().is_err());

        config.new_cells.width_max = 1.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_unreachable_division_floor() {
        let mut config = SimulationConfig::standard();
        config.growth.sizer_division_size_min = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "random": { "seed": 7 }, "placement": { "simplification": "circles" } }"#;
        let config = SimulationConfig::from_json_str(json).unwrap();
        assert_eq!(config.random.seed, 7);
        assert_eq!(config.random.generator, RngKind::ChaCha12);
        assert_eq!(config.placement.simplification, Simplification::Circles);
        assert_eq!(config.new_cells.width_mean, 1.0);
    }

    #[test]
    fn test_validation_rejects_short_lengths() {
        let mut config = SimulationConfig::standard();
        config.new_cells.length2_mean = 0.9;
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_bounded_full_polygons() {
        let mut config = SimulationConfig::standard();
        config.placement.engine = PlacementEngine::Bounded;
        assert!(config.validate().is_err());

        config.placement.simplification = Simplification::Simplified;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_simplification_levels() {
        for level in 0..3u8 {
            assert_eq!(Simplification::try_from(level).unwrap().level(), level);
        }
        assert!(Simplification::try_from(3).is_err());
    }
}
