//! Core type definitions for the simulation.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a cell. Assigned once, never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId(pub u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position and orientation of a rigid body in the chamber plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: DVec2,
    pub angle: f64,
}

impl Pose {
    pub fn new(position: DVec2, angle: f64) -> Self {
        Self { position, angle }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.angle.is_finite()
    }
}

/// A resolved pose for a specific cell, produced by a placement pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseUpdate {
    pub cell: CellId,
    pub pose: Pose,
}

/// A circle in cell-local coordinates, used to approximate outlines
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub radius: f64,
    pub offset: DVec2,
}

impl Circle {
    pub fn new(radius: f64, offset: DVec2) -> Self {
        Self { radius, offset }
    }
}

/// An open polyline, e.g. a chamber wall
pub type Polyline = Vec<DVec2>;

const SECONDS_PER_HOUR: f64 = 60.0 * 60.0;

/// Convert hours to seconds
pub fn h_to_s(hours: f64) -> f64 {
    hours * SECONDS_PER_HOUR
}

/// Convert seconds to hours
pub fn s_to_h(seconds: f64) -> f64 {
    seconds / SECONDS_PER_HOUR
}

/// Convert pixels to micrometers, `calibration` being µm per pixel
pub fn pixel_to_um(pixels: f64, calibration: f64) -> f64 {
    pixels * calibration
}

/// Convert micrometers to pixels, `calibration` being µm per pixel
pub fn um_to_pixel(um: f64, calibration: f64) -> f64 {
    um / calibration
}
