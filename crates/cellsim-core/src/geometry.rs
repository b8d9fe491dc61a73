//! Planar and solid geometry helpers used to rasterize cell outlines.

use glam::{DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// How many points a rasterized line or arc receives
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Sampling {
    /// Roughly one point per `interval`, but never fewer than `minimum`
    Adaptive { interval: f64, minimum: usize },
    /// Exactly this many points
    Fixed(usize),
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling::Adaptive {
            interval: 0.1,
            minimum: 10,
        }
    }
}

impl Sampling {
    /// `Fixed(count)` when simplifying, the adaptive default otherwise
    pub fn simplified_or_default(simplify: bool, count: usize) -> Self {
        if simplify {
            Sampling::Fixed(count)
        } else {
            Sampling::default()
        }
    }
}

/// Triangulated surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub points: Vec<DVec3>,
    pub triangles: Vec<[usize; 3]>,
}

/// `num` evenly spaced values from `start` to `stop`, both inclusive
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Rasterize the segment from `start` to `stop`, endpoints included
pub fn line(start: DVec2, stop: DVec2, sampling: Sampling) -> Vec<DVec2> {
    let delta = stop - start;
    let count = match sampling {
        Sampling::Fixed(count) => count,
        Sampling::Adaptive { interval, minimum } => {
            ((delta.length() / interval) as usize + 1).max(minimum)
        }
    };

    linspace(0.0, 1.0, count)
        .into_iter()
        .map(|t| start + delta * t)
        .collect()
}

/// Rasterize an arc around the origin; angles are in degrees
pub fn circle_segment(radius: f64, start: f64, stop: f64, sampling: Sampling) -> Vec<DVec2> {
    let (start, stop) = (start.to_radians(), stop.to_radians());
    let count = match sampling {
        Sampling::Fixed(count) => count,
        Sampling::Adaptive { interval, minimum } => {
            let angular_interval = (interval / radius).atan();
            (((stop - start) / angular_interval) as usize).max(minimum)
        }
    };

    linspace(start, stop, count)
        .into_iter()
        .map(|angle| radius * DVec2::new(angle.cos(), angle.sin()))
        .collect()
}

/// Bend points by a parabola: `y += factor * (x² - max(x²))`
pub fn parabolic_deformation(points: &mut [DVec2], factor: f64) {
    let max_square = points
        .iter()
        .map(|p| p.x * p.x)
        .fold(f64::NEG_INFINITY, f64::max);

    for point in points.iter_mut() {
        point.y += factor * (point.x * point.x - max_square);
    }
}

/// Same deformation applied in the xy plane of 3D points
pub fn parabolic_deformation3d(points: &mut [DVec3], factor: f64) {
    let max_square = points
        .iter()
        .map(|p| p.x * p.x)
        .fold(f64::NEG_INFINITY, f64::max);

    for point in points.iter_mut() {
        point.y += factor * (point.x * point.x - max_square);
    }
}

/// Rotate counter-clockwise around the origin by `angle` radians
pub fn rotate(points: &[DVec2], angle: f64) -> Vec<DVec2> {
    let rotation = DVec2::from_angle(angle);
    points.iter().map(|p| rotation.rotate(*p)).collect()
}

pub fn shift(points: &[DVec2], vector: DVec2) -> Vec<DVec2> {
    points.iter().map(|p| *p + vector).collect()
}

pub fn add_empty_third_dimension(points: &[DVec2]) -> Vec<DVec3> {
    points.iter().map(|p| p.extend(0.0)).collect()
}

/// Rotate around `axis` by `angle` radians
pub fn rotate3d(points: &[DVec3], angle: f64, axis: DVec3) -> Vec<DVec3> {
    let rotation = DMat3::from_axis_angle(axis.normalize_or_zero(), angle);
    points.iter().map(|p| rotation * *p).collect()
}

/// Sweep an outline around the x axis into a solid of revolution.
///
/// `clean` drops points at or below the axis and sweeps a full turn; without
/// it only half a turn is swept. `close_ends` pins both ends onto the axis.
pub fn rotate_and_mesh(points: &[DVec3], steps: usize, clean: bool, close_ends: bool) -> Mesh {
    let eps = f64::EPSILON;

    let mut profile: Vec<DVec3> = if clean {
        points.iter().copied().filter(|p| p.y > eps).collect()
    } else {
        points.to_vec()
    };

    if profile.is_empty() || steps == 0 {
        return Mesh::default();
    }

    if close_ends {
        let first = DVec3::new(profile[0].x + eps, 0.0, 0.0);
        let last = DVec3::new(profile[profile.len() - 1].x - eps, 0.0, 0.0);
        profile.insert(0, first);
        profile.push(last);
    }

    let max_angle = if clean { 360.0f64 } else { 180.0f64 }.to_radians();
    let mut all_points = Vec::with_capacity(profile.len() * steps);
    for angle in linspace(0.0, max_angle, steps) {
        all_points.extend(rotate3d(&profile, angle, DVec3::X));
    }

    let n = profile.len();
    let mut triangles = Vec::with_capacity(2 * steps * n.saturating_sub(1));
    let mut last = all_points.len() - n;
    for step in 0..steps {
        let base = step * n;
        for i in 0..n - 1 {
            triangles.push([last + i, base + i + 1, last + i + 1]);
            triangles.push([base + i, base + i + 1, last + i]);
        }
        last = base;
    }

    Mesh {
        points: all_points,
        triangles,
    }
}

/// Convex hull in counter-clockwise order, without repeating the first point
pub fn convex_hull(points: &[DVec2]) -> Vec<DVec2> {
    let mut sorted: Vec<DVec2> = points.iter().copied().filter(|p| p.is_finite()).collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();

    if sorted.len() < 3 {
        return sorted;
    }

    let cross = |o: DVec2, a: DVec2, b: DVec2| (a - o).perp_dot(b - o);

    let mut lower: Vec<DVec2> = Vec::new();
    for &p in &sorted {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<DVec2> = Vec::new();
    for &p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}
