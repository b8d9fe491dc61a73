//! Cell outlines and their physical approximations.

use cellsim_core::geometry::{
    add_empty_third_dimension, circle_segment, line, linspace, parabolic_deformation,
    parabolic_deformation3d, rotate, rotate3d, rotate_and_mesh, shift, Mesh, Sampling,
};
use cellsim_core::{Circle, Error, Pose, Result};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

const SIMPLIFIED_LINE_POINTS: usize = 3;
const SIMPLIFIED_ARC_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rod,
    BentRod,
    Coccoid,
    Ellipsoid,
    Rectangle,
    Square,
}

impl ShapeKind {
    /// Rod-like shapes must always be longer than wide
    pub fn is_rod_like(self) -> bool {
        matches!(self, ShapeKind::Rod | ShapeKind::BentRod)
    }
}

/// Parabolic bend factors of a bent rod
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bend {
    pub overall: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Shape parameters of a cell, in µm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub length: f64,
    pub width: f64,
    #[serde(default)]
    pub bend: Bend,
}

impl Shape {
    pub fn new(kind: ShapeKind, length: f64, width: f64) -> Self {
        Self {
            kind,
            length,
            width,
            bend: Bend::default(),
        }
    }

    pub fn rod(length: f64, width: f64) -> Self {
        Self::new(ShapeKind::Rod, length, width)
    }

    pub fn bent_rod(length: f64, width: f64, bend: Bend) -> Self {
        Self {
            bend,
            ..Self::new(ShapeKind::BentRod, length, width)
        }
    }

    pub fn coccoid(diameter: f64) -> Self {
        Self::new(ShapeKind::Coccoid, diameter, diameter)
    }

    /// Check the shape can be outlined
    pub fn validate(&self) -> Result<()> {
        if !(self.length.is_finite() && self.width.is_finite()) {
            return Err(Error::DegenerateShape(format!(
                "non-finite dimensions {}x{}",
                self.length, self.width
            )));
        }
        if self.length <= 0.0 {
            return Err(Error::DegenerateShape(format!(
                "length {} must be positive",
                self.length
            )));
        }
        let needs_width = !matches!(self.kind, ShapeKind::Coccoid | ShapeKind::Square);
        if needs_width && self.width <= 0.0 {
            return Err(Error::DegenerateShape(format!(
                "width {} must be positive",
                self.width
            )));
        }
        if self.kind.is_rod_like() && self.length <= self.width {
            return Err(Error::InvalidShape {
                length: self.length,
                width: self.width,
            });
        }
        Ok(())
    }

    fn effective_width(&self) -> f64 {
        match self.kind {
            ShapeKind::Coccoid | ShapeKind::Square => self.length,
            _ => self.width,
        }
    }

    /// Lower side, right cap, upper side, left cap of a capsule
    fn rod_parts(&self, simplify: bool) -> [Vec<DVec2>; 4] {
        let radius = self.width / 2.0;
        let half_length = (self.length - self.width) / 2.0;
        let line_sampling = Sampling::simplified_or_default(simplify, SIMPLIFIED_LINE_POINTS);
        let arc_sampling = Sampling::simplified_or_default(simplify, SIMPLIFIED_ARC_POINTS);

        let lower = line(
            DVec2::new(-half_length, -radius),
            DVec2::new(half_length, -radius),
            line_sampling,
        );
        let upper = line(
            DVec2::new(half_length, radius),
            DVec2::new(-half_length, radius),
            line_sampling,
        );
        let right = shift(
            &circle_segment(radius, -90.0, 90.0, arc_sampling),
            DVec2::new(half_length, 0.0),
        );
        let left = shift(
            &circle_segment(radius, 90.0, 270.0, arc_sampling),
            DVec2::new(-half_length, 0.0),
        );

        [lower, right, upper, left]
    }

    fn round_points(&self, simplify: bool) -> Vec<DVec2> {
        let radius = self.length / 2.0;
        let sampling = Sampling::simplified_or_default(simplify, SIMPLIFIED_ARC_POINTS);
        let mut points = circle_segment(radius, -90.0, 90.0, sampling);
        points.extend(circle_segment(radius, 90.0, 270.0, sampling));
        points
    }

    fn rectangle_points(&self, simplify: bool) -> Vec<DVec2> {
        let half_length = self.length / 2.0;
        let half_width = self.effective_width() / 2.0;
        let sampling = Sampling::simplified_or_default(simplify, SIMPLIFIED_LINE_POINTS);
        let corners = [
            DVec2::new(half_length, half_width),
            DVec2::new(-half_length, half_width),
            DVec2::new(-half_length, -half_width),
            DVec2::new(half_length, -half_width),
        ];

        corners
            .iter()
            .zip(corners.iter().cycle().skip(1))
            .flat_map(|(start, stop)| line(*start, *stop, sampling))
            .collect()
    }

    /// Upper and lower halves bend separately, then the whole outline
    fn bend_points(&self, points: &mut [DVec2]) {
        let mut upper: Vec<usize> = Vec::new();
        let mut lower: Vec<usize> = Vec::new();
        for (index, point) in points.iter().enumerate() {
            if point.y > 0.0 {
                upper.push(index);
            } else if point.y < 0.0 {
                lower.push(index);
            }
        }

        for (indices, factor) in [(upper, self.bend.upper), (lower, self.bend.lower)] {
            let mut subset: Vec<DVec2> = indices.iter().map(|&i| points[i]).collect();
            parabolic_deformation(&mut subset, factor);
            for (&i, point) in indices.iter().zip(subset) {
                points[i] = point;
            }
        }

        parabolic_deformation(points, self.bend.overall);
    }

    fn bend_points3d(&self, points: &mut [DVec3]) {
        let mut upper: Vec<usize> = Vec::new();
        let mut lower: Vec<usize> = Vec::new();
        for (index, point) in points.iter().enumerate() {
            if point.y > 0.0 {
                upper.push(index);
            } else if point.y < 0.0 {
                lower.push(index);
            }
        }

        for (indices, factor) in [(upper, self.bend.upper), (lower, self.bend.lower)] {
            let mut subset: Vec<DVec3> = indices.iter().map(|&i| points[i]).collect();
            parabolic_deformation3d(&mut subset, factor);
            for (&i, point) in indices.iter().zip(subset) {
                points[i] = point;
            }
        }

        parabolic_deformation3d(points, self.bend.overall);
    }

    /// Outline in body coordinates, centered on the origin with the long
    /// axis along x
    pub fn raw_points(&self, simplify: bool) -> Result<Vec<DVec2>> {
        self.validate()?;

        let points = match self.kind {
            ShapeKind::Rod => self.rod_parts(simplify).concat(),
            ShapeKind::BentRod => {
                let mut points = self.rod_parts(simplify).concat();
                self.bend_points(&mut points);
                points
            }
            ShapeKind::Coccoid => self.round_points(simplify),
            ShapeKind::Ellipsoid => {
                let scale = self.width / self.length;
                let mut points = self.round_points(simplify);
                for point in points.iter_mut() {
                    point.y *= scale;
                }
                points
            }
            ShapeKind::Rectangle | ShapeKind::Square => self.rectangle_points(simplify),
        };

        Ok(points)
    }

    /// Circles approximating the outline, in body coordinates
    pub fn approximation_circles(&self) -> Result<Vec<Circle>> {
        self.validate()?;

        if self.kind == ShapeKind::Coccoid {
            return Ok(vec![Circle::new(self.length / 2.0, DVec2::ZERO)]);
        }

        let radius = self.effective_width() / 2.0;
        let straight = (self.length - self.effective_width()).max(0.0);
        let half_length = straight / 2.0;
        let count = ((2.0 * (straight / radius).floor()) as usize).max(1);

        let mut offsets: Vec<DVec2> = if count == 1 {
            vec![DVec2::ZERO]
        } else {
            linspace(-half_length, half_length, count)
                .into_iter()
                .map(|x| DVec2::new(x, 0.0))
                .collect()
        };

        if self.kind == ShapeKind::BentRod {
            parabolic_deformation(&mut offsets, self.bend.overall);
        }

        Ok(offsets
            .into_iter()
            .map(|offset| Circle::new(radius, offset))
            .collect())
    }

    /// Solid of revolution around the long axis
    pub fn raw_points3d(&self, steps: usize, simplify: bool) -> Result<Mesh> {
        if self.kind == ShapeKind::BentRod {
            self.validate()?;
            let outline = self.rod_parts(simplify).concat();
            let mut mesh = rotate_and_mesh(&add_empty_third_dimension(&outline), steps, true, true);
            self.bend_points3d(&mut mesh.points);
            return Ok(mesh);
        }

        let outline = self.raw_points(simplify)?;
        Ok(rotate_and_mesh(
            &add_empty_third_dimension(&outline),
            steps,
            true,
            true,
        ))
    }

    /// Outline placed at `pose` in chamber coordinates
    pub fn points_on_canvas(&self, pose: &Pose) -> Result<Vec<DVec2>> {
        let points = self.raw_points(false)?;
        Ok(shift(&rotate(&points, pose.angle), pose.position))
    }

    pub fn points3d_on_canvas(&self, pose: &Pose, steps: usize, simplify: bool) -> Result<Mesh> {
        let mesh = self.raw_points3d(steps, simplify)?;
        let offset = pose.position.extend(0.0);
        Ok(Mesh {
            points: rotate3d(&mesh.points, pose.angle, DVec3::Z)
                .into_iter()
                .map(|point| point + offset)
                .collect(),
            triangles: mesh.triangles,
        })
    }
}

/// Centers of the two offspring of a cell at `pose`, a quarter length to
/// either side along the cell axis
pub fn division_positions(pose: &Pose, length: f64) -> [DVec2; 2] {
    let axis = DVec2::from_angle(pose.angle);
    let quarter = length / 4.0;
    [pose.position - axis * quarter, pose.position + axis * quarter]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    #[test]
    fn test_rod_rejects_short_length() {
        let shape = Shape::rod(1.0, 1.0);
        assert!(matches!(
            shape.raw_points(false),
            Err(Error::InvalidShape { .. })
        ));
        assert!(matches!(
            Shape::rod(0.5, 1.0).approximation_circles(),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_degenerate_dimensions() {
        assert!(matches!(
            Shape::coccoid(0.0).validate(),
            Err(Error::DegenerateShape(_))
        ));
        assert!(matches!(
            Shape::new(ShapeKind::Ellipsoid, 2.0, f64::NAN).validate(),
            Err(Error::DegenerateShape(_))
        ));
    }

    #[test]
    fn test_simplified_rod_outline() {
        let points = Shape::rod(3.0, 1.0).raw_points(true).unwrap();
        assert_eq!(points.len(), 2 * 3 + 2 * 5);

        // first point starts the lower side, the extremes reach the cap tips
        assert!((points[0] - DVec2::new(-1.0, -0.5)).length() < 1e-12);
        let max_x = points.iter().map(|p| p.x).fold(f64::MIN, f64::max);
        let max_y = points.iter().map(|p| p.y).fold(f64::MIN, f64::max);
        assert!((max_x - 1.5).abs() < 1e-12);
        assert!((max_y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_full_rod_outline_is_denser() {
        let shape = Shape::rod(3.0, 1.0);
        let full = shape.raw_points(false).unwrap();
        let simple = shape.raw_points(true).unwrap();
        assert!(full.len() > simple.len());
    }

    #[test]
    fn test_bent_rod_bends_outline() {
        let bend = Bend {
            overall: 0.1,
            upper: 0.0,
            lower: 0.0,
        };
        let straight = Shape::rod(3.0, 1.0).raw_points(true).unwrap();
        let bent = Shape::bent_rod(3.0, 1.0, bend).raw_points(true).unwrap();
        assert_eq!(straight.len(), bent.len());

        // points at the far ends keep their y, central points sag
        let center = bent
            .iter()
            .zip(&straight)
            .find(|(_, s)| s.x.abs() < 1e-12)
            .unwrap();
        assert!(center.0.y < center.1.y);
    }

    #[test]
    fn test_zero_bend_matches_rod() {
        let rod = Shape::rod(2.5, 1.0).raw_points(false).unwrap();
        let bent = Shape::bent_rod(2.5, 1.0, Bend::default())
            .raw_points(false)
            .unwrap();
        assert_eq!(rod, bent);
    }

    #[test]
    fn test_approximation_circles() {
        let circles = Shape::rod(3.0, 1.0).approximation_circles().unwrap();
        // straight part 2.0, radius 0.5: 2 * floor(4) circles
        assert_eq!(circles.len(), 8);
        assert!(circles.iter().all(|c| c.radius == 0.5));
        assert!((circles[0].offset.x + 1.0).abs() < 1e-12);
        assert!((circles[7].offset.x - 1.0).abs() < 1e-12);

        let single = Shape::rod(1.2, 1.0).approximation_circles().unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].offset, DVec2::ZERO);

        let coccoid = Shape::coccoid(1.0).approximation_circles().unwrap();
        assert_eq!(coccoid, vec![Circle::new(0.5, DVec2::ZERO)]);
    }

    #[test]
    fn test_bent_rod_circles_follow_overall_bend() {
        let bend = Bend {
            overall: 0.2,
            upper: 0.5,
            lower: -0.5,
        };
        let circles = Shape::bent_rod(3.0, 1.0, bend).approximation_circles().unwrap();
        assert!(circles[0].offset.y.abs() < 1e-12);
        assert!(circles[3].offset.y < 0.0);
    }

    #[test]
    fn test_ellipsoid_and_square_outlines() {
        let ellipsoid = Shape::new(ShapeKind::Ellipsoid, 2.0, 1.0)
            .raw_points(true)
            .unwrap();
        let max_y = ellipsoid.iter().map(|p| p.y).fold(f64::MIN, f64::max);
        let max_x = ellipsoid.iter().map(|p| p.x).fold(f64::MIN, f64::max);
        assert!((max_y - 0.5).abs() < 1e-12);
        assert!((max_x - 1.0).abs() < 1e-12);

        let square = Shape::new(ShapeKind::Square, 2.0, 0.5).raw_points(true).unwrap();
        assert_eq!(square.len(), 4 * 3);
        assert!(square.iter().all(|p| p.x.abs() <= 1.0 + 1e-12 && p.y.abs() <= 1.0 + 1e-12));
        assert!(square.iter().any(|p| (p.y - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_points_on_canvas() {
        let shape = Shape::rod(3.0, 1.0);
        let pose = Pose::new(DVec2::new(10.0, 20.0), PI / 2.0);
        let points = shape.points_on_canvas(&pose).unwrap();
        let max_y = points.iter().map(|p| p.y).fold(f64::MIN, f64::max);
        let max_x = points.iter().map(|p| p.x).fold(f64::MIN, f64::max);
        assert!((max_y - 21.5).abs() < 1e-9);
        assert!((max_x - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_mesh_of_rod() {
        let shape = Shape::bent_rod(3.0, 1.0, Bend::default());
        let mesh = shape.raw_points3d(8, true).unwrap();
        assert!(!mesh.points.is_empty());
        assert!(mesh
            .triangles
            .iter()
            .flatten()
            .all(|&index| index < mesh.points.len()));

        let placed = shape
            .points3d_on_canvas(&Pose::new(DVec2::new(5.0, 5.0), 0.0), 8, true)
            .unwrap();
        assert_eq!(placed.points.len(), mesh.points.len());
        assert!((placed.points[0] - mesh.points[0] - DVec3::new(5.0, 5.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_division_positions() {
        let pose = Pose::new(DVec2::new(1.0, 1.0), 0.0);
        let [a, b] = division_positions(&pose, 4.0);
        assert!((a - DVec2::new(0.0, 1.0)).length() < 1e-12);
        assert!((b - DVec2::new(2.0, 1.0)).length() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_rod_outline_within_bounds(width in 0.5f64..1.5, extra in 0.01f64..3.0) {
            let length = width + extra;
            let points = Shape::rod(length, width).raw_points(false).unwrap();
            for p in points {
                prop_assert!(p.x.abs() <= length / 2.0 + 1e-9);
                prop_assert!(p.y.abs() <= width / 2.0 + 1e-9);
            }
        }

        #[test]
        fn prop_division_positions_are_symmetric(
            x in -50.0f64..50.0, y in -50.0f64..50.0,
            angle in 0.0f64..6.3, length in 0.5f64..5.0,
        ) {
            let pose = Pose::new(DVec2::new(x, y), angle);
            let [a, b] = division_positions(&pose, length);
            prop_assert!(((a + b) / 2.0 - pose.position).length() < 1e-9);
            prop_assert!(((a - b).length() - length / 2.0).abs() < 1e-9);
        }
    }
}
