//! Deterministic 2D rigid-body space.
//!
//! Bodies carry rounded convex shapes. Each step damps velocities, gathers
//! contacts (sort-and-sweep broadphase, then [`collide`]), runs a fixed
//! number of sequential impulse iterations and integrates positions.
//! Penetration is corrected through separate bias velocities that are
//! discarded after integration, so overlap resolution does not leave bodies
//! drifting. Bodies and shapes live in ordered maps keyed by handles issued in
//! insertion order, making every pass reproducible.

use super::collision::collide;
use cellsim_core::geometry::convex_hull;
use cellsim_core::{Error, PlacementConfig, Result};
use glam::DVec2;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    kind: BodyKind,
    pub position: DVec2,
    pub angle: f64,
    pub velocity: DVec2,
    pub angular_velocity: f64,
    bias_velocity: DVec2,
    bias_angular_velocity: f64,
    inverse_mass: f64,
    inverse_moment: f64,
}

impl Body {
    pub fn dynamic(mass: f64, moment: f64, position: DVec2, angle: f64) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            position,
            angle,
            velocity: DVec2::ZERO,
            angular_velocity: 0.0,
            bias_velocity: DVec2::ZERO,
            bias_angular_velocity: 0.0,
            inverse_mass: if mass > 0.0 { 1.0 / mass } else { 0.0 },
            inverse_moment: if moment > 0.0 { 1.0 / moment } else { 0.0 },
        }
    }

    /// Immovable body, e.g. a chamber wall
    pub fn fixed() -> Self {
        Self {
            kind: BodyKind::Static,
            inverse_mass: 0.0,
            inverse_moment: 0.0,
            ..Self::dynamic(0.0, 0.0, DVec2::ZERO, 0.0)
        }
    }

    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    pub fn is_static(&self) -> bool {
        self.kind == BodyKind::Static
    }

    fn velocity_at(&self, arm: DVec2) -> DVec2 {
        self.velocity + arm.perp() * self.angular_velocity
    }

    fn bias_velocity_at(&self, arm: DVec2) -> DVec2 {
        self.bias_velocity + arm.perp() * self.bias_angular_velocity
    }

    fn apply_impulse(&mut self, impulse: DVec2, arm: DVec2) {
        self.velocity += impulse * self.inverse_mass;
        self.angular_velocity += self.inverse_moment * arm.perp_dot(impulse);
    }

    fn apply_bias_impulse(&mut self, impulse: DVec2, arm: DVec2) {
        self.bias_velocity += impulse * self.inverse_mass;
        self.bias_angular_velocity += self.inverse_moment * arm.perp_dot(impulse);
    }
}

/// Collision shape in body coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDef {
    pub vertices: Vec<DVec2>,
    pub radius: f64,
}

impl ShapeDef {
    pub fn circle(radius: f64, offset: DVec2) -> Self {
        Self {
            vertices: vec![offset],
            radius,
        }
    }

    pub fn segment(start: DVec2, stop: DVec2, radius: f64) -> Self {
        Self {
            vertices: vec![start, stop],
            radius,
        }
    }

    /// Convex hull of `points`, rounded by `radius`
    pub fn polygon(points: &[DVec2], radius: f64) -> Result<Self> {
        let vertices = convex_hull(points);
        if vertices.len() < 3 {
            return Err(Error::DegenerateShape(format!(
                "polygon hull has only {} vertices",
                vertices.len()
            )));
        }
        Ok(Self { vertices, radius })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}

#[derive(Debug, Clone)]
struct Collider {
    body: BodyHandle,
    def: ShapeDef,
    world: Vec<DVec2>,
    lower: DVec2,
    upper: DVec2,
}

impl Collider {
    fn update(&mut self, body: &Body) {
        let rotation = DVec2::from_angle(body.angle);
        self.world = self
            .def
            .vertices
            .iter()
            .map(|v| body.position + rotation.rotate(*v))
            .collect();

        let (lower, upper) = self.world.iter().fold(
            (DVec2::splat(f64::INFINITY), DVec2::splat(f64::NEG_INFINITY)),
            |(lower, upper), v| (lower.min(*v), upper.max(*v)),
        );
        self.lower = lower - DVec2::splat(self.def.radius);
        self.upper = upper + DVec2::splat(self.def.radius);
    }

    fn overlaps(&self, other: &Collider) -> bool {
        self.lower.x <= other.upper.x
            && other.lower.x <= self.upper.x
            && self.lower.y <= other.upper.y
            && other.lower.y <= self.upper.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceSettings {
    /// Solver iterations per step
    pub iterations: u32,
    /// Penetration left uncorrected
    pub collision_slop: f64,
    /// Fraction of penetration left after one second
    pub collision_bias: f64,
    /// Fraction of velocity kept after one second
    pub damping: f64,
}

impl SpaceSettings {
    pub fn from_config(config: &PlacementConfig, iterations: u32) -> Self {
        Self {
            iterations,
            collision_slop: config.collision_slop,
            collision_bias: config.collision_bias,
            damping: config.damping,
        }
    }
}

impl Default for SpaceSettings {
    fn default() -> Self {
        Self::from_config(&PlacementConfig::default(), PlacementConfig::default().solver_iterations)
    }
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    a: usize,
    b: usize,
    normal: DVec2,
    arm_a: DVec2,
    arm_b: DVec2,
    normal_mass: f64,
    bias: f64,
    impulse: f64,
    bias_impulse: f64,
}

impl Contact {
    fn solve(&mut self, bodies: &mut [Body]) {
        let (mut a, mut b) = (bodies[self.a], bodies[self.b]);

        let relative_bias = b.bias_velocity_at(self.arm_b) - a.bias_velocity_at(self.arm_a);
        let delta = (self.bias - relative_bias.dot(self.normal)) * self.normal_mass;
        let previous = self.bias_impulse;
        self.bias_impulse = (previous + delta).max(0.0);
        let applied = self.normal * (self.bias_impulse - previous);
        a.apply_bias_impulse(-applied, self.arm_a);
        b.apply_bias_impulse(applied, self.arm_b);

        // inelastic: drive the approaching normal velocity to zero
        let relative = b.velocity_at(self.arm_b) - a.velocity_at(self.arm_a);
        let delta = -relative.dot(self.normal) * self.normal_mass;
        let previous = self.impulse;
        self.impulse = (previous + delta).max(0.0);
        let applied = self.normal * (self.impulse - previous);
        a.apply_impulse(-applied, self.arm_a);
        b.apply_impulse(applied, self.arm_b);

        bodies[self.a] = a;
        bodies[self.b] = b;
    }
}

#[derive(Debug, Clone)]
pub struct Space {
    settings: SpaceSettings,
    bodies: BTreeMap<BodyHandle, Body>,
    shapes: BTreeMap<ShapeHandle, Collider>,
    next_body: u64,
    next_shape: u64,
}

impl Space {
    pub fn new(settings: SpaceSettings) -> Self {
        Self {
            settings,
            bodies: BTreeMap::new(),
            shapes: BTreeMap::new(),
            next_body: 0,
            next_shape: 0,
        }
    }

    pub fn settings(&self) -> &SpaceSettings {
        &self.settings
    }

    pub fn add_body(&mut self, body: Body) -> BodyHandle {
        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        self.bodies.insert(handle, body);
        handle
    }

    pub fn add_shape(&mut self, body: BodyHandle, def: ShapeDef) -> Result<ShapeHandle> {
        let owner = self
            .bodies
            .get(&body)
            .ok_or_else(|| Error::InvalidState(format!("no body {:?} in space", body)))?;

        let mut collider = Collider {
            body,
            def,
            world: Vec::new(),
            lower: DVec2::ZERO,
            upper: DVec2::ZERO,
        };
        collider.update(owner);

        let handle = ShapeHandle(self.next_shape);
        self.next_shape += 1;
        self.shapes.insert(handle, collider);
        Ok(handle)
    }

    /// Remove a body together with every shape attached to it
    pub fn remove_body(&mut self, body: BodyHandle) -> Result<()> {
        if self.bodies.remove(&body).is_none() {
            return Err(Error::InvalidState(format!("no body {:?} in space", body)));
        }
        self.shapes.retain(|_, collider| collider.body != body);
        Ok(())
    }

    pub fn remove_shape(&mut self, shape: ShapeHandle) -> Result<()> {
        self.shapes
            .remove(&shape)
            .map(|_| ())
            .ok_or_else(|| Error::InvalidState(format!("no shape {:?} in space", shape)))
    }

    pub fn body(&self, body: BodyHandle) -> Option<&Body> {
        self.bodies.get(&body)
    }

    pub fn body_mut(&mut self, body: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(&body)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.shapes.clear();
    }

    fn update_shapes(&mut self) {
        for collider in self.shapes.values_mut() {
            if let Some(body) = self.bodies.get(&collider.body) {
                collider.update(body);
            }
        }
    }

    /// Candidate shape pairs whose bounding boxes overlap
    fn broadphase(&self) -> Vec<(ShapeHandle, ShapeHandle)> {
        let mut order: Vec<(&ShapeHandle, &Collider)> = self.shapes.iter().collect();
        order.sort_by(|x, y| x.1.lower.x.total_cmp(&y.1.lower.x).then(x.0.cmp(y.0)));

        let is_static = |collider: &Collider| {
            self.bodies
                .get(&collider.body)
                .map_or(true, |body| body.is_static())
        };

        let mut pairs = Vec::new();
        for (i, (handle_a, a)) in order.iter().enumerate() {
            for (handle_b, b) in order.iter().skip(i + 1) {
                if b.lower.x > a.upper.x {
                    break;
                }
                if a.body == b.body || !a.overlaps(b) || (is_static(a) && is_static(b)) {
                    continue;
                }
                pairs.push((**handle_a, **handle_b));
            }
        }
        pairs
    }

    /// Advance the space by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        if !(dt > 0.0) {
            return;
        }

        let damping = self.settings.damping.powf(dt);
        for body in self.bodies.values_mut() {
            if !body.is_static() {
                body.velocity *= damping;
                body.angular_velocity *= damping;
            }
        }
        self.update_shapes();

        let handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        let index: BTreeMap<BodyHandle, usize> =
            handles.iter().enumerate().map(|(i, h)| (*h, i)).collect();
        let mut states: Vec<Body> = self.bodies.values().copied().collect();

        let bias_coefficient = 1.0 - self.settings.collision_bias.powf(dt);
        let mut contacts = Vec::new();

        for (shape_a, shape_b) in self.broadphase() {
            let (Some(a), Some(b)) = (self.shapes.get(&shape_a), self.shapes.get(&shape_b)) else {
                continue;
            };
            let (Some(&ia), Some(&ib)) = (index.get(&a.body), index.get(&b.body)) else {
                continue;
            };
            let Some(manifold) = collide(&a.world, a.def.radius, &b.world, b.def.radius) else {
                continue;
            };

            let (body_a, body_b) = (&states[ia], &states[ib]);
            for point in manifold.points {
                let arm_a = point.point - body_a.position;
                let arm_b = point.point - body_b.position;
                let rn_a = arm_a.perp_dot(manifold.normal);
                let rn_b = arm_b.perp_dot(manifold.normal);
                let k = body_a.inverse_mass
                    + body_b.inverse_mass
                    + body_a.inverse_moment * rn_a * rn_a
                    + body_b.inverse_moment * rn_b * rn_b;
                if k <= 0.0 {
                    continue;
                }

                contacts.push(Contact {
                    a: ia,
                    b: ib,
                    normal: manifold.normal,
                    arm_a,
                    arm_b,
                    normal_mass: 1.0 / k,
                    bias: bias_coefficient * (point.depth - self.settings.collision_slop).max(0.0) / dt,
                    impulse: 0.0,
                    bias_impulse: 0.0,
                });
            }
        }

        for _ in 0..self.settings.iterations {
            for contact in contacts.iter_mut() {
                contact.solve(&mut states);
            }
        }

        for state in states.iter_mut() {
            if state.is_static() {
                continue;
            }
            state.position += (state.velocity + state.bias_velocity) * dt;
            state.angle += (state.angular_velocity + state.bias_angular_velocity) * dt;
            state.bias_velocity = DVec2::ZERO;
            state.bias_angular_velocity = 0.0;
        }

        for (handle, state) in handles.into_iter().zip(states) {
            self.bodies.insert(handle, state);
        }
        self.update_shapes();
    }
}
