//! Narrowphase between rounded convex shapes.
//!
//! A shape is a convex core (one vertex for a circle, two for a segment,
//! three or more counter-clockwise vertices for a polygon) inflated by a
//! radius. Overlapping cores are resolved along the axis of least
//! penetration, disjoint cores along their closest features.

use glam::DVec2;

const PARALLEL_TOLERANCE: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub point: DVec2,
    pub depth: f64,
}

/// Contact between shape A and shape B. `normal` points from A to B.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifold {
    pub normal: DVec2,
    pub points: Vec<ContactPoint>,
}

#[derive(Debug, Clone, Copy)]
struct Axis {
    normal: DVec2,
    origin: DVec2,
}

fn edges(core: &[DVec2]) -> Vec<(DVec2, DVec2)> {
    match core.len() {
        0 | 1 => Vec::new(),
        2 => vec![(core[0], core[1])],
        n => (0..n).map(|i| (core[i], core[(i + 1) % n])).collect(),
    }
}

/// Separating axis candidates of a core. Segments contribute both faces and
/// both end caps.
fn axes(core: &[DVec2]) -> Vec<Axis> {
    match core.len() {
        0 | 1 => Vec::new(),
        2 => {
            let direction = (core[1] - core[0]).normalize_or_zero();
            if direction == DVec2::ZERO {
                return Vec::new();
            }
            let normal = DVec2::new(direction.y, -direction.x);
            vec![
                Axis { normal, origin: core[0] },
                Axis { normal: -normal, origin: core[0] },
                Axis { normal: direction, origin: core[1] },
                Axis { normal: -direction, origin: core[0] },
            ]
        }
        _ => edges(core)
            .into_iter()
            .filter_map(|(start, stop)| {
                let direction = (stop - start).normalize_or_zero();
                (direction != DVec2::ZERO).then(|| Axis {
                    normal: DVec2::new(direction.y, -direction.x),
                    origin: start,
                })
            })
            .collect(),
    }
}

fn separation(axis: &Axis, vertex: DVec2) -> f64 {
    (vertex - axis.origin).dot(axis.normal)
}

/// Axis of `reference` along which `incident` is least deep, with that depth
fn best_axis(reference: &[DVec2], incident: &[DVec2]) -> Option<(Axis, f64)> {
    let mut best: Option<(Axis, f64)> = None;
    for axis in axes(reference) {
        let sep = incident
            .iter()
            .map(|v| separation(&axis, *v))
            .fold(f64::INFINITY, f64::min);
        if best.map_or(true, |(_, current)| sep > current) {
            best = Some((axis, sep));
        }
    }
    best
}

fn closest_on_segment(point: DVec2, start: DVec2, stop: DVec2) -> DVec2 {
    let delta = stop - start;
    let length_squared = delta.length_squared();
    if length_squared <= f64::EPSILON {
        return start;
    }
    let t = ((point - start).dot(delta) / length_squared).clamp(0.0, 1.0);
    start + delta * t
}

fn centroid(core: &[DVec2]) -> DVec2 {
    if core.is_empty() {
        return DVec2::ZERO;
    }
    core.iter().copied().sum::<DVec2>() / core.len() as f64
}

/// Contact between two rounded convex shapes, if they touch
pub fn collide(a: &[DVec2], radius_a: f64, b: &[DVec2], radius_b: f64) -> Option<Manifold> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let from_a = best_axis(a, b);
    let from_b = best_axis(b, a);

    let overlapping = match (from_a, from_b) {
        (None, None) => false,
        (Some((_, sa)), None) => sa <= 0.0,
        (None, Some((_, sb))) => sb <= 0.0,
        (Some((_, sa)), Some((_, sb))) => sa.max(sb) <= 0.0,
    };

    if overlapping {
        penetrating_contact(a, radius_a, b, radius_b, from_a, from_b)
    } else {
        closest_feature_contact(a, radius_a, b, radius_b)
    }
}

fn penetrating_contact(
    a: &[DVec2],
    radius_a: f64,
    b: &[DVec2],
    radius_b: f64,
    from_a: Option<(Axis, f64)>,
    from_b: Option<(Axis, f64)>,
) -> Option<Manifold> {
    let reach = radius_a + radius_b;

    // reference face on A pushes B along +normal, on B pushes A along -normal
    let (axis, incident, flip) = match (from_a, from_b) {
        (Some((axis_a, sa)), Some((axis_b, sb))) => {
            if sa >= sb {
                (axis_a, b, false)
            } else {
                (axis_b, a, true)
            }
        }
        (Some((axis_a, _)), None) => (axis_a, b, false),
        (None, Some((axis_b, _))) => (axis_b, a, true),
        (None, None) => return None,
    };

    let mut candidates: Vec<(f64, DVec2)> = incident
        .iter()
        .map(|v| (separation(&axis, *v), *v))
        .filter(|(sep, _)| *sep < reach)
        .collect();
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0));
    candidates.truncate(2);

    if candidates.is_empty() {
        return None;
    }

    let points = candidates
        .into_iter()
        .map(|(sep, vertex)| ContactPoint {
            point: vertex - axis.normal * (sep / 2.0),
            depth: reach - sep,
        })
        .collect();

    Some(Manifold {
        normal: if flip { -axis.normal } else { axis.normal },
        points,
    })
}

/// Candidate `(distance, point on A, point on B)` pairs between the cores
fn closest_pairs(a: &[DVec2], b: &[DVec2]) -> Vec<(f64, DVec2, DVec2)> {
    let edges_a = edges(a);
    let edges_b = edges(b);
    let mut pairs = Vec::new();

    for &p in a {
        for &(start, stop) in &edges_b {
            let q = closest_on_segment(p, start, stop);
            pairs.push(((q - p).length(), p, q));
        }
    }
    for &q in b {
        for &(start, stop) in &edges_a {
            let p = closest_on_segment(q, start, stop);
            pairs.push(((q - p).length(), p, q));
        }
    }
    if edges_a.is_empty() && edges_b.is_empty() {
        for &p in a {
            for &q in b {
                pairs.push(((q - p).length(), p, q));
            }
        }
    }

    pairs
}

fn closest_feature_contact(
    a: &[DVec2],
    radius_a: f64,
    b: &[DVec2],
    radius_b: f64,
) -> Option<Manifold> {
    let reach = radius_a + radius_b;
    let mut pairs: Vec<(f64, DVec2, DVec2)> = closest_pairs(a, b)
        .into_iter()
        .filter(|(distance, _, _)| *distance < reach)
        .collect();
    pairs.sort_by(|x, y| x.0.total_cmp(&y.0));

    let &(distance, p, q) = pairs.first()?;

    let normal = if distance > 1e-12 {
        (q - p) / distance
    } else {
        let fallback = (centroid(b) - centroid(a)).normalize_or_zero();
        if fallback == DVec2::ZERO {
            DVec2::X
        } else {
            fallback
        }
    };

    let contact = |distance: f64, p: DVec2, q: DVec2| ContactPoint {
        point: ((p + normal * radius_a) + (q - normal * radius_b)) / 2.0,
        depth: reach - distance,
    };

    let mut points = vec![contact(distance, p, q)];

    // second point for parallel faces
    let tolerance = 0.01 * reach.max(1e-9);
    if let Some(&(d2, p2, q2)) = pairs.iter().skip(1).find(|(d2, p2, q2)| {
        let direction = (*q2 - *p2).normalize_or_zero();
        *d2 <= distance + tolerance
            && direction.dot(normal) > PARALLEL_TOLERANCE
            && (*p2 - p).length() > 1e-9
            && (*q2 - q).length() > 1e-9
    }) {
        points.push(contact(d2, p2, q2));
    }

    Some(Manifold { normal, points })
}
