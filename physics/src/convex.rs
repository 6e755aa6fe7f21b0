//! Separating axis test and face clipping between two convex hulls.

use crate::{math::DEGENERATE_EPSILON_SQ, shapes::ShapeConvex};
use glam::{Quat, Vec3};

/// A hull placed in the world.
#[derive(Copy, Clone, Debug)]
pub struct HullPose<'a> {
    pub hull: &'a ShapeConvex,
    pub position: Vec3,
    pub orientation: Quat,
}

impl<'a> HullPose<'a> {
    pub fn new(hull: &'a ShapeConvex, position: Vec3, orientation: Quat) -> Self {
        HullPose {
            hull,
            position,
            orientation,
        }
    }

    fn project(&self, axis: Vec3) -> (f32, f32) {
        self.hull.project(axis, self.position, self.orientation)
    }

    fn world_normal(&self, face: usize) -> Vec3 {
        self.orientation * self.hull.face_normals()[face]
    }
}

/// Overlap of both hulls along `axis`, `None` when the projections do not overlap.
pub fn overlap_on_axis(a: &HullPose, b: &HullPose, axis: Vec3) -> Option<f32> {
    let (min_a, max_a) = a.project(axis);
    let (min_b, max_b) = b.project(axis);
    let d0 = max_a - min_b;
    let d1 = max_b - min_a;
    if d0 <= 0.0 || d1 <= 0.0 {
        return None;
    }
    Some(d0.min(d1))
}

/// Finds the axis of least penetration. The returned axis points from `b` towards `a`.
pub fn find_separating_axis(a: &HullPose, b: &HullPose) -> Option<(Vec3, f32)> {
    let mut best: Option<(Vec3, f32)> = None;
    let mut consider = |axis: Vec3| -> bool {
        match overlap_on_axis(a, b, axis) {
            None => false,
            Some(depth) => {
                if best.map_or(true, |(_, best_depth)| depth < best_depth) {
                    best = Some((axis, depth));
                }
                true
            }
        }
    };

    for axis in a.hull.unique_axes() {
        if !consider(a.orientation * *axis) {
            return None;
        }
    }
    for axis in b.hull.unique_axes() {
        if !consider(b.orientation * *axis) {
            return None;
        }
    }

    for edge_a in a.hull.unique_edges() {
        let world_a = a.orientation * *edge_a;
        for edge_b in b.hull.unique_edges() {
            let world_b = b.orientation * *edge_b;
            let cross = world_a.cross(world_b);
            // parallel edges give no new axis
            if cross.length_squared() < DEGENERATE_EPSILON_SQ {
                continue;
            }
            if !consider(cross.normalize()) {
                return None;
            }
        }
    }

    best.map(|(axis, depth)| {
        if (b.position - a.position).dot(axis) > 0.0 {
            (-axis, depth)
        } else {
            (axis, depth)
        }
    })
}

/// Sutherland-Hodgman step keeping the part of `polygon` on the negative side of the plane
/// `normal.dot(p) + constant = 0`.
pub fn clip_polygon_against_plane(
    polygon: &[Vec3],
    normal: Vec3,
    constant: f32,
    out: &mut Vec<Vec3>,
) {
    out.clear();
    let Some(&last) = polygon.last() else {
        return;
    };

    let mut first = last;
    let mut dist_first = normal.dot(first) + constant;
    for &second in polygon {
        let dist_second = normal.dot(second) + constant;
        if dist_first < 0.0 {
            if dist_second < 0.0 {
                out.push(second);
            } else {
                out.push(first.lerp(second, dist_first / (dist_first - dist_second)));
            }
        } else if dist_second < 0.0 {
            out.push(first.lerp(second, dist_first / (dist_first - dist_second)));
            out.push(second);
        }
        first = second;
        dist_first = dist_second;
    }
}

/// A clipped contact. `depth` is negative for penetrating points.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClipPoint {
    pub point_on_a: Vec3,
    pub point_on_b: Vec3,
    pub depth: f32,
}

/// Clips the face of `b` most aligned with `separating_normal` against the face of `a` most
/// opposed to it. `separating_normal` points from `b` towards `a`.
pub fn clip_against_hull(
    a: &HullPose,
    b: &HullPose,
    separating_normal: Vec3,
    min_dist: f32,
    max_dist: f32,
    out: &mut Vec<ClipPoint>,
) {
    out.clear();

    let incident = (0..b.hull.faces().len()).max_by(|&l, &r| {
        let dl = b.world_normal(l).dot(separating_normal);
        let dr = b.world_normal(r).dot(separating_normal);
        dl.total_cmp(&dr)
    });
    let reference = (0..a.hull.faces().len()).min_by(|&l, &r| {
        let dl = a.world_normal(l).dot(separating_normal);
        let dr = a.world_normal(r).dot(separating_normal);
        dl.total_cmp(&dr)
    });
    let (Some(incident), Some(reference)) = (incident, reference) else {
        return;
    };

    let mut polygon = b.hull.world_face(incident, b.position, b.orientation);
    let mut scratch = Vec::with_capacity(polygon.len() * 2);

    let reference_face = a.hull.world_face(reference, a.position, a.orientation);
    let reference_normal = a.world_normal(reference);

    // side planes through every edge of the reference face, facing outwards
    for (i, &v0) in reference_face.iter().enumerate() {
        let v1 = reference_face[(i + 1) % reference_face.len()];
        let Some(side) = (v1 - v0).cross(reference_normal).try_normalize() else {
            continue;
        };
        clip_polygon_against_plane(&polygon, side, -side.dot(v0), &mut scratch);
        std::mem::swap(&mut polygon, &mut scratch);
        if polygon.is_empty() {
            return;
        }
    }

    let plane_constant = -reference_normal.dot(reference_face[0]);
    for &point in &polygon {
        let depth = (reference_normal.dot(point) + plane_constant).max(min_dist);
        if depth <= max_dist && depth <= 1e-6 {
            out.push(ClipPoint {
                point_on_a: point - reference_normal * depth,
                point_on_b: point,
                depth,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::ShapeBox;

    #[test]
    fn test_boxes_overlapping_on_x() {
        let box_shape = ShapeBox::new(Vec3::ONE);
        let a = HullPose::new(&box_shape.hull, Vec3::ZERO, Quat::IDENTITY);
        let b = HullPose::new(&box_shape.hull, Vec3::new(1.9, 0.0, 0.0), Quat::IDENTITY);

        let (axis, depth) = find_separating_axis(&a, &b).unwrap();
        assert!(axis.abs_diff_eq(-Vec3::X, 1e-5), "{}", axis);
        assert!((depth - 0.1).abs() < 1e-5);

        let mut points = Vec::new();
        clip_against_hull(&a, &b, axis, -100.0, 100.0, &mut points);
        assert_eq!(points.len(), 4);
        for p in &points {
            assert!((p.depth + 0.1).abs() < 1e-5);
            assert!((p.point_on_b.x - 0.9).abs() < 1e-5);
            assert!((p.point_on_a.x - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_separated_boxes() {
        let box_shape = ShapeBox::new(Vec3::ONE);
        let a = HullPose::new(&box_shape.hull, Vec3::ZERO, Quat::IDENTITY);
        let rotated = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let b = HullPose::new(&box_shape.hull, Vec3::new(2.5, 0.0, 0.0), rotated);
        // the rotated corner reaches x = 2.5 - sqrt(2) = 1.086
        assert!(find_separating_axis(&a, &b).is_none());

        let b = HullPose::new(&box_shape.hull, Vec3::new(2.3, 0.0, 0.0), rotated);
        let (axis, depth) = find_separating_axis(&a, &b).unwrap();
        assert!(axis.abs_diff_eq(-Vec3::X, 1e-5));
        assert!((depth - (1.0 - (2.3 - std::f32::consts::SQRT_2))).abs() < 1e-4);
    }

    #[test]
    fn test_clip_polygon() {
        let square = [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ];
        let mut out = Vec::new();
        // keep x < 0.5
        clip_polygon_against_plane(&square, Vec3::X, -0.5, &mut out);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|p| p.x <= 0.5 + 1e-6));
        clip_polygon_against_plane(&square, Vec3::X, 2.0, &mut out);
        assert!(out.is_empty());
    }
}
