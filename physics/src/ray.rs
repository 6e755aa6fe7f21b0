use crate::{
    body::{Body, BodyHandle},
    shapes::{Shape, ShapeConvex, ShapePlane},
};
use glam::{Quat, Vec3};

#[derive(Copy, Clone, Debug)]
pub struct RayOptions {
    pub collision_filter_mask: u32,
    pub collision_filter_group: u32,
    /// Ignore hits where the ray leaves a shape.
    pub skip_backfaces: bool,
    pub exclude: Option<BodyHandle>,
}

impl Default for RayOptions {
    fn default() -> Self {
        RayOptions {
            collision_filter_mask: u32::MAX,
            collision_filter_group: u32::MAX,
            skip_backfaces: false,
            exclude: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RaycastResult {
    pub body: BodyHandle,
    pub shape_index: usize,
    pub hit_point: Vec3,
    pub hit_normal: Vec3,
    /// Distance from the ray origin to the hit point.
    pub distance: f32,
}

/// A hit along `from + t * (to - from)`.
#[derive(Copy, Clone, Debug)]
struct Hit {
    t: f32,
    normal: Vec3,
}

pub fn ray_sphere_intersect(
    ray_start: Vec3,
    ray_dir: Vec3,
    sphere_centre: Vec3,
    sphere_radius: f32,
) -> Option<(f32, f32)> {
    let m = sphere_centre - ray_start;
    let a = ray_dir.dot(ray_dir);
    let b = m.dot(ray_dir);
    let c = m.dot(m) - sphere_radius * sphere_radius;

    let delta = b * b - a * c;
    if delta < 0.0 || a == 0.0 {
        None
    } else {
        let inv_a = 1.0 / a;
        let delta_root = delta.sqrt();
        let t1 = inv_a * (b - delta_root);
        let t2 = inv_a * (b + delta_root);
        Some((t1, t2))
    }
}

fn ray_sphere(
    from: Vec3,
    dir: Vec3,
    centre: Vec3,
    radius: f32,
    skip_backfaces: bool,
) -> Option<Hit> {
    let (t1, t2) = ray_sphere_intersect(from, dir, centre, radius)?;
    let t = if (0.0..=1.0).contains(&t1) {
        t1
    } else if t1 < 0.0 && (0.0..=1.0).contains(&t2) && !skip_backfaces {
        t2
    } else {
        return None;
    };
    let normal = (from + dir * t - centre).normalize_or_zero();
    Some(Hit { t, normal })
}

fn ray_plane(from: Vec3, dir: Vec3, pos: Vec3, orient: Quat, skip_backfaces: bool) -> Option<Hit> {
    let normal = ShapePlane::world_normal(orient);
    let denom = normal.dot(dir);
    if denom.abs() < f32::EPSILON {
        return None;
    }
    let start_distance = normal.dot(from - pos);
    if start_distance < 0.0 && skip_backfaces {
        return None;
    }
    let t = -start_distance / denom;
    (0.0..=1.0).contains(&t).then_some(Hit { t, normal })
}

/// Clips the segment against every face plane of the hull.
fn ray_convex(
    from: Vec3,
    dir: Vec3,
    hull: &ShapeConvex,
    pos: Vec3,
    orient: Quat,
    skip_backfaces: bool,
) -> Option<Hit> {
    let mut t_enter = 0.0_f32;
    let mut t_exit = 1.0_f32;
    let mut enter_normal = None;
    let mut exit_normal = Vec3::ZERO;

    for (face, local_normal) in hull.face_normals().iter().enumerate() {
        let normal = orient * *local_normal;
        let on_face = hull.world_vertex(hull.faces()[face][0], pos, orient);
        let distance = normal.dot(from - on_face);
        let denom = normal.dot(dir);

        if denom.abs() < f32::EPSILON {
            if distance > 0.0 {
                return None;
            }
            continue;
        }

        let t = -distance / denom;
        if denom < 0.0 {
            if t > t_enter || (enter_normal.is_none() && t >= t_enter) {
                t_enter = t;
                enter_normal = Some(normal);
            }
        } else if t < t_exit {
            t_exit = t;
            exit_normal = normal;
        }
        if t_enter > t_exit {
            return None;
        }
    }

    match enter_normal {
        Some(normal) => Some(Hit { t: t_enter, normal }),
        // the ray starts inside the hull
        None if !skip_backfaces && t_exit < 1.0 => Some(Hit {
            t: t_exit,
            normal: exit_normal,
        }),
        None => None,
    }
}

fn ray_shape(
    from: Vec3,
    dir: Vec3,
    shape: &Shape,
    pos: Vec3,
    orient: Quat,
    skip: bool,
) -> Option<Hit> {
    match shape {
        Shape::Sphere(sphere) => ray_sphere(from, dir, pos, sphere.radius, skip),
        Shape::Plane(_) => ray_plane(from, dir, pos, orient, skip),
        _ => shape
            .convex_hull()
            .and_then(|hull| ray_convex(from, dir, hull, pos, orient, skip)),
    }
}

/// Closest hit of the segment `from..to` against `body`, if any.
pub fn raycast_body(
    from: Vec3,
    to: Vec3,
    handle: BodyHandle,
    body: &Body,
    options: &RayOptions,
) -> Option<RaycastResult> {
    if options.exclude == Some(handle) || !body.collision_response {
        return None;
    }
    if options.collision_filter_group & body.collision_filter_mask == 0
        || body.collision_filter_group & options.collision_filter_mask == 0
    {
        return None;
    }

    let aabb = if body.aabb_needs_update() {
        body.compute_aabb()
    } else {
        *body.aabb()
    };
    if !aabb.intersects_segment(from, to) {
        return None;
    }

    let dir = to - from;
    let mut closest: Option<(usize, Hit)> = None;
    for (shape_index, body_shape) in body.shapes().iter().enumerate() {
        let (pos, orient) = body_shape.world_transform(body.position, body.orientation);
        let skip = options.skip_backfaces;
        if let Some(hit) = ray_shape(from, dir, &body_shape.shape, pos, orient, skip) {
            if closest.map_or(true, |(_, best)| hit.t < best.t) {
                closest = Some((shape_index, hit));
            }
        }
    }

    closest.map(|(shape_index, hit)| RaycastResult {
        body: handle,
        shape_index,
        hit_point: from + dir * hit.t,
        hit_normal: hit.normal,
        distance: dir.length() * hit.t,
    })
}

/// Closest hit of the segment `from..to` over all bodies.
pub fn raycast_closest(
    bodies: &[Body],
    from: Vec3,
    to: Vec3,
    options: &RayOptions,
) -> Option<RaycastResult> {
    bodies
        .iter()
        .enumerate()
        .filter_map(|(i, body)| raycast_body(from, to, BodyHandle(i as u32), body, options))
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Vec<Body> {
        vec![
            Body::new(0.0).with_shape(Shape::make_plane()),
            Body::new(1.0)
                .with_shape(Shape::make_sphere(1.0))
                .with_position(Vec3::new(0.0, 2.0, 0.0)),
            Body::new(1.0)
                .with_shape(Shape::make_box(Vec3::splat(0.5)))
                .with_position(Vec3::new(5.0, 0.5, 0.0)),
        ]
    }

    #[test]
    fn test_closest_hit() {
        let bodies = scene();
        let options = RayOptions::default();

        let from = Vec3::new(0.0, 10.0, 0.0);
        let hit = raycast_closest(&bodies, from, Vec3::new(0.0, -10.0, 0.0), &options).unwrap();
        assert_eq!(hit.body, BodyHandle(1));
        assert!(hit.hit_point.abs_diff_eq(Vec3::new(0.0, 3.0, 0.0), 1e-4));
        assert!(hit.hit_normal.abs_diff_eq(Vec3::Y, 1e-4));
        assert!((hit.distance - 7.0).abs() < 1e-4);

        let from = Vec3::new(5.0, 10.0, 0.2);
        let hit = raycast_closest(&bodies, from, Vec3::new(5.0, -10.0, 0.2), &options).unwrap();
        assert_eq!(hit.body, BodyHandle(2));
        assert!((hit.hit_point.y - 1.0).abs() < 1e-4);
        assert!(hit.hit_normal.abs_diff_eq(Vec3::Y, 1e-4));
    }

    #[test]
    fn test_exclude_and_filter() {
        let mut bodies = scene();
        let from = Vec3::new(0.0, 10.0, 0.0);
        let to = Vec3::new(0.0, -10.0, 0.0);
        let options = RayOptions {
            exclude: Some(BodyHandle(1)),
            ..Default::default()
        };
        let hit = raycast_closest(&bodies, from, to, &options).unwrap();
        assert_eq!(hit.body, BodyHandle(0));
        assert!(hit.hit_point.abs_diff_eq(Vec3::ZERO, 1e-4));

        bodies[0].collision_filter_group = 4;
        let options = RayOptions {
            exclude: Some(BodyHandle(1)),
            collision_filter_mask: 1,
            ..Default::default()
        };
        assert!(raycast_closest(&bodies, from, to, &options).is_none());
    }

    #[test]
    fn test_backfaces() {
        let bodies = scene();
        // starts inside the box
        let from = Vec3::new(5.0, 0.5, 0.0);
        let to = Vec3::new(7.0, 0.5, 0.0);
        let options = RayOptions::default();
        let hit = raycast_body(from, to, BodyHandle(2), &bodies[2], &options).unwrap();
        assert!(hit.hit_point.abs_diff_eq(Vec3::new(5.5, 0.5, 0.0), 1e-4));

        let options = RayOptions {
            skip_backfaces: true,
            ..Default::default()
        };
        assert!(raycast_body(from, to, BodyHandle(2), &bodies[2], &options).is_none());
    }

    #[test]
    fn test_too_short() {
        let bodies = scene();
        let hit = raycast_closest(
            &bodies,
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::new(0.0, 5.0, 0.0),
            &RayOptions::default(),
        );
        assert!(hit.is_none());
    }
}
