use crate::{
    body::{Body, BodyHandle},
    broadphase::CollisionPair,
    convex::{clip_against_hull, find_separating_axis, ClipPoint, HullPose},
    equations::{Equation, EquationPool, SpookCache},
    material::{ContactMaterial, ContactMaterialTable},
    math::Vec3Ext,
    shapes::{Shape, ShapeConvex, ShapePlane},
};
use glam::{Quat, Vec3};

/// A single contact point between shape A and shape B.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Contact {
    pub world_point_a: Vec3,
    pub world_point_b: Vec3,
    /// Unit normal pointing from B into A.
    pub normal: Vec3,
    /// Penetration depth, positive when overlapping.
    pub depth: f32,
}

impl Contact {
    /// The same contact seen with A and B swapped.
    pub fn flipped(self) -> Self {
        Contact {
            world_point_a: self.world_point_b,
            world_point_b: self.world_point_a,
            normal: -self.normal,
            depth: self.depth,
        }
    }
}

pub fn sphere_sphere(pos_a: Vec3, radius_a: f32, pos_b: Vec3, radius_b: f32) -> Option<Contact> {
    let ab = pos_a - pos_b;
    let radius_ab = radius_a + radius_b;
    let length_squared = ab.length_squared();
    if length_squared >= radius_ab * radius_ab {
        return None;
    }
    // coincident centres have no preferred direction
    let normal = ab.try_normalize().unwrap_or(Vec3::Y);
    Some(Contact {
        world_point_a: pos_a - normal * radius_a,
        world_point_b: pos_b + normal * radius_b,
        normal,
        depth: radius_ab - length_squared.sqrt(),
    })
}

/// Sphere as A against the solid half space below the plane as B.
pub fn sphere_plane(centre: Vec3, radius: f32, plane_pos: Vec3, plane_orient: Quat) -> Option<Contact> {
    let normal = ShapePlane::world_normal(plane_orient);
    let dist = normal.dot(centre - plane_pos);
    if dist >= radius {
        return None;
    }
    Some(Contact {
        world_point_a: centre - normal * radius,
        world_point_b: centre - normal * dist,
        normal,
        depth: radius - dist,
    })
}

fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

fn point_in_face(hull: &ShapeConvex, face: usize, p: Vec3) -> bool {
    let indices = &hull.faces()[face];
    let normal = hull.face_normals()[face];
    let vertices = hull.vertices();
    indices.iter().enumerate().all(|(i, &index)| {
        let v0 = vertices[index as usize];
        let v1 = vertices[indices[(i + 1) % indices.len()] as usize];
        (v1 - v0).cross(p - v0).dot(normal) >= 0.0
    })
}

/// Sphere as A against a convex hull as B. Faces are tested first, then edges which include
/// the vertices at their ends.
pub fn sphere_convex(centre: Vec3, radius: f32, b: &HullPose) -> Option<Contact> {
    let hull = b.hull;
    let local = b.orientation.conjugate() * (centre - b.position);

    let mut max_dist = f32::MIN;
    let mut max_face = None;
    for (face, normal) in hull.face_normals().iter().enumerate() {
        if *normal == Vec3::ZERO {
            continue;
        }
        let dist = normal.dot(local) + hull.face_plane_constant(face);
        if dist > max_dist {
            max_dist = dist;
            max_face = Some(face);
        }
    }
    let max_face = max_face?;
    if max_dist >= radius {
        return None;
    }

    let (local_normal, local_closest, depth) = if max_dist <= 0.0 {
        // centre inside the hull, push out through the nearest face
        let normal = hull.face_normals()[max_face];
        (normal, local - normal * max_dist, radius - max_dist)
    } else {
        let face_hit = hull
            .face_normals()
            .iter()
            .enumerate()
            .filter(|(_, normal)| **normal != Vec3::ZERO)
            .find_map(|(face, normal)| {
                let dist = normal.dot(local) + hull.face_plane_constant(face);
                let projected = local - *normal * dist;
                (dist > 0.0 && dist < radius && point_in_face(hull, face, projected))
                    .then_some((*normal, projected, radius - dist))
            });

        match face_hit {
            Some(hit) => hit,
            None => {
                let vertices = hull.vertices();
                let mut closest = None;
                let mut closest_dist_sq = radius * radius;
                for face in hull.faces() {
                    for (i, &index) in face.iter().enumerate() {
                        let v0 = vertices[index as usize];
                        let v1 = vertices[face[(i + 1) % face.len()] as usize];
                        let p = closest_point_on_segment(local, v0, v1);
                        let dist_sq = p.distance_squared(local);
                        if dist_sq < closest_dist_sq {
                            closest_dist_sq = dist_sq;
                            closest = Some(p);
                        }
                    }
                }
                let p = closest?;
                let normal = (local - p)
                    .try_normalize()
                    .unwrap_or(hull.face_normals()[max_face]);
                (normal, p, radius - closest_dist_sq.sqrt())
            }
        }
    };

    let normal = b.orientation * local_normal;
    Some(Contact {
        world_point_a: centre - normal * radius,
        world_point_b: b.position + b.orientation * local_closest,
        normal,
        depth,
    })
}

/// Every hull vertex below the plane becomes a contact. The hull is A.
pub fn convex_plane(a: &HullPose, plane_pos: Vec3, plane_orient: Quat, out: &mut Vec<Contact>) {
    let normal = ShapePlane::world_normal(plane_orient);
    for index in 0..a.hull.vertices().len() as u32 {
        let vertex = a.hull.world_vertex(index, a.position, a.orientation);
        let dist = normal.dot(vertex - plane_pos);
        if dist < 0.0 {
            out.push(Contact {
                world_point_a: vertex,
                world_point_b: vertex - normal * dist,
                normal,
                depth: -dist,
            });
        }
    }
}

pub fn convex_convex(a: &HullPose, b: &HullPose, clip: &mut Vec<ClipPoint>, out: &mut Vec<Contact>) {
    let Some((axis, _)) = find_separating_axis(a, b) else {
        return;
    };
    clip_against_hull(a, b, axis, -100.0, 100.0, clip);
    out.extend(clip.iter().map(|point| Contact {
        world_point_a: point.point_on_a,
        world_point_b: point.point_on_b,
        normal: axis,
        depth: -point.depth,
    }));
}

fn flip_from(out: &mut [Contact], start: usize) {
    for contact in &mut out[start..] {
        *contact = contact.flipped();
    }
}

/// Appends the contacts between two placed shapes to `out`.
pub fn shape_contacts(
    (shape_a, pos_a, orient_a): (&Shape, Vec3, Quat),
    (shape_b, pos_b, orient_b): (&Shape, Vec3, Quat),
    clip: &mut Vec<ClipPoint>,
    out: &mut Vec<Contact>,
) {
    let start = out.len();
    match (shape_a, shape_b) {
        (Shape::Sphere(a), Shape::Sphere(b)) => {
            out.extend(sphere_sphere(pos_a, a.radius, pos_b, b.radius));
        }
        (Shape::Sphere(a), Shape::Plane(_)) => {
            out.extend(sphere_plane(pos_a, a.radius, pos_b, orient_b));
        }
        (Shape::Plane(_), Shape::Sphere(b)) => {
            out.extend(sphere_plane(pos_b, b.radius, pos_a, orient_a).map(Contact::flipped));
        }
        (Shape::Plane(_), Shape::Plane(_)) => {
            tracing::trace!("skipping plane against plane");
        }
        (Shape::Sphere(a), other) => {
            if let Some(hull) = other.convex_hull() {
                let pose = HullPose::new(hull, pos_b, orient_b);
                out.extend(sphere_convex(pos_a, a.radius, &pose));
            }
        }
        (other, Shape::Sphere(b)) => {
            if let Some(hull) = other.convex_hull() {
                let pose = HullPose::new(hull, pos_a, orient_a);
                out.extend(sphere_convex(pos_b, b.radius, &pose).map(Contact::flipped));
            }
        }
        (Shape::Plane(_), other) => {
            if let Some(hull) = other.convex_hull() {
                convex_plane(&HullPose::new(hull, pos_b, orient_b), pos_a, orient_a, out);
                flip_from(out, start);
            }
        }
        (other, Shape::Plane(_)) => {
            if let Some(hull) = other.convex_hull() {
                convex_plane(&HullPose::new(hull, pos_a, orient_a), pos_b, orient_b, out);
            }
        }
        (a, b) => match (a.convex_hull(), b.convex_hull()) {
            (Some(hull_a), Some(hull_b)) => {
                let pose_a = HullPose::new(hull_a, pos_a, orient_a);
                let pose_b = HullPose::new(hull_b, pos_b, orient_b);
                convex_convex(&pose_a, &pose_b, clip, out);
            }
            _ => tracing::trace!(a = %a.kind(), b = %b.kind(), "no contact handler"),
        },
    }
}

/// A shape pair found touching this step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TouchingPair {
    pub a: BodyHandle,
    pub b: BodyHandle,
    pub shape_a: usize,
    pub shape_b: usize,
    /// Closing speed along the normal of the first contact point.
    pub impact_velocity: f32,
}

/// Per step inputs for turning contacts into equations.
#[derive(Copy, Clone, Debug)]
pub struct NarrowphaseSettings<'a> {
    pub dt: f32,
    /// Build one pair of friction equations per body pair from the averaged contact.
    pub friction_reduction: bool,
    pub materials: &'a ContactMaterialTable,
    pub default_material: &'a ContactMaterial,
}

#[derive(Debug, Default)]
pub struct Narrowphase {
    contacts: Vec<Contact>,
    clip: Vec<ClipPoint>,
    friction: Vec<Equation>,
    pub touching: Vec<TouchingPair>,
    pub contact_count: usize,
}

impl Narrowphase {
    /// Generates contacts for every candidate pair. Contact equations are pushed to `pool`,
    /// followed by all friction equations.
    pub fn get_contacts(
        &mut self,
        pairs: &[CollisionPair],
        bodies: &[Body],
        settings: &NarrowphaseSettings,
        spook_cache: &mut SpookCache,
        pool: &mut EquationPool,
    ) {
        self.touching.clear();
        self.friction.clear();
        self.contact_count = 0;

        for pair in pairs {
            let (handle_a, handle_b) = (pair.a, pair.b);
            let (body_a, body_b) = (&bodies[handle_a.0 as usize], &bodies[handle_b.0 as usize]);

            let material = settings.materials.resolve(
                body_a.material.as_ref(),
                body_b.material.as_ref(),
                settings.default_material,
            );
            let contact_spook = spook_cache.get(
                material.contact_stiffness,
                material.contact_relaxation,
                settings.dt,
            );
            let friction_spook = spook_cache.get(
                material.friction_stiffness,
                material.friction_relaxation,
                settings.dt,
            );
            let respond = body_a.collision_response && body_b.collision_response;
            let pair_start = pool.len();
            let mut sum_normal = Vec3::ZERO;
            let mut sum_ra = Vec3::ZERO;
            let mut sum_rb = Vec3::ZERO;

            for (index_a, shape_a) in body_a.shapes().iter().enumerate() {
                let (pos_a, orient_a) = shape_a.world_transform(body_a.position, body_a.orientation);
                for (index_b, shape_b) in body_b.shapes().iter().enumerate() {
                    let (pos_b, orient_b) =
                        shape_b.world_transform(body_b.position, body_b.orientation);

                    let reach = shape_a.shape.bounding_radius() + shape_b.shape.bounding_radius();
                    if pos_a.distance_squared(pos_b) > reach * reach {
                        continue;
                    }

                    self.contacts.clear();
                    shape_contacts(
                        (&shape_a.shape, pos_a, orient_a),
                        (&shape_b.shape, pos_b, orient_b),
                        &mut self.clip,
                        &mut self.contacts,
                    );
                    let Some(first) = self.contacts.first() else {
                        continue;
                    };

                    let closing = body_a.velocity_at_world_point(first.world_point_a)
                        - body_b.velocity_at_world_point(first.world_point_b);
                    self.touching.push(TouchingPair {
                        a: handle_a,
                        b: handle_b,
                        shape_a: index_a,
                        shape_b: index_b,
                        impact_velocity: -first.normal.dot(closing),
                    });
                    self.contact_count += self.contacts.len();

                    if !respond {
                        continue;
                    }

                    for contact in &self.contacts {
                        let ra = contact.world_point_a - body_a.position;
                        let rb = contact.world_point_b - body_b.position;
                        let index = pool.push(Equation::contact(
                            (handle_a, body_a),
                            (handle_b, body_b),
                            contact.normal,
                            ra,
                            rb,
                            material.restitution,
                            contact_spook,
                        ));
                        sum_normal += contact.normal;
                        sum_ra += ra;
                        sum_rb += rb;

                        if material.friction > 0.0 && !settings.friction_reduction {
                            let (t1, t2) = contact.normal.tangents();
                            for tangent in [t1, t2] {
                                self.friction.push(Equation::friction(
                                    handle_a,
                                    handle_b,
                                    tangent,
                                    ra,
                                    rb,
                                    material.friction,
                                    index..index + 1,
                                    friction_spook,
                                ));
                            }
                        }
                    }
                }
            }

            let pair_end = pool.len();
            if settings.friction_reduction && material.friction > 0.0 && pair_end > pair_start {
                let count = (pair_end - pair_start) as f32;
                if let Some(normal) = sum_normal.try_normalize() {
                    let (t1, t2) = normal.tangents();
                    for tangent in [t1, t2] {
                        self.friction.push(Equation::friction(
                            handle_a,
                            handle_b,
                            tangent,
                            sum_ra / count,
                            sum_rb / count,
                            material.friction,
                            pair_start..pair_end,
                            friction_spook,
                        ));
                    }
                }
            }
        }

        for friction in self.friction.drain(..) {
            pool.push(friction);
        }
    }
}
