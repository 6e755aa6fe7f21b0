use super::ShapeTrait;
use crate::{bounds::Bounds, math::DEGENERATE_EPSILON_SQ};
use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HullError {
    #[error("hull needs at least 4 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("face {0} has fewer than 3 vertices")]
    DegenerateFace(usize),
    #[error("face {face} references vertex {vertex} which does not exist")]
    BadIndex { face: usize, vertex: u32 },
    #[error("face {0} has zero area")]
    ZeroAreaFace(usize),
}

/// Serialized form of a hull, everything else is derived on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ConvexData {
    vertices: Vec<Vec3>,
    faces: Vec<Vec<u32>>,
}

/// Convex polyhedron with outward facing, consistently wound faces.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "ConvexData", into = "ConvexData")]
pub struct ShapeConvex {
    vertices: Vec<Vec3>,
    faces: Vec<Vec<u32>>,
    face_normals: Vec<Vec3>,
    unique_edges: Vec<Vec3>,
    unique_axes: Vec<Vec3>,
    bounds: Bounds,
    bounding_radius: f32,
    volume: f32,
}

impl TryFrom<ConvexData> for ShapeConvex {
    type Error = HullError;

    fn try_from(data: ConvexData) -> Result<Self, Self::Error> {
        ShapeConvex::new(data.vertices, data.faces)
    }
}

impl From<ShapeConvex> for ConvexData {
    fn from(shape: ShapeConvex) -> Self {
        ConvexData {
            vertices: shape.vertices,
            faces: shape.faces,
        }
    }
}

fn newell_normal(vertices: &[Vec3], face: &[u32]) -> Vec3 {
    let mut normal = Vec3::ZERO;
    for (i, &index) in face.iter().enumerate() {
        let a = vertices[index as usize];
        let b = vertices[face[(i + 1) % face.len()] as usize];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    normal
}

fn push_unique_direction(dirs: &mut Vec<Vec3>, dir: Vec3) {
    let parallel = dirs
        .iter()
        .any(|existing| existing.cross(dir).length_squared() < 1e-10);
    if !parallel {
        dirs.push(dir);
    }
}

impl ShapeConvex {
    /// Builds a hull from vertices and polygon faces. Faces wound inwards are flipped so every
    /// normal points away from the vertex centroid.
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Vec<u32>>) -> Result<Self, HullError> {
        if vertices.len() < 4 {
            return Err(HullError::TooFewVertices(vertices.len()));
        }
        for (face_index, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(HullError::DegenerateFace(face_index));
            }
            if let Some(&vertex) = face.iter().find(|&&v| v as usize >= vertices.len()) {
                return Err(HullError::BadIndex {
                    face: face_index,
                    vertex,
                });
            }
            if newell_normal(&vertices, face).length_squared() < DEGENERATE_EPSILON_SQ {
                return Err(HullError::ZeroAreaFace(face_index));
            }
        }
        Ok(Self::new_unchecked(vertices, faces))
    }

    /// Same as [`ShapeConvex::new`] for geometry generated in this crate, where every face is
    /// known to index valid vertices. Zero area faces get a zero normal.
    pub(crate) fn new_unchecked(vertices: Vec<Vec3>, mut faces: Vec<Vec<u32>>) -> Self {
        let centroid = vertices.iter().copied().sum::<Vec3>() / vertices.len().max(1) as f32;

        let mut face_normals = Vec::with_capacity(faces.len());
        for face in faces.iter_mut() {
            let mut normal = newell_normal(&vertices, face).normalize_or_zero();
            let on_face = vertices[face[0] as usize];
            if normal.dot(on_face - centroid) < 0.0 {
                face.reverse();
                normal = -normal;
            }
            face_normals.push(normal);
        }

        let mut unique_edges = Vec::new();
        for face in &faces {
            for (i, &index) in face.iter().enumerate() {
                let a = vertices[index as usize];
                let b = vertices[face[(i + 1) % face.len()] as usize];
                if let Some(edge) = (b - a).try_normalize() {
                    push_unique_direction(&mut unique_edges, edge);
                }
            }
        }

        let mut unique_axes = Vec::new();
        for &normal in face_normals.iter().filter(|n| **n != Vec3::ZERO) {
            push_unique_direction(&mut unique_axes, normal);
        }

        let bounds = Bounds::from_points(&vertices);
        let bounding_radius = vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0_f32, f32::max);

        // signed tetrahedra against the origin, valid for any closed outward wound mesh
        let mut volume = 0.0;
        for face in &faces {
            let v0 = vertices[face[0] as usize];
            for i in 1..face.len() - 1 {
                let v1 = vertices[face[i] as usize];
                let v2 = vertices[face[i + 1] as usize];
                volume += v0.dot(v1.cross(v2)) / 6.0;
            }
        }

        ShapeConvex {
            vertices,
            faces,
            face_normals,
            unique_edges,
            unique_axes,
            bounds,
            bounding_radius,
            volume: volume.abs(),
        }
    }

    /// Builds the convex hull of a point cloud. The resulting faces are triangles.
    pub fn from_points(points: &[Vec3]) -> Result<Self, HullError> {
        if points.len() < 4 {
            return Err(HullError::TooFewVertices(points.len()));
        }
        let (vertices, tris) = hull::build_convex_hull(points);
        let faces = tris.iter().map(|tri| vec![tri.a, tri.b, tri.c]).collect();
        Self::new(vertices, faces)
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Vec<u32>] {
        &self.faces
    }

    pub fn face_normals(&self) -> &[Vec3] {
        &self.face_normals
    }

    pub fn unique_edges(&self) -> &[Vec3] {
        &self.unique_edges
    }

    pub fn unique_axes(&self) -> &[Vec3] {
        &self.unique_axes
    }

    pub fn local_bounds(&self) -> Bounds {
        self.bounds
    }

    /// Plane constant of a face such that `normal.dot(p) + constant` is the signed distance of
    /// `p` to the face in local space.
    pub fn face_plane_constant(&self, face: usize) -> f32 {
        -self.face_normals[face].dot(self.vertices[self.faces[face][0] as usize])
    }

    pub fn world_vertex(&self, index: u32, pos: Vec3, orient: Quat) -> Vec3 {
        pos + orient * self.vertices[index as usize]
    }

    pub fn world_face(&self, face: usize, pos: Vec3, orient: Quat) -> Vec<Vec3> {
        self.faces[face]
            .iter()
            .map(|&index| self.world_vertex(index, pos, orient))
            .collect()
    }

    /// Projects the transformed hull on `axis`, returning `(min, max)`.
    pub fn project(&self, axis: Vec3, pos: Vec3, orient: Quat) -> (f32, f32) {
        let local_axis = orient.conjugate() * axis;
        let offset = pos.dot(axis);
        let mut min = f32::MAX;
        let mut max = -f32::MAX;
        for v in &self.vertices {
            let d = v.dot(local_axis);
            min = min.min(d);
            max = max.max(d);
        }
        (min + offset, max + offset)
    }
}

impl ShapeTrait for ShapeConvex {
    fn volume(&self) -> f32 {
        self.volume
    }

    fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    fn inertia_tensor(&self, mass: f32) -> Mat3 {
        // approximated by the local bounding box
        let h = self.bounds.width() * 0.5;
        let h2 = h * h;
        Mat3::from_diagonal(Vec3::new(h2.y + h2.z, h2.x + h2.z, h2.x + h2.y) * (mass / 3.0))
    }

    fn bounds(&self, pos: Vec3, orient: Quat) -> Bounds {
        let mut bounds = Bounds::new();
        for v in &self.vertices {
            bounds.expand_by_point(pos + orient * *v);
        }
        bounds
    }
}

/// Incremental hull expansion: start from a tetrahedron and repeatedly add the furthest
/// external point, replacing every triangle that can see it.
mod hull {
    use glam::Vec3;

    #[derive(Clone, Copy, Debug)]
    pub(super) struct Tri {
        pub a: u32,
        pub b: u32,
        pub c: u32,
    }

    impl Tri {
        fn edges(&self) -> [Edge; 3] {
            [
                Edge { a: self.a, b: self.b },
                Edge { a: self.b, b: self.c },
                Edge { a: self.c, b: self.a },
            ]
        }
    }

    #[derive(Copy, Clone, Debug)]
    struct Edge {
        a: u32,
        b: u32,
    }

    impl PartialEq for Edge {
        fn eq(&self, other: &Self) -> bool {
            (self.a == other.a && self.b == other.b) || (self.a == other.b && self.b == other.a)
        }
    }

    fn furthest_in_dir(pts: &[Vec3], dir: Vec3) -> usize {
        let mut max_idx = 0;
        let mut max_dist = dir.dot(pts[0]);
        for (i, pt) in pts.iter().enumerate().skip(1) {
            let dist = dir.dot(*pt);
            if dist > max_dist {
                max_dist = dist;
                max_idx = i;
            }
        }
        max_idx
    }

    fn distance_from_line(a: Vec3, b: Vec3, pt: Vec3) -> f32 {
        let ab = (b - a).normalize_or_zero();
        let ray = pt - a;
        (ray - ab * ray.dot(ab)).length()
    }

    fn distance_from_triangle(a: Vec3, b: Vec3, c: Vec3, pt: Vec3) -> f32 {
        let normal = (b - a).cross(c - a).normalize_or_zero();
        (pt - a).dot(normal)
    }

    fn tri_distance(points: &[Vec3], tri: &Tri, pt: Vec3) -> f32 {
        distance_from_triangle(
            points[tri.a as usize],
            points[tri.b as usize],
            points[tri.c as usize],
            pt,
        )
    }

    fn build_tetrahedron(verts: &[Vec3]) -> (Vec<Vec3>, Vec<Tri>) {
        let mut p0 = verts[furthest_in_dir(verts, Vec3::X)];
        let mut p1 = verts[furthest_in_dir(verts, -p0)];

        let p2 = *verts
            .iter()
            .max_by(|l, r| distance_from_line(p0, p1, **l).total_cmp(&distance_from_line(p0, p1, **r)))
            .unwrap_or(&verts[0]);
        let p3 = *verts
            .iter()
            .max_by(|l, r| {
                let dl = distance_from_triangle(p0, p1, p2, **l).abs();
                let dr = distance_from_triangle(p0, p1, p2, **r).abs();
                dl.total_cmp(&dr)
            })
            .unwrap_or(&verts[0]);

        // keeps every face counter clockwise seen from outside
        if distance_from_triangle(p0, p1, p2, p3) > 0.0 {
            std::mem::swap(&mut p0, &mut p1);
        }

        let points = vec![p0, p1, p2, p3];
        let tris = vec![
            Tri { a: 0, b: 1, c: 2 },
            Tri { a: 0, b: 2, c: 3 },
            Tri { a: 2, b: 1, c: 3 },
            Tri { a: 1, b: 0, c: 3 },
        ];
        (points, tris)
    }

    fn remove_internal_points(hull_points: &[Vec3], hull_tris: &[Tri], check_pts: &mut Vec<Vec3>) {
        check_pts.retain(|&pt| {
            let is_external = hull_tris
                .iter()
                .any(|tri| tri_distance(hull_points, tri, pt) > 0.0);
            // points within a centimetre of the hull are dropped too
            let too_close = hull_points
                .iter()
                .any(|hull_pt| (*hull_pt - pt).length_squared() < 0.01 * 0.01);
            is_external && !too_close
        });
    }

    fn add_point(hull_points: &mut Vec<Vec3>, hull_tris: &mut Vec<Tri>, pt: Vec3) {
        let facing: Vec<usize> = (0..hull_tris.len())
            .filter(|&i| tri_distance(hull_points, &hull_tris[i], pt) > 0.0)
            .collect();

        // the horizon is made of edges used by exactly one facing triangle
        let mut horizon = Vec::new();
        for &tri_idx in &facing {
            for edge in hull_tris[tri_idx].edges() {
                let shared = facing
                    .iter()
                    .filter(|&&other| other != tri_idx)
                    .any(|&other| hull_tris[other].edges().contains(&edge));
                if !shared {
                    horizon.push(edge);
                }
            }
        }

        for &tri_idx in facing.iter().rev() {
            hull_tris.remove(tri_idx);
        }

        hull_points.push(pt);
        let new_idx = hull_points.len() as u32 - 1;
        hull_tris.extend(horizon.iter().map(|edge| Tri {
            a: edge.a,
            b: edge.b,
            c: new_idx,
        }));
    }

    fn remove_unreferenced_verts(hull_points: &mut Vec<Vec3>, hull_tris: &mut [Tri]) {
        let mut i = 0;
        while i < hull_points.len() as u32 {
            let is_used = hull_tris
                .iter()
                .any(|tri| tri.a == i || tri.b == i || tri.c == i);
            if is_used {
                i += 1;
                continue;
            }

            for tri in hull_tris.iter_mut() {
                if tri.a > i {
                    tri.a -= 1;
                }
                if tri.b > i {
                    tri.b -= 1;
                }
                if tri.c > i {
                    tri.c -= 1;
                }
            }
            hull_points.remove(i as usize);
        }
    }

    pub(super) fn build_convex_hull(verts: &[Vec3]) -> (Vec<Vec3>, Vec<Tri>) {
        let (mut hull_points, mut hull_tris) = build_tetrahedron(verts);

        let mut external = verts.to_vec();
        remove_internal_points(&hull_points, &hull_tris, &mut external);

        while !external.is_empty() {
            let pt_idx = furthest_in_dir(&external, external[0]);
            let pt = external.swap_remove(pt_idx);
            add_point(&mut hull_points, &mut hull_tris, pt);
            remove_internal_points(&hull_points, &hull_tris, &mut external);
        }

        remove_unreferenced_verts(&mut hull_points, &mut hull_tris);
        (hull_points, hull_tris)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octahedron_points() -> Vec<Vec3> {
        vec![Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z]
    }

    #[test]
    fn test_hull_from_points_is_outward() {
        let mut pts = octahedron_points();
        // interior points must not survive
        pts.push(Vec3::ZERO);
        pts.push(Vec3::splat(0.1));
        let hull = ShapeConvex::from_points(&pts).unwrap();
        assert_eq!(hull.vertices().len(), 6);
        assert_eq!(hull.faces().len(), 8);
        for (face, normal) in hull.faces().iter().zip(hull.face_normals()) {
            let v = hull.vertices()[face[0] as usize];
            assert!(normal.dot(v) > 0.0);
        }
        assert!((hull.volume() - 4.0 / 3.0).abs() < 1e-4);
        assert_eq!(hull.unique_axes().len(), 4);
    }

    #[test]
    fn test_inward_faces_are_flipped() {
        let vertices = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let faces = vec![vec![0, 1, 2], vec![0, 1, 3], vec![0, 2, 3], vec![1, 2, 3]];
        let hull = ShapeConvex::new(vertices, faces).unwrap();
        let centroid = Vec3::splat(0.25);
        for (face, normal) in hull.faces().iter().zip(hull.face_normals()) {
            let v = hull.vertices()[face[0] as usize];
            assert!(normal.dot(v - centroid) > 0.0);
        }
        assert!((hull.volume() - 1.0 / 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_invalid_hulls() {
        assert_eq!(
            ShapeConvex::new(vec![Vec3::ZERO; 3], vec![]).unwrap_err(),
            HullError::TooFewVertices(3)
        );
        let vertices = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        assert_eq!(
            ShapeConvex::new(vertices.clone(), vec![vec![0, 1]]).unwrap_err(),
            HullError::DegenerateFace(0)
        );
        assert_eq!(
            ShapeConvex::new(vertices, vec![vec![0, 1, 9]]).unwrap_err(),
            HullError::BadIndex { face: 0, vertex: 9 }
        );
    }

    #[test]
    fn test_project() {
        let hull = ShapeConvex::from_points(&octahedron_points()).unwrap();
        let (min, max) = hull.project(Vec3::X, Vec3::new(3.0, 0.0, 0.0), Quat::IDENTITY);
        assert!((min - 2.0).abs() < 1e-5);
        assert!((max - 4.0).abs() < 1e-5);
    }
}
