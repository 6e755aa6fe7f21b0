use super::{ShapeConvex, ShapeTrait};
use crate::bounds::Bounds;
use glam::{Mat3, Quat, Vec3};
use std::f32::consts::TAU;

/// Cylinder or truncated cone along the local Y axis, approximated by a prism with
/// `num_segments` sides for collision.
#[derive(Clone, Debug)]
pub struct ShapeCylinder {
    pub radius_top: f32,
    pub radius_bottom: f32,
    pub height: f32,
    pub num_segments: u32,
    pub hull: ShapeConvex,
}

impl ShapeCylinder {
    pub const MIN_SEGMENTS: u32 = 3;

    pub fn new(radius_top: f32, radius_bottom: f32, height: f32, num_segments: u32) -> Self {
        let num_segments = num_segments.max(Self::MIN_SEGMENTS);
        let half_height = height * 0.5;

        let mut vertices = Vec::with_capacity(2 * num_segments as usize);
        for i in 0..num_segments {
            let theta = TAU * i as f32 / num_segments as f32;
            let (sin, cos) = theta.sin_cos();
            vertices.push(Vec3::new(radius_bottom * cos, -half_height, radius_bottom * sin));
            vertices.push(Vec3::new(radius_top * cos, half_height, radius_top * sin));
        }

        let mut faces = Vec::with_capacity(num_segments as usize + 2);
        let bottom = (0..num_segments).map(|i| 2 * i).collect();
        let top = (0..num_segments).rev().map(|i| 2 * i + 1).collect();
        faces.push(bottom);
        faces.push(top);
        for i in 0..num_segments {
            let next = (i + 1) % num_segments;
            faces.push(vec![2 * i, 2 * i + 1, 2 * next + 1, 2 * next]);
        }

        ShapeCylinder {
            radius_top,
            radius_bottom,
            height,
            num_segments,
            hull: ShapeConvex::new_unchecked(vertices, faces),
        }
    }

    fn average_radius(&self) -> f32 {
        0.5 * (self.radius_top + self.radius_bottom)
    }
}

impl ShapeTrait for ShapeCylinder {
    fn volume(&self) -> f32 {
        let (r1, r2) = (self.radius_top, self.radius_bottom);
        std::f32::consts::PI * self.height * (r1 * r1 + r1 * r2 + r2 * r2) / 3.0
    }

    fn bounding_radius(&self) -> f32 {
        let r = self.radius_top.max(self.radius_bottom);
        (r * r + 0.25 * self.height * self.height).sqrt()
    }

    fn inertia_tensor(&self, mass: f32) -> Mat3 {
        let r = self.average_radius();
        let side = mass * (3.0 * r * r + self.height * self.height) / 12.0;
        Mat3::from_diagonal(Vec3::new(side, 0.5 * mass * r * r, side))
    }

    fn bounds(&self, pos: Vec3, orient: Quat) -> Bounds {
        self.hull.bounds(pos, orient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cylinder_hull() {
        let cylinder = ShapeCylinder::new(1.0, 1.0, 2.0, 8);
        assert_eq!(cylinder.hull.vertices().len(), 16);
        assert_eq!(cylinder.hull.faces().len(), 10);
        let bounds = cylinder.hull.local_bounds();
        assert!((bounds.maxs.y - 1.0).abs() < 1e-6);
        assert!((bounds.mins.y + 1.0).abs() < 1e-6);
        // the octagonal prism is a little smaller than the round cylinder
        assert!(cylinder.hull.volume() < cylinder.volume());
        assert!(cylinder.hull.volume() > 0.85 * cylinder.volume());
    }

    #[test]
    fn test_too_few_segments() {
        let cylinder = ShapeCylinder::new(0.5, 1.0, 1.0, 1);
        assert_eq!(cylinder.num_segments, ShapeCylinder::MIN_SEGMENTS);
        assert_eq!(cylinder.hull.faces().len(), 5);
    }
}
