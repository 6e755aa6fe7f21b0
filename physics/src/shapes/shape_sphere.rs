use super::ShapeTrait;
use crate::bounds::Bounds;
use glam::{Mat3, Quat, Vec3};

#[derive(Copy, Clone, Debug)]
pub struct ShapeSphere {
    pub radius: f32,
}

impl ShapeTrait for ShapeSphere {
    fn volume(&self) -> f32 {
        4.0 / 3.0 * std::f32::consts::PI * self.radius * self.radius * self.radius
    }

    fn bounding_radius(&self) -> f32 {
        self.radius
    }

    fn inertia_tensor(&self, mass: f32) -> Mat3 {
        let i = 2.0 * mass * self.radius * self.radius / 5.0;
        Mat3::from_diagonal(Vec3::splat(i))
    }

    fn bounds(&self, pos: Vec3, _: Quat) -> Bounds {
        Bounds {
            mins: Vec3::splat(-self.radius) + pos,
            maxs: Vec3::splat(self.radius) + pos,
        }
    }
}
