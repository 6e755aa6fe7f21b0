use super::ShapeTrait;
use crate::bounds::Bounds;
use glam::{Mat3, Quat, Vec3};

/// Infinite plane through the shape origin. The solid half space lies below the local +Y normal.
#[derive(Copy, Clone, Debug, Default)]
pub struct ShapePlane;

impl ShapePlane {
    pub const LOCAL_NORMAL: Vec3 = Vec3::Y;

    pub fn world_normal(orientation: Quat) -> Vec3 {
        orientation * Self::LOCAL_NORMAL
    }
}

impl ShapeTrait for ShapePlane {
    fn volume(&self) -> f32 {
        0.0
    }

    fn bounding_radius(&self) -> f32 {
        f32::MAX
    }

    fn inertia_tensor(&self, _mass: f32) -> Mat3 {
        Mat3::ZERO
    }

    fn bounds(&self, pos: Vec3, orient: Quat) -> Bounds {
        let mut bounds = Bounds::infinite();
        let normal = Self::world_normal(orient);
        for axis in 0..3 {
            let mut unit = Vec3::ZERO;
            unit[axis] = 1.0;
            if normal.abs_diff_eq(unit, 1e-6) {
                bounds.maxs[axis] = pos[axis];
            } else if normal.abs_diff_eq(-unit, 1e-6) {
                bounds.mins[axis] = pos[axis];
            }
        }
        bounds
    }
}
