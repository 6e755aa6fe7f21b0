use super::{ShapeConvex, ShapeTrait};
use crate::bounds::Bounds;
use glam::{Mat3, Quat, Vec3};

/// Box centred on the shape origin. Collision goes through the polyhedral `hull`.
#[derive(Clone, Debug)]
pub struct ShapeBox {
    pub half_extents: Vec3,
    pub hull: ShapeConvex,
}

fn box_hull(h: Vec3) -> ShapeConvex {
    let vertices = vec![
        Vec3::new(-h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y, -h.z),
        Vec3::new(h.x, h.y, -h.z),
        Vec3::new(-h.x, h.y, -h.z),
        Vec3::new(-h.x, -h.y, h.z),
        Vec3::new(h.x, -h.y, h.z),
        Vec3::new(h.x, h.y, h.z),
        Vec3::new(-h.x, h.y, h.z),
    ];
    let faces = vec![
        vec![3, 2, 1, 0], // -z
        vec![4, 5, 6, 7], // +z
        vec![5, 4, 0, 1], // -y
        vec![2, 3, 7, 6], // +y
        vec![0, 4, 7, 3], // -x
        vec![1, 2, 6, 5], // +x
    ];
    ShapeConvex::new_unchecked(vertices, faces)
}

impl ShapeBox {
    pub fn new(half_extents: Vec3) -> Self {
        let half_extents = half_extents.abs();
        ShapeBox {
            half_extents,
            hull: box_hull(half_extents),
        }
    }
}

impl ShapeTrait for ShapeBox {
    fn volume(&self) -> f32 {
        8.0 * self.half_extents.x * self.half_extents.y * self.half_extents.z
    }

    fn bounding_radius(&self) -> f32 {
        self.half_extents.length()
    }

    fn inertia_tensor(&self, mass: f32) -> Mat3 {
        let h2 = self.half_extents * self.half_extents;
        Mat3::from_diagonal(Vec3::new(h2.y + h2.z, h2.x + h2.z, h2.x + h2.y) * (mass / 3.0))
    }

    fn bounds(&self, pos: Vec3, orient: Quat) -> Bounds {
        let h = self.half_extents;
        Bounds {
            mins: -h,
            maxs: h,
        }
        .transformed(pos, orient)
    }
}
