mod io;
mod shape_box;
mod shape_convex;
mod shape_cylinder;
mod shape_plane;
mod shape_sphere;

use crate::bounds::Bounds;
use glam::{Mat3, Quat, Vec3};
use std::{fmt, ops::Deref, sync::Arc};

pub use io::{load_convex_shape, save_convex_shape, ShapeIoError};
pub use shape_box::ShapeBox;
pub use shape_convex::{HullError, ShapeConvex};
pub use shape_cylinder::ShapeCylinder;
pub use shape_plane::ShapePlane;
pub use shape_sphere::ShapeSphere;

trait ShapeTrait {
    fn volume(&self) -> f32;
    fn bounding_radius(&self) -> f32;
    /// Inertia tensor about the shape origin for the given mass.
    fn inertia_tensor(&self, mass: f32) -> Mat3;
    fn bounds(&self, translation: Vec3, orientation: Quat) -> Bounds;
}

/// Type tag of a [`Shape`], used for logging and pair dispatch diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Sphere,
    Plane,
    Box,
    ConvexPolyhedron,
    Cylinder,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Sphere => "sphere",
            ShapeKind::Plane => "plane",
            ShapeKind::Box => "box",
            ShapeKind::ConvexPolyhedron => "convex",
            ShapeKind::Cylinder => "cylinder",
        };
        f.write_str(name)
    }
}

/// Immutable collision geometry. Polyhedral shapes sit behind an `Arc` so that many bodies can
/// share one hull.
#[derive(Clone, Debug)]
pub enum Shape {
    Sphere(ShapeSphere),
    Plane(ShapePlane),
    Box(Arc<ShapeBox>),
    Convex(Arc<ShapeConvex>),
    Cylinder(Arc<ShapeCylinder>),
}

impl Default for Shape {
    fn default() -> Shape {
        Shape::Sphere(ShapeSphere { radius: 1.0 })
    }
}

impl Shape {
    pub fn make_sphere(radius: f32) -> Self {
        Shape::Sphere(ShapeSphere { radius })
    }

    pub fn make_plane() -> Self {
        Shape::Plane(ShapePlane)
    }

    pub fn make_box(half_extents: Vec3) -> Self {
        Shape::Box(Arc::new(ShapeBox::new(half_extents)))
    }

    pub fn make_convex(data: Arc<ShapeConvex>) -> Self {
        Shape::Convex(data)
    }

    pub fn make_cylinder(radius_top: f32, radius_bottom: f32, height: f32, segments: u32) -> Self {
        Shape::Cylinder(Arc::new(ShapeCylinder::new(
            radius_top,
            radius_bottom,
            height,
            segments,
        )))
    }

    fn shape_trait(&self) -> &dyn ShapeTrait {
        match self {
            Shape::Sphere(data) => data,
            Shape::Plane(data) => data,
            Shape::Box(data) => data.deref(),
            Shape::Convex(data) => data.deref(),
            Shape::Cylinder(data) => data.deref(),
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Sphere(_) => ShapeKind::Sphere,
            Shape::Plane(_) => ShapeKind::Plane,
            Shape::Box(_) => ShapeKind::Box,
            Shape::Convex(_) => ShapeKind::ConvexPolyhedron,
            Shape::Cylinder(_) => ShapeKind::Cylinder,
        }
    }

    /// The polyhedral representation used by the separating axis test, if the shape has one.
    pub fn convex_hull(&self) -> Option<&ShapeConvex> {
        match self {
            Shape::Box(data) => Some(&data.hull),
            Shape::Convex(data) => Some(data.deref()),
            Shape::Cylinder(data) => Some(&data.hull),
            Shape::Sphere(_) | Shape::Plane(_) => None,
        }
    }

    pub fn volume(&self) -> f32 {
        self.shape_trait().volume()
    }

    pub fn bounding_radius(&self) -> f32 {
        self.shape_trait().bounding_radius()
    }

    pub fn inertia_tensor(&self, mass: f32) -> Mat3 {
        self.shape_trait().inertia_tensor(mass)
    }

    pub fn bounds(&self, translation: Vec3, orientation: Quat) -> Bounds {
        self.shape_trait().bounds(translation, orientation)
    }
}
