use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Axis aligned bounding box.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl Bounds {
    /// An empty box, any point added to it becomes both its min and max.
    pub fn new() -> Bounds {
        Bounds {
            mins: Vec3::splat(f32::MAX),
            maxs: Vec3::splat(-f32::MAX),
        }
    }

    pub fn infinite() -> Bounds {
        Bounds {
            mins: Vec3::splat(f32::NEG_INFINITY),
            maxs: Vec3::splat(f32::INFINITY),
        }
    }

    pub fn from_points(pts: &[Vec3]) -> Self {
        pts.iter().fold(Bounds::new(), |acc, pt| acc + *pt)
    }

    pub fn is_empty(&self) -> bool {
        self.mins.cmpgt(self.maxs).any()
    }

    pub fn expand_by_point(&mut self, pt: Vec3) {
        self.add_assign(pt);
    }

    pub fn expand_by_bounds(&mut self, rhs: &Self) {
        self.mins = self.mins.min(rhs.mins);
        self.maxs = self.maxs.max(rhs.maxs);
    }

    pub fn width(&self) -> Vec3 {
        self.maxs - self.mins
    }

    pub fn overlaps(&self, rhs: &Self) -> bool {
        !(self.maxs.cmplt(rhs.mins).any() || rhs.maxs.cmplt(self.mins).any())
    }

    /// Bounds of this box after rotating and translating its eight corners.
    pub fn transformed(&self, pos: Vec3, orient: Quat) -> Bounds {
        let corners = [
            Vec3::new(self.mins.x, self.mins.y, self.mins.z),
            Vec3::new(self.mins.x, self.mins.y, self.maxs.z),
            Vec3::new(self.mins.x, self.maxs.y, self.mins.z),
            Vec3::new(self.maxs.x, self.mins.y, self.mins.z),
            Vec3::new(self.maxs.x, self.maxs.y, self.maxs.z),
            Vec3::new(self.maxs.x, self.maxs.y, self.mins.z),
            Vec3::new(self.maxs.x, self.mins.y, self.maxs.z),
            Vec3::new(self.mins.x, self.maxs.y, self.maxs.z),
        ];

        let mut bounds = Bounds::new();
        for pt in &corners {
            bounds.expand_by_point((orient * *pt) + pos);
        }
        bounds
    }

    /// Slab test of the segment `from + t * dir` for `t` in `[0, 1]`.
    pub fn intersects_segment(&self, from: Vec3, to: Vec3) -> bool {
        let dir = to - from;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;
        for axis in 0..3 {
            let d = dir[axis];
            let lo = self.mins[axis];
            let hi = self.maxs[axis];
            if d.abs() < f32::EPSILON {
                if from[axis] < lo || from[axis] > hi {
                    return false;
                }
                continue;
            }
            let inv = d.recip();
            let mut t0 = (lo - from[axis]) * inv;
            let mut t1 = (hi - from[axis]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

impl Default for Bounds {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Add<Vec3> for Bounds {
    type Output = Self;
    fn add(self, pt: Vec3) -> Self::Output {
        Bounds {
            mins: Vec3::select(pt.cmplt(self.mins), pt, self.mins),
            maxs: Vec3::select(pt.cmpgt(self.maxs), pt, self.maxs),
        }
    }
}

impl AddAssign<Vec3> for Bounds {
    fn add_assign(&mut self, pt: Vec3) {
        self.mins = Vec3::select(pt.cmplt(self.mins), pt, self.mins);
        self.maxs = Vec3::select(pt.cmpgt(self.maxs), pt, self.maxs);
    }
}
