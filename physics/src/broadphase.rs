use crate::body::{Body, BodyHandle, SleepState};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Candidate pair, `a` always has the lower handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollisionPair {
    pub a: BodyHandle,
    pub b: BodyHandle,
}

impl CollisionPair {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a.0 <= b.0 {
            CollisionPair { a, b }
        } else {
            CollisionPair { a: b, b: a }
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepAxis {
    /// Re-picked each step as the axis with the largest spread of body positions.
    #[default]
    Auto,
    X,
    Y,
    Z,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadphaseKind {
    Naive,
    SweepAndPrune { axis: SweepAxis },
}

impl Default for BroadphaseKind {
    fn default() -> Self {
        BroadphaseKind::SweepAndPrune {
            axis: SweepAxis::Auto,
        }
    }
}

impl BroadphaseKind {
    pub fn build(self) -> Box<dyn Broadphase> {
        match self {
            BroadphaseKind::Naive => Box::new(NaiveBroadphase),
            BroadphaseKind::SweepAndPrune { axis } => Box::new(SweepAndPrune::new(axis)),
        }
    }
}

pub trait Broadphase: std::fmt::Debug {
    /// Clears `pairs` and fills it with every body pair whose bounding volumes overlap and that
    /// passes [`need_broadphase_collision`].
    fn collision_pairs(&mut self, bodies: &mut [Body], pairs: &mut Vec<CollisionPair>);

    fn body_added(&mut self, _handle: BodyHandle) {}

    fn body_removed(&mut self, _handle: BodyHandle) {}
}

/// Collision filters must accept each other, and at least one body has to be able to move.
pub fn need_broadphase_collision(a: &Body, b: &Body) -> bool {
    if a.collision_filter_group & b.collision_filter_mask == 0
        || b.collision_filter_group & a.collision_filter_mask == 0
    {
        return false;
    }
    if a.shapes().is_empty() || b.shapes().is_empty() {
        return false;
    }
    let frozen = |body: &Body| body.is_static() || body.sleep_state() == SleepState::Sleeping;
    !(frozen(a) && frozen(b))
}

fn refresh_bounds(bodies: &mut [Body]) {
    for body in bodies.iter_mut().filter(|body| body.aabb_needs_update()) {
        body.update_aabb();
    }
}

/// Tests every pair, using bounding spheres unless one of the bodies is unbounded.
#[derive(Debug, Default)]
pub struct NaiveBroadphase;

impl NaiveBroadphase {
    fn bounding_volumes_overlap(a: &Body, b: &Body) -> bool {
        let (ra, rb) = (a.bounding_radius(), b.bounding_radius());
        if ra == f32::MAX || rb == f32::MAX {
            return a.aabb().overlaps(b.aabb());
        }
        let r = ra + rb;
        a.position.distance_squared(b.position) < r * r
    }
}

impl Broadphase for NaiveBroadphase {
    fn collision_pairs(&mut self, bodies: &mut [Body], pairs: &mut Vec<CollisionPair>) {
        pairs.clear();
        refresh_bounds(bodies);

        for (i, a) in bodies.iter().enumerate() {
            for (j, b) in bodies.iter().enumerate().skip(i + 1) {
                if need_broadphase_collision(a, b) && Self::bounding_volumes_overlap(a, b) {
                    pairs.push(CollisionPair::new(BodyHandle(i as u32), BodyHandle(j as u32)));
                }
            }
        }
    }
}

/// Keeps bodies sorted by their bounding box minimum along one axis. The order changes little
/// between steps so an insertion sort is close to linear.
#[derive(Debug)]
pub struct SweepAndPrune {
    pub axis: SweepAxis,
    order: Vec<u32>,
}

impl SweepAndPrune {
    pub fn new(axis: SweepAxis) -> Self {
        SweepAndPrune {
            axis,
            order: Vec::new(),
        }
    }

    fn axis_index(&self, bodies: &[Body]) -> usize {
        match self.axis {
            SweepAxis::X => 0,
            SweepAxis::Y => 1,
            SweepAxis::Z => 2,
            SweepAxis::Auto => max_variance_axis(bodies),
        }
    }

    fn sync_order(&mut self, body_count: usize) {
        if self.order.len() != body_count {
            self.order = (0..body_count as u32).collect();
        }
    }
}

impl Default for SweepAndPrune {
    fn default() -> Self {
        Self::new(SweepAxis::Auto)
    }
}

/// Axis with the largest variance of body positions.
pub fn max_variance_axis(bodies: &[Body]) -> usize {
    if bodies.len() < 2 {
        return 0;
    }
    let mut sum = Vec3::ZERO;
    let mut sum_sq = Vec3::ZERO;
    for body in bodies {
        sum += body.position;
        sum_sq += body.position * body.position;
    }
    let variance = sum_sq - sum * sum / bodies.len() as f32;
    if variance.x >= variance.y && variance.x >= variance.z {
        0
    } else if variance.y >= variance.z {
        1
    } else {
        2
    }
}

fn insertion_sort_by_min(order: &mut [u32], bodies: &[Body], axis: usize) {
    let key = |index: u32| bodies[index as usize].aabb().mins[axis];
    for i in 1..order.len() {
        let current = order[i];
        let value = key(current);
        let mut j = i;
        while j > 0 && key(order[j - 1]) > value {
            order[j] = order[j - 1];
            j -= 1;
        }
        order[j] = current;
    }
}

impl Broadphase for SweepAndPrune {
    fn collision_pairs(&mut self, bodies: &mut [Body], pairs: &mut Vec<CollisionPair>) {
        pairs.clear();
        self.sync_order(bodies.len());
        refresh_bounds(bodies);

        let axis = self.axis_index(bodies);
        insertion_sort_by_min(&mut self.order, bodies, axis);

        for (i, &index_a) in self.order.iter().enumerate() {
            let a = &bodies[index_a as usize];
            for &index_b in &self.order[i + 1..] {
                let b = &bodies[index_b as usize];
                // sorted by min, nothing further along can overlap a on this axis
                if b.aabb().mins[axis] > a.aabb().maxs[axis] {
                    break;
                }
                if need_broadphase_collision(a, b) && a.aabb().overlaps(b.aabb()) {
                    pairs.push(CollisionPair::new(BodyHandle(index_a), BodyHandle(index_b)));
                }
            }
        }
    }

    fn body_added(&mut self, handle: BodyHandle) {
        self.order.push(handle.0);
    }

    fn body_removed(&mut self, handle: BodyHandle) {
        self.order.retain(|&index| index != handle.0);
        for index in self.order.iter_mut() {
            if *index > handle.0 {
                *index -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Shape;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    fn sphere_at(position: Vec3) -> Body {
        Body::new(1.0)
            .with_shape(Shape::make_sphere(0.5))
            .with_position(position)
    }

    #[test]
    fn test_strategies_agree() {
        let mut rng = Pcg32::seed_from_u64(7);
        let mut bodies: Vec<Body> = (0..60)
            .map(|_| {
                let p = Vec3::new(
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                );
                Body::new(1.0)
                    .with_shape(Shape::make_box(Vec3::splat(0.6)))
                    .with_position(p)
            })
            .collect();
        bodies.push(
            Body::new(0.0)
                .with_shape(Shape::make_plane())
                .with_position(Vec3::new(0.0, -4.0, 0.0)),
        );

        // box bounds are tighter than bounding spheres, so compare sweep against brute force
        // box overlap
        let mut expected = Vec::new();
        refresh_bounds(&mut bodies);
        for i in 0..bodies.len() {
            for j in i + 1..bodies.len() {
                if need_broadphase_collision(&bodies[i], &bodies[j])
                    && bodies[i].aabb().overlaps(bodies[j].aabb())
                {
                    expected.push(CollisionPair::new(BodyHandle(i as u32), BodyHandle(j as u32)));
                }
            }
        }
        assert!(!expected.is_empty());

        for axis in [SweepAxis::Auto, SweepAxis::X, SweepAxis::Y, SweepAxis::Z] {
            let mut sap = SweepAndPrune::new(axis);
            let mut pairs = Vec::new();
            sap.collision_pairs(&mut bodies, &mut pairs);
            pairs.sort();
            assert_eq!(pairs, expected, "{:?}", axis);
        }

        // every box overlap is also a bounding sphere overlap
        let mut naive = Vec::new();
        NaiveBroadphase.collision_pairs(&mut bodies, &mut naive);
        assert!(expected.iter().all(|pair| naive.contains(pair)));
    }

    #[test]
    fn test_filters() {
        let mut bodies = vec![sphere_at(Vec3::ZERO), sphere_at(Vec3::new(0.5, 0.0, 0.0))];
        let mut pairs = Vec::new();
        NaiveBroadphase.collision_pairs(&mut bodies, &mut pairs);
        assert_eq!(pairs.len(), 1);

        bodies[1].collision_filter_group = 2;
        bodies[0].collision_filter_mask = 1;
        NaiveBroadphase.collision_pairs(&mut bodies, &mut pairs);
        assert!(pairs.is_empty());

        bodies[0].collision_filter_mask = u32::MAX;
        bodies[0].set_mass(0.0);
        bodies[1].sleep();
        NaiveBroadphase.collision_pairs(&mut bodies, &mut pairs);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_auto_axis() {
        let bodies: Vec<Body> = (0..5)
            .map(|i| sphere_at(Vec3::new(0.1 * i as f32, 0.0, 3.0 * i as f32)))
            .collect();
        assert_eq!(max_variance_axis(&bodies), 2);
    }

    #[test]
    fn test_removal_keeps_order_in_sync() {
        let mut bodies: Vec<Body> = (0..4)
            .map(|i| sphere_at(Vec3::new(0.8 * i as f32, 0.0, 0.0)))
            .collect();
        let mut sap = SweepAndPrune::new(SweepAxis::X);
        let mut pairs = Vec::new();
        sap.collision_pairs(&mut bodies, &mut pairs);
        assert_eq!(pairs.len(), 3);

        bodies.remove(1);
        sap.body_removed(BodyHandle(1));
        sap.collision_pairs(&mut bodies, &mut pairs);
        assert_eq!(pairs, vec![CollisionPair::new(BodyHandle(1), BodyHandle(2))]);
    }
}
