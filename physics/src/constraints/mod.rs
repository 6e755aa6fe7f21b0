mod constraint_distance;
mod constraint_point_to_point;

use crate::{
    body::{Body, BodyArena, BodyHandle, BodyId},
    equations::{EquationPool, SpookParams},
};
use glam::Vec3;
use std::fmt;

pub use constraint_distance::ConstraintDistance;
pub use constraint_point_to_point::ConstraintPointToPoint;

/// Stiffness and relaxation used by the equations of standing constraints.
pub const CONSTRAINT_STIFFNESS: f32 = 1e7;
pub const CONSTRAINT_RELAXATION: f32 = 4.0;

/// Identity of a constraint in its [`ConstraintArena`]. Stays valid until the constraint is
/// removed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintHandle(pub u32);

pub trait ConstraintTrait: fmt::Debug + Send + Sync {
    /// Pushes this step's bilateral equations between the two bodies.
    fn push_equations(
        &self,
        config: &ConstraintConfig,
        a: (BodyHandle, &Body),
        b: (BodyHandle, &Body),
        spook: SpookParams,
        pool: &mut EquationPool,
    );
}

#[derive(Copy, Clone, Debug)]
pub struct ConstraintConfig {
    pub body_a: BodyId,
    pub body_b: BodyId,

    pub pivot_a: Vec3, // the anchor location in body_a's space
    pub pivot_b: Vec3, // the anchor location in body_b's space

    /// Whether contacts between the two constrained bodies are still generated.
    pub collide_connected: bool,
    /// Bound on the impulse of every equation, in both directions.
    pub max_force: f32,
}

impl ConstraintConfig {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        ConstraintConfig {
            body_a,
            body_b,
            pivot_a: Vec3::ZERO,
            pivot_b: Vec3::ZERO,
            collide_connected: true,
            max_force: 1e6,
        }
    }

    /// World oriented arms from each centre of mass to its pivot, and the world pivots.
    fn world_pivots(&self, a: &Body, b: &Body) -> (Vec3, Vec3, Vec3, Vec3) {
        let ra = a.vector_to_world_frame(self.pivot_a);
        let rb = b.vector_to_world_frame(self.pivot_b);
        (ra, rb, a.position + ra, b.position + rb)
    }
}

#[derive(Debug)]
pub struct Constraint {
    constraint: Box<dyn ConstraintTrait>,
    pub config: ConstraintConfig,
}

impl Constraint {
    /// Keeps the centres of the two bodies `distance` apart.
    pub fn distance(body_a: BodyId, body_b: BodyId, distance: f32) -> Self {
        Constraint {
            constraint: Box::new(ConstraintDistance { distance }),
            config: ConstraintConfig::new(body_a, body_b),
        }
    }

    /// Pins a point on each body together. Pivots are in body space.
    pub fn point_to_point(body_a: BodyId, pivot_a: Vec3, body_b: BodyId, pivot_b: Vec3) -> Self {
        Constraint {
            constraint: Box::new(ConstraintPointToPoint),
            config: ConstraintConfig {
                pivot_a,
                pivot_b,
                ..ConstraintConfig::new(body_a, body_b)
            },
        }
    }

    pub fn with_collide_connected(mut self, collide_connected: bool) -> Self {
        self.config.collide_connected = collide_connected;
        self
    }

    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.config.max_force = max_force;
        self
    }

    pub fn connects(&self, a: BodyId, b: BodyId) -> bool {
        (self.config.body_a == a && self.config.body_b == b)
            || (self.config.body_a == b && self.config.body_b == a)
    }
}

#[derive(Debug, Default)]
pub struct ConstraintArena {
    constraints: Vec<(ConstraintHandle, Constraint)>,
    next_handle: u32,
}

impl ConstraintArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: Constraint) -> ConstraintHandle {
        let handle = ConstraintHandle(self.next_handle);
        self.next_handle += 1;
        self.constraints.push((handle, constraint));
        handle
    }

    pub fn remove(&mut self, handle: ConstraintHandle) -> Option<Constraint> {
        let index = self.constraints.iter().position(|(h, _)| *h == handle)?;
        Some(self.constraints.remove(index).1)
    }

    /// Drops every constraint attached to `body`, returning how many were removed.
    pub fn remove_body(&mut self, body: BodyId) -> usize {
        let before = self.constraints.len();
        self.constraints
            .retain(|(_, c)| c.config.body_a != body && c.config.body_b != body);
        before - self.constraints.len()
    }

    pub fn get(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find_map(|(h, c)| (*h == handle).then_some(c))
    }

    pub fn get_mut(&mut self, handle: ConstraintHandle) -> Option<&mut Constraint> {
        self.constraints
            .iter_mut()
            .find_map(|(h, c)| (*h == handle).then_some(c))
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// True when some constraint between `a` and `b` suppresses their contacts.
    pub fn excludes_collision(&self, a: BodyId, b: BodyId) -> bool {
        self.constraints
            .iter()
            .any(|(_, c)| !c.config.collide_connected && c.connects(a, b))
    }

    pub fn push_equations(&self, bodies: &BodyArena, spook: SpookParams, pool: &mut EquationPool) {
        for (handle, constraint) in &self.constraints {
            let config = &constraint.config;
            let (Some(ha), Some(hb)) = (bodies.handle_of(config.body_a), bodies.handle_of(config.body_b))
            else {
                tracing::trace!(?handle, "constraint body missing");
                continue;
            };
            if ha == hb {
                continue;
            }
            let (a, b) = (bodies.get_body(ha), bodies.get_body(hb));
            constraint
                .constraint
                .push_equations(config, (ha, a), (hb, b), spook, pool);
        }
    }
}
