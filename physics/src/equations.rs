use crate::body::{Body, BodyHandle};
use glam::Vec3;
use rustc_hash::FxHashMap;
use std::ops::Range;

/// One side of a constraint Jacobian.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct JacobianElement {
    pub spatial: Vec3,
    pub rotational: Vec3,
}

impl JacobianElement {
    pub fn multiply_vectors(&self, spatial: Vec3, rotational: Vec3) -> f32 {
        self.spatial.dot(spatial) + self.rotational.dot(rotational)
    }
}

/// Constraint softening derived from a stiffness and a relaxation time in steps.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpookParams {
    pub a: f32,
    pub b: f32,
    pub eps: f32,
}

impl SpookParams {
    pub fn new(stiffness: f32, relaxation: f32, dt: f32) -> Self {
        let d = relaxation;
        let k = stiffness;
        let h = dt;
        SpookParams {
            a: 4.0 / (h * (1.0 + 4.0 * d)),
            b: (4.0 * d) / (1.0 + 4.0 * d),
            eps: 4.0 / (h * h * k * (1.0 + 4.0 * d)),
        }
    }
}

/// Memoizes [`SpookParams`] per stiffness and relaxation pair for one time step size.
#[derive(Debug, Default)]
pub struct SpookCache {
    dt: f32,
    params: FxHashMap<(u32, u32), SpookParams>,
}

impl SpookCache {
    pub fn get(&mut self, stiffness: f32, relaxation: f32, dt: f32) -> SpookParams {
        if self.dt != dt {
            self.params.clear();
            self.dt = dt;
        }
        *self
            .params
            .entry((stiffness.to_bits(), relaxation.to_bits()))
            .or_insert_with(|| SpookParams::new(stiffness, relaxation, dt))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EquationKind {
    /// Non-penetration, impulse bounded below by zero.
    Contact,
    /// Tangential friction bounded by the impulse of its contacts.
    Friction,
    /// Produced by a standing constraint.
    Constraint,
}

/// A velocity level constraint between two bodies.
#[derive(Clone, Debug)]
pub struct Equation {
    pub kind: EquationKind,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub ga: JacobianElement,
    pub gb: JacobianElement,
    /// Position error along the constraint, negative when violated.
    pub g: f32,
    /// Scales the linear relative velocity term, `1 + e` for contacts.
    pub velocity_scale: f32,
    pub min_force: f32,
    pub max_force: f32,
    pub spook: SpookParams,
    /// For friction, the range of contact equations whose summed impulse times `friction`
    /// bounds this equation.
    pub normal_range: Option<Range<usize>>,
    pub friction: f32,
    /// Constraint force found by the last solve.
    pub multiplier: f32,
}

impl Equation {
    /// Contact along `normal`, pointing from B into A. `ra` and `rb` are world oriented arms from
    /// each centre of mass to its contact point.
    pub fn contact(
        a: (BodyHandle, &Body),
        b: (BodyHandle, &Body),
        normal: Vec3,
        ra: Vec3,
        rb: Vec3,
        restitution: f32,
        spook: SpookParams,
    ) -> Self {
        let g = normal.dot((a.1.position + ra) - (b.1.position + rb));
        Equation {
            kind: EquationKind::Contact,
            body_a: a.0,
            body_b: b.0,
            ga: JacobianElement {
                spatial: normal,
                rotational: ra.cross(normal),
            },
            gb: JacobianElement {
                spatial: -normal,
                rotational: -rb.cross(normal),
            },
            g,
            velocity_scale: 1.0 + restitution,
            min_force: 0.0,
            max_force: f32::MAX,
            spook,
            normal_range: None,
            friction: 0.0,
            multiplier: 0.0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn friction(
        a: BodyHandle,
        b: BodyHandle,
        tangent: Vec3,
        ra: Vec3,
        rb: Vec3,
        friction: f32,
        normal_range: Range<usize>,
        spook: SpookParams,
    ) -> Self {
        Equation {
            kind: EquationKind::Friction,
            body_a: a,
            body_b: b,
            ga: JacobianElement {
                spatial: tangent,
                rotational: ra.cross(tangent),
            },
            gb: JacobianElement {
                spatial: -tangent,
                rotational: -rb.cross(tangent),
            },
            g: 0.0,
            velocity_scale: 1.0,
            min_force: 0.0,
            max_force: 0.0,
            spook,
            normal_range: Some(normal_range),
            friction,
            multiplier: 0.0,
        }
    }

    /// Bilateral constraint keeping `a.position + ra` and `b.position + rb` together along
    /// `axis`.
    pub fn bilateral(
        a: (BodyHandle, &Body),
        b: (BodyHandle, &Body),
        axis: Vec3,
        ra: Vec3,
        rb: Vec3,
        max_force: f32,
        spook: SpookParams,
    ) -> Self {
        let mut equation = Self::contact(a, b, axis, ra, rb, 0.0, spook);
        equation.kind = EquationKind::Constraint;
        equation.min_force = -max_force;
        equation.max_force = max_force;
        equation
    }

    /// Relative velocity along the constraint.
    pub fn compute_gw(&self, a: &Body, b: &Body) -> f32 {
        self.velocity_scale
            * (self.ga.spatial.dot(a.linear_velocity) + self.gb.spatial.dot(b.linear_velocity))
            + self.ga.rotational.dot(a.angular_velocity)
            + self.gb.rotational.dot(b.angular_velocity)
    }

    pub fn compute_gw_lambda(&self, a: &Body, b: &Body) -> f32 {
        self.ga.multiply_vectors(a.vlambda, a.wlambda)
            + self.gb.multiply_vectors(b.vlambda, b.wlambda)
    }

    /// Velocity change the external forces would produce along the constraint this step.
    pub fn compute_gimf(&self, a: &Body, b: &Body) -> f32 {
        self.ga.multiply_vectors(
            a.force * a.inv_mass_solve,
            a.inv_inertia_world_solve * a.torque,
        ) + self.gb.multiply_vectors(
            b.force * b.inv_mass_solve,
            b.inv_inertia_world_solve * b.torque,
        )
    }

    /// Effective inverse mass without softening.
    pub fn compute_gimgt(&self, a: &Body, b: &Body) -> f32 {
        a.inv_mass_solve * self.ga.spatial.length_squared()
            + b.inv_mass_solve * self.gb.spatial.length_squared()
            + self.ga.rotational.dot(a.inv_inertia_world_solve * self.ga.rotational)
            + self.gb.rotational.dot(b.inv_inertia_world_solve * self.gb.rotational)
    }

    pub fn compute_b(&self, a: &Body, b: &Body, dt: f32) -> f32 {
        -self.g * self.spook.a - self.compute_gw(a, b) * self.spook.b
            - dt * self.compute_gimf(a, b)
    }

    pub fn compute_c(&self, a: &Body, b: &Body) -> f32 {
        self.compute_gimgt(a, b) + self.spook.eps
    }

    /// Applies an impulse along the constraint to the solver velocity accumulators.
    pub fn add_to_wlambda(&self, a: &mut Body, b: &mut Body, delta_lambda: f32) {
        a.vlambda += self.ga.spatial * (a.inv_mass_solve * delta_lambda);
        b.vlambda += self.gb.spatial * (b.inv_mass_solve * delta_lambda);
        a.wlambda += a.inv_inertia_world_solve * self.ga.rotational * delta_lambda;
        b.wlambda += b.inv_inertia_world_solve * self.gb.rotational * delta_lambda;
    }
}

/// Equations reused across steps. Slots past the live count keep their allocation.
#[derive(Debug, Default)]
pub struct EquationPool {
    equations: Vec<Equation>,
    live: usize,
}

impl EquationPool {
    pub fn reset(&mut self) {
        self.live = 0;
    }

    /// Index of the pushed equation.
    pub fn push(&mut self, equation: Equation) -> usize {
        let index = self.live;
        if index < self.equations.len() {
            self.equations[index] = equation;
        } else {
            self.equations.push(equation);
        }
        self.live += 1;
        index
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.equations.len()
    }

    pub fn as_slice(&self) -> &[Equation] {
        &self.equations[..self.live]
    }

    pub fn as_mut_slice(&mut self) -> &mut [Equation] {
        &mut self.equations[..self.live]
    }
}
