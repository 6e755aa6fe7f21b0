use crate::{
    body::Body,
    equations::{Equation, EquationKind},
};
use glam::{Mat3, Vec3};

fn pair_mut(bodies: &mut [Body], a: usize, b: usize) -> (&mut Body, &mut Body) {
    if a < b {
        let (lo, hi) = bodies.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = bodies.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

/// Projected Gauss-Seidel over velocity constraints.
#[derive(Debug)]
pub struct GsSolver {
    pub iterations: u32,
    pub tolerance: f32,
    b: Vec<f32>,
    inv_c: Vec<f32>,
    lambda: Vec<f32>,
    active: Vec<bool>,
}

impl Default for GsSolver {
    fn default() -> Self {
        Self::new(10, 1e-7)
    }
}

impl GsSolver {
    pub fn new(iterations: u32, tolerance: f32) -> Self {
        GsSolver {
            iterations,
            tolerance,
            b: Vec::new(),
            inv_c: Vec::new(),
            lambda: Vec::new(),
            active: Vec::new(),
        }
    }

    /// Solves `equations` and adds the resulting velocity changes to `bodies`. Returns the number
    /// of iterations performed.
    pub fn solve(&mut self, dt: f32, bodies: &mut [Body], equations: &mut [Equation]) -> u32 {
        for body in bodies.iter_mut() {
            body.update_solve_mass_properties();
            body.vlambda = Vec3::ZERO;
            body.wlambda = Vec3::ZERO;
        }

        let n = equations.len();
        self.b.clear();
        self.inv_c.clear();
        self.lambda.clear();
        self.active.clear();
        self.lambda.resize(n, 0.0);

        for eq in equations.iter() {
            let (ia, ib) = (eq.body_a.0 as usize, eq.body_b.0 as usize);
            if ia == ib || ia >= bodies.len() || ib >= bodies.len() {
                self.b.push(0.0);
                self.inv_c.push(0.0);
                self.active.push(false);
                continue;
            }
            let (a, b) = (&bodies[ia], &bodies[ib]);
            let gimgt = eq.compute_gimgt(a, b);
            let rhs = eq.compute_b(a, b, dt);
            // zero effective mass, nothing to push against
            let usable = gimgt > 0.0 && gimgt.is_finite() && rhs.is_finite();
            self.b.push(rhs);
            self.inv_c.push(if usable {
                1.0 / eq.compute_c(a, b)
            } else {
                0.0
            });
            self.active.push(usable);
        }

        let mut iterations = 0;
        if n > 0 {
            let tolerance_squared = self.tolerance * self.tolerance;
            for _ in 0..self.iterations {
                iterations += 1;
                let mut delta_total = 0.0;

                for (j, eq) in equations.iter_mut().enumerate() {
                    if !self.active[j] {
                        continue;
                    }

                    if eq.kind == EquationKind::Friction {
                        if let Some(range) = eq.normal_range.clone() {
                            let normal_impulse: f32 = self.lambda[range].iter().sum();
                            eq.max_force = eq.friction * normal_impulse;
                            eq.min_force = -eq.max_force;
                        }
                    }

                    let (a, b) = pair_mut(bodies, eq.body_a.0 as usize, eq.body_b.0 as usize);
                    let gw_lambda = eq.compute_gw_lambda(a, b);
                    let lambda = self.lambda[j];
                    let mut delta_lambda =
                        self.inv_c[j] * (self.b[j] - gw_lambda - eq.spook.eps * lambda);

                    if lambda + delta_lambda < eq.min_force {
                        delta_lambda = eq.min_force - lambda;
                    } else if lambda + delta_lambda > eq.max_force {
                        delta_lambda = eq.max_force - lambda;
                    }
                    self.lambda[j] += delta_lambda;
                    delta_total += delta_lambda.abs();

                    eq.add_to_wlambda(a, b, delta_lambda);
                }

                if delta_total * delta_total < tolerance_squared {
                    break;
                }
            }
        }

        for body in bodies.iter_mut() {
            if !body.vlambda.is_finite() || !body.wlambda.is_finite() {
                tracing::warn!(body = ?body.id(), "discarding non-finite solver velocity");
                body.vlambda = Vec3::ZERO;
                body.wlambda = Vec3::ZERO;
            }
            body.linear_velocity += body.vlambda * body.linear_factor;
            body.angular_velocity += body.wlambda * body.angular_factor;
            body.inv_inertia_world_solve = Mat3::ZERO;
            body.inv_mass_solve = 0.0;
        }

        for (eq, lambda) in equations.iter_mut().zip(&self.lambda) {
            eq.multiplier = lambda / dt;
        }

        iterations
    }
}
