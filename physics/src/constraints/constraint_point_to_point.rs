use super::{ConstraintConfig, ConstraintTrait};
use crate::{
    body::{Body, BodyHandle},
    equations::{Equation, EquationPool, SpookParams},
};
use glam::Vec3;

/// Ball joint. One equation per world axis pulls the pivots together.
#[derive(Copy, Clone, Debug)]
pub struct ConstraintPointToPoint;

impl ConstraintTrait for ConstraintPointToPoint {
    fn push_equations(
        &self,
        config: &ConstraintConfig,
        a: (BodyHandle, &Body),
        b: (BodyHandle, &Body),
        spook: SpookParams,
        pool: &mut EquationPool,
    ) {
        let (ra, rb, _, _) = config.world_pivots(a.1, b.1);
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            pool.push(Equation::bilateral(a, b, axis, ra, rb, config.max_force, spook));
        }
    }
}
