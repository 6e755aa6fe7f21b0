use super::{ConstraintConfig, ConstraintTrait};
use crate::{
    body::{Body, BodyHandle},
    equations::{Equation, EquationPool, SpookParams},
};

/// Holds the pivots of two bodies a fixed distance apart.
#[derive(Copy, Clone, Debug)]
pub struct ConstraintDistance {
    pub distance: f32,
}

impl ConstraintTrait for ConstraintDistance {
    fn push_equations(
        &self,
        config: &ConstraintConfig,
        a: (BodyHandle, &Body),
        b: (BodyHandle, &Body),
        spook: SpookParams,
        pool: &mut EquationPool,
    ) {
        let (ra, rb, world_a, world_b) = config.world_pivots(a.1, b.1);

        // coincident pivots give no direction to push along
        let Some(normal) = (world_a - world_b).try_normalize() else {
            return;
        };

        let mut equation = Equation::bilateral(a, b, normal, ra, rb, config.max_force, spook);
        equation.g -= self.distance;
        pool.push(equation);
    }
}
