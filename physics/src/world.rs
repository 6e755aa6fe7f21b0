use crate::{
    body::{Body, BodyArena, BodyHandle, BodyId, SleepState, SleepTransition},
    broadphase::{Broadphase, BroadphaseKind, CollisionPair},
    constraints::{
        Constraint, ConstraintArena, ConstraintHandle, CONSTRAINT_RELAXATION, CONSTRAINT_STIFFNESS,
    },
    equations::{Equation, EquationPool, SpookCache},
    events::{OverlapTracker, WorldEvent},
    material::{ContactMaterial, ContactMaterialTable, MaterialId},
    narrowphase::{Narrowphase, NarrowphaseSettings},
    ray::{raycast_closest, RayOptions, RaycastResult},
    solver::GsSolver,
    time_accumulator::TimeAccumulator,
    vehicle::RaycastVehicle,
};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec3,
    pub solver_iterations: u32,
    pub solver_tolerance: f32,
    /// Lets bodies with `allow_sleep` fall asleep and be woken by contacts.
    pub allow_sleep: bool,
    /// Orientations are renormalized every `quat_normalize_skip + 1` steps.
    pub quat_normalize_skip: u32,
    pub quat_normalize_fast: bool,
    /// One averaged pair of friction equations per body pair instead of one per contact.
    pub friction_reduction: bool,
    pub broadphase: BroadphaseKind,
    pub default_contact_material: ContactMaterial,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            gravity: Vec3::ZERO,
            solver_iterations: 10,
            solver_tolerance: 1e-7,
            allow_sleep: false,
            quat_normalize_skip: 0,
            quat_normalize_fast: false,
            friction_reduction: false,
            broadphase: BroadphaseKind::default(),
            default_contact_material: ContactMaterial::default(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleHandle(pub u32);

/// Counters from the most recent fixed step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    pub pairs: usize,
    pub contacts: usize,
    pub equations: usize,
    pub solver_iterations: u32,
}

type HookFn = dyn FnMut(&mut BodyArena, f32) + Send;

struct PreStepHook(Box<HookFn>);

impl fmt::Debug for PreStepHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PreStepHook")
    }
}

#[derive(Debug)]
pub struct World {
    pub config: WorldConfig,
    bodies: BodyArena,
    constraints: ConstraintArena,
    materials: ContactMaterialTable,
    broadphase_kind: BroadphaseKind,
    broadphase: Box<dyn Broadphase>,
    narrowphase: Narrowphase,
    solver: GsSolver,
    pool: EquationPool,
    spook_cache: SpookCache,
    pairs: Vec<CollisionPair>,
    overlaps: OverlapTracker,
    events: Vec<WorldEvent>,
    vehicles: Vec<(VehicleHandle, RaycastVehicle)>,
    next_vehicle: u32,
    hooks: Vec<PreStepHook>,
    accumulator: TimeAccumulator,
    time: f32,
    step_number: u64,
    stats: StepStats,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let broadphase_kind = config.broadphase;
        let solver = GsSolver::new(config.solver_iterations, config.solver_tolerance);
        World {
            config,
            bodies: BodyArena::new(),
            constraints: ConstraintArena::new(),
            materials: ContactMaterialTable::default(),
            broadphase_kind,
            broadphase: broadphase_kind.build(),
            narrowphase: Narrowphase::default(),
            solver,
            pool: EquationPool::default(),
            spook_cache: SpookCache::default(),
            pairs: Vec::new(),
            overlaps: OverlapTracker::default(),
            events: Vec::new(),
            vehicles: Vec::new(),
            next_vehicle: 0,
            hooks: Vec::new(),
            accumulator: TimeAccumulator::default(),
            time: 0.0,
            step_number: 0,
            stats: StepStats::default(),
        }
    }

    pub fn add_body(&mut self, body: Body) -> BodyHandle {
        let handle = self.bodies.add(body);
        self.broadphase.body_added(handle);
        handle
    }

    /// Removes a body along with its constraints and contact history. Handles of later bodies
    /// shift down by one.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<Body> {
        let body = self.bodies.remove(handle)?;
        self.broadphase.body_removed(handle);
        let dropped = self.constraints.remove_body(body.id());
        if dropped > 0 {
            tracing::debug!(body = ?body.id(), dropped, "removed constraints of body");
        }
        self.overlaps.remove_body(body.id());
        Some(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    pub fn handle_of(&self, id: BodyId) -> Option<BodyHandle> {
        self.bodies.handle_of(id)
    }

    pub fn bodies(&self) -> &BodyArena {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut BodyArena {
        &mut self.bodies
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> ConstraintHandle {
        self.constraints.add(constraint)
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Option<Constraint> {
        self.constraints.remove(handle)
    }

    pub fn constraints(&self) -> &ConstraintArena {
        &self.constraints
    }

    pub fn add_contact_material(&mut self, a: MaterialId, b: MaterialId, contact: ContactMaterial) {
        self.materials.insert(a, b, contact);
    }

    pub fn contact_materials(&self) -> &ContactMaterialTable {
        &self.materials
    }

    pub fn contact_materials_mut(&mut self) -> &mut ContactMaterialTable {
        &mut self.materials
    }

    pub fn raycast_closest(&self, from: Vec3, to: Vec3, options: &RayOptions) -> Option<RaycastResult> {
        raycast_closest(self.bodies.as_slice(), from, to, options)
    }

    pub fn add_vehicle(&mut self, vehicle: RaycastVehicle) -> VehicleHandle {
        let handle = VehicleHandle(self.next_vehicle);
        self.next_vehicle += 1;
        tracing::debug!(
            ?handle,
            chassis = ?vehicle.chassis(),
            wheels = vehicle.num_wheels(),
            "added vehicle"
        );
        self.vehicles.push((handle, vehicle));
        handle
    }

    /// Unregisters the vehicle and removes its chassis body from the world.
    pub fn remove_vehicle(&mut self, handle: VehicleHandle) -> Option<RaycastVehicle> {
        let index = self.vehicles.iter().position(|(h, _)| *h == handle)?;
        let (_, vehicle) = self.vehicles.remove(index);
        if let Some(chassis) = self.handle_of(vehicle.chassis()) {
            self.remove_body(chassis);
        }
        tracing::debug!(?handle, chassis = ?vehicle.chassis(), "removed vehicle");
        Some(vehicle)
    }

    pub fn vehicle(&self, handle: VehicleHandle) -> Option<&RaycastVehicle> {
        self.vehicles
            .iter()
            .find_map(|(h, v)| (*h == handle).then_some(v))
    }

    pub fn vehicle_mut(&mut self, handle: VehicleHandle) -> Option<&mut RaycastVehicle> {
        self.vehicles
            .iter_mut()
            .find_map(|(h, v)| (*h == handle).then_some(v))
    }

    /// Registers a callback run at the start of every fixed step, before the vehicles.
    pub fn add_pre_step_hook(&mut self, hook: impl FnMut(&mut BodyArena, f32) + Send + 'static) {
        self.hooks.push(PreStepHook(Box::new(hook)));
    }

    /// Takes the events queued since the last call.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, WorldEvent> {
        self.events.drain(..)
    }

    pub fn events(&self) -> &[WorldEvent] {
        &self.events
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn step_number(&self) -> u64 {
        self.step_number
    }

    pub fn last_step_stats(&self) -> StepStats {
        self.stats
    }

    /// Equations solved in the last step, contacts first, then friction, then constraints.
    pub fn equations(&self) -> &[Equation] {
        self.pool.as_slice()
    }

    pub fn is_touching(&self, a: BodyId, b: BodyId) -> bool {
        self.overlaps.is_touching(a, b)
    }

    /// Advances one fixed step of `dt` seconds. Interpolated transforms are set to the result.
    pub fn step(&mut self, dt: f32) {
        self.internal_step(dt);
        for body in self.bodies.iter_mut() {
            body.interpolate(1.0);
        }
    }

    /// Adds `elapsed` real seconds and takes as many fixed steps of `dt` as fit, at most
    /// `max_substeps`. Interpolated transforms blend the last two steps by the leftover time.
    /// Returns the number of steps taken.
    pub fn step_with_accumulator(&mut self, dt: f32, elapsed: f32, max_substeps: u32) -> u32 {
        self.accumulator.set_update_rate(dt, max_substeps);
        let steps = self.accumulator.update(elapsed);
        for _ in 0..steps {
            self.internal_step(dt);
        }
        let alpha = self.accumulator.alpha();
        for body in self.bodies.iter_mut() {
            body.interpolate(alpha);
        }
        steps
    }

    fn sync_config(&mut self) {
        if self.broadphase_kind != self.config.broadphase {
            tracing::debug!(kind = ?self.config.broadphase, "switching broadphase");
            self.broadphase_kind = self.config.broadphase;
            self.broadphase = self.broadphase_kind.build();
        }
        self.solver.iterations = self.config.solver_iterations;
        self.solver.tolerance = self.config.solver_tolerance;
    }

    fn internal_step(&mut self, dt: f32) {
        self.sync_config();

        let gravity = self.config.gravity;
        for body in self.bodies.iter_mut().filter(|b| b.is_dynamic()) {
            let weight = gravity * body.mass();
            body.force += weight;
        }

        self.events.push(WorldEvent::PreStep);
        for hook in &mut self.hooks {
            (hook.0)(&mut self.bodies, dt);
        }
        for (_, vehicle) in &mut self.vehicles {
            vehicle.update(&mut self.bodies, dt);
        }

        self.broadphase
            .collision_pairs(self.bodies.as_mut_slice(), &mut self.pairs);
        if !self.constraints.is_empty() {
            let (bodies, constraints) = (&self.bodies, &self.constraints);
            self.pairs.retain(|pair| {
                let (a, b) = (bodies.get_body(pair.a).id(), bodies.get_body(pair.b).id());
                !constraints.excludes_collision(a, b)
            });
        }

        self.pool.reset();
        let settings = NarrowphaseSettings {
            dt,
            friction_reduction: self.config.friction_reduction,
            materials: &self.materials,
            default_material: &self.config.default_contact_material,
        };
        self.narrowphase.get_contacts(
            &self.pairs,
            self.bodies.as_slice(),
            &settings,
            &mut self.spook_cache,
            &mut self.pool,
        );

        self.overlaps.begin_step();
        for touch in &self.narrowphase.touching {
            let (a, b) = (self.bodies.get_body(touch.a), self.bodies.get_body(touch.b));
            if self
                .overlaps
                .insert(a.id(), touch.shape_a, b.id(), touch.shape_b)
            {
                self.events.push(WorldEvent::Collide {
                    body_a: a.id(),
                    body_b: b.id(),
                    impact_velocity: touch.impact_velocity,
                });
            }
        }
        if self.config.allow_sleep {
            self.wake_touched_bodies();
        }

        let spook = self
            .spook_cache
            .get(CONSTRAINT_STIFFNESS, CONSTRAINT_RELAXATION, dt);
        self.constraints
            .push_equations(&self.bodies, spook, &mut self.pool);

        let iterations = self
            .solver
            .solve(dt, self.bodies.as_mut_slice(), self.pool.as_mut_slice());

        for body in self.bodies.iter_mut() {
            body.apply_damping(dt);
        }

        let skip = u64::from(self.config.quat_normalize_skip) + 1;
        let normalize = self.step_number % skip == 0;
        let fast = self.config.quat_normalize_fast;
        for body in self.bodies.iter_mut() {
            body.integrate(dt, normalize, fast);
        }
        for (_, vehicle) in &mut self.vehicles {
            vehicle.update_wheel_transforms(&self.bodies);
        }

        self.time += dt;
        self.step_number += 1;

        if self.config.allow_sleep {
            let time = self.time;
            for body in self.bodies.iter_mut() {
                match body.sleep_tick(time) {
                    Some(SleepTransition::Sleepy) => {
                        tracing::debug!(body = ?body.id(), "sleepy");
                        self.events.push(WorldEvent::Sleepy { body: body.id() });
                    }
                    Some(SleepTransition::Sleep) => {
                        tracing::debug!(body = ?body.id(), "sleep");
                        self.events.push(WorldEvent::Sleep { body: body.id() });
                    }
                    None => {}
                }
            }
        }

        self.overlaps.emit_events(&mut self.events);
        self.events.push(WorldEvent::PostStep);

        self.stats = StepStats {
            pairs: self.pairs.len(),
            contacts: self.narrowphase.contact_count,
            equations: self.pool.len(),
            solver_iterations: iterations,
        };
        tracing::trace!(
            step = self.step_number,
            pairs = self.stats.pairs,
            contacts = self.stats.contacts,
            equations = self.stats.equations,
            iterations,
            "stepped"
        );
    }

    /// Flags sleeping bodies touched by a moving awake body and wakes them before the solve.
    fn wake_touched_bodies(&mut self) {
        let bodies = self.bodies.as_mut_slice();
        for touch in &self.narrowphase.touching {
            let (a, b) = (touch.a.0 as usize, touch.b.0 as usize);
            if should_wake(&bodies[a], &bodies[b]) {
                bodies[a].wake_up_after_narrowphase = true;
            }
            if should_wake(&bodies[b], &bodies[a]) {
                bodies[b].wake_up_after_narrowphase = true;
            }
        }
        for body in bodies.iter_mut() {
            if body.wake_up_after_narrowphase {
                body.wake_up_after_narrowphase = false;
                if body.wake_up() {
                    tracing::debug!(body = ?body.id(), "woken by contact");
                    self.events.push(WorldEvent::WakeUp { body: body.id() });
                }
            }
        }
    }
}

/// A sleeping body wakes when an awake, non-static body hits it fast enough.
fn should_wake(sleeper: &Body, other: &Body) -> bool {
    sleeper.allow_sleep
        && sleeper.is_dynamic()
        && sleeper.sleep_state() == SleepState::Sleeping
        && other.sleep_state() == SleepState::Awake
        && !other.is_static()
        && other.speed_squared() >= 2.0 * other.sleep_speed_limit * other.sleep_speed_limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Shape;

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: WorldConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, WorldConfig::default());
        assert_eq!(config.solver_iterations, 10);

        let config: WorldConfig =
            serde_json::from_str(r#"{ "gravity": [0.0, -9.81, 0.0], "broadphase": "Naive" }"#)
                .unwrap();
        assert_eq!(config.gravity, Vec3::new(0.0, -9.81, 0.0));
        assert_eq!(config.broadphase, BroadphaseKind::Naive);
    }

    #[test]
    fn test_step_events_and_time() {
        let mut world = World::default();
        world.add_body(Body::new(1.0).with_shape(Shape::make_sphere(1.0)));
        world.step(0.5);
        world.step(0.5);
        assert_eq!(world.time(), 1.0);
        assert_eq!(world.step_number(), 2);
        let events: Vec<_> = world.drain_events().collect();
        assert_eq!(
            events,
            vec![
                WorldEvent::PreStep,
                WorldEvent::PostStep,
                WorldEvent::PreStep,
                WorldEvent::PostStep
            ]
        );
        assert!(world.events().is_empty());
    }

    #[test]
    fn test_accumulator_interpolates() {
        let mut world = World::default();
        let handle = world.add_body(
            Body::new(1.0)
                .with_shape(Shape::make_sphere(1.0))
                .with_velocity(Vec3::new(1.0, 0.0, 0.0)),
        );
        // one and a half steps of a quarter second
        let steps = world.step_with_accumulator(0.25, 0.375, 10);
        assert_eq!(steps, 1);
        let body = world.body(handle).unwrap();
        // damping shaves a little off the unit speed
        assert!((body.position.x - 0.25).abs() < 1e-3);
        assert!((body.interpolated_position.x - 0.125).abs() < 1e-3);
    }

    #[test]
    fn test_hook_runs_each_step() {
        let mut world = World::default();
        let handle = world.add_body(Body::new(1.0).with_shape(Shape::make_sphere(1.0)));
        world.add_pre_step_hook(move |bodies, dt| {
            bodies.get_body_mut(handle).apply_force(Vec3::new(0.0, 0.0, 1.0 / dt), Vec3::ZERO);
        });
        world.step(0.1);
        world.step(0.1);
        let velocity = world.body(handle).unwrap().linear_velocity;
        assert!((velocity.z - 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_constraint_blocks_collision() {
        let mut world = World::new(WorldConfig {
            broadphase: BroadphaseKind::Naive,
            ..Default::default()
        });
        let a = world.add_body(Body::new(1.0).with_shape(Shape::make_sphere(1.0)));
        let b = world.add_body(
            Body::new(1.0)
                .with_shape(Shape::make_sphere(1.0))
                .with_position(Vec3::new(1.5, 0.0, 0.0)),
        );
        let (ida, idb) = (world.body(a).unwrap().id(), world.body(b).unwrap().id());
        let constraint = world.add_constraint(
            Constraint::distance(ida, idb, 1.5).with_collide_connected(false),
        );
        world.step(1.0 / 60.0);
        assert!(!world.is_touching(ida, idb));
        assert_eq!(world.last_step_stats().contacts, 0);

        world.remove_constraint(constraint);
        world.step(1.0 / 60.0);
        assert!(world.is_touching(ida, idb));
        assert!(world.drain_events().any(|e| matches!(e, WorldEvent::Collide { .. })));
    }

    #[test]
    fn test_remove_body_drops_its_constraints() {
        let mut world = World::default();
        let a = world.add_body(Body::new(1.0).with_shape(Shape::make_sphere(1.0)));
        let b = world.add_body(Body::new(1.0).with_shape(Shape::make_sphere(1.0)));
        let (ida, idb) = (world.body(a).unwrap().id(), world.body(b).unwrap().id());
        world.add_constraint(Constraint::point_to_point(ida, Vec3::ZERO, idb, Vec3::ZERO));
        assert!(world.remove_body(a).is_some());
        assert!(world.constraints().is_empty());
        assert_eq!(world.handle_of(idb), Some(BodyHandle(0)));
        assert!(world.remove_body(BodyHandle(5)).is_none());
    }
}
