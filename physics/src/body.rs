use crate::{
    bounds::Bounds,
    material::Material,
    math::{Mat3Ext, QuatExt},
    shapes::Shape,
};
use glam::{Mat3, Quat, Vec3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Index of a body in its [`BodyArena`]. Handles after a removed body shift down by one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

impl Default for BodyHandle {
    // default to invalid value
    fn default() -> Self {
        Self(u32::MAX)
    }
}

/// Identity of a body that survives removal of other bodies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

impl Default for BodyId {
    fn default() -> Self {
        Self(u32::MAX)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    #[default]
    Dynamic,
    Static,
    /// Moves by its velocity only. Never affected by forces or contacts.
    Kinematic,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SleepState {
    #[default]
    Awake,
    Sleepy,
    Sleeping,
}

/// Sleep state change produced by [`Body::sleep_tick`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SleepTransition {
    Sleepy,
    Sleep,
}

/// A shape attached to a body, placed relative to the body's centre of mass.
#[derive(Clone, Debug)]
pub struct BodyShape {
    pub shape: Shape,
    pub offset: Vec3,
    pub orientation: Quat,
}

impl BodyShape {
    pub fn world_transform(&self, body_position: Vec3, body_orientation: Quat) -> (Vec3, Quat) {
        (
            body_position + body_orientation * self.offset,
            body_orientation * self.orientation,
        )
    }
}

#[derive(Clone, Debug)]
pub struct Body {
    id: BodyId,
    body_type: BodyType,
    mass: f32,
    inv_mass: f32,
    inertia: Mat3,
    inv_inertia: Mat3,
    inv_inertia_world: Mat3,
    fixed_rotation: bool,
    shapes: Vec<BodyShape>,
    bounding_radius: f32,
    aabb: Bounds,
    aabb_needs_update: bool,
    sleep_state: SleepState,
    time_last_sleepy: f32,

    /// Centre of mass in world space. After writing it directly, call
    /// [`Body::mark_transform_dirty`] so the bounding box is refreshed.
    pub position: Vec3,
    pub orientation: Quat,
    pub previous_position: Vec3,
    pub previous_orientation: Quat,
    pub interpolated_position: Vec3,
    pub interpolated_orientation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force: Vec3,
    pub torque: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    /// When false the body produces contact events but no contact forces.
    pub collision_response: bool,
    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
    pub allow_sleep: bool,
    pub sleep_speed_limit: f32,
    pub sleep_time_limit: f32,
    pub material: Option<Material>,

    pub(crate) wake_up_after_narrowphase: bool,
    pub(crate) vlambda: Vec3,
    pub(crate) wlambda: Vec3,
    pub(crate) inv_mass_solve: f32,
    pub(crate) inv_inertia_world_solve: Mat3,
}

impl Default for Body {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Body {
    pub const DEFAULT_DAMPING: f32 = 0.01;

    /// A body with the given mass, static when the mass is zero.
    pub fn new(mass: f32) -> Self {
        let body_type = if mass > 0.0 {
            BodyType::Dynamic
        } else {
            BodyType::Static
        };
        let mut body = Body {
            id: BodyId::default(),
            body_type,
            mass: mass.max(0.0),
            inv_mass: 0.0,
            inertia: Mat3::ZERO,
            inv_inertia: Mat3::ZERO,
            inv_inertia_world: Mat3::ZERO,
            fixed_rotation: false,
            shapes: Vec::new(),
            bounding_radius: 0.0,
            aabb: Bounds::new(),
            aabb_needs_update: true,
            sleep_state: SleepState::Awake,
            time_last_sleepy: 0.0,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            previous_position: Vec3::ZERO,
            previous_orientation: Quat::IDENTITY,
            interpolated_position: Vec3::ZERO,
            interpolated_orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            linear_damping: Self::DEFAULT_DAMPING,
            angular_damping: Self::DEFAULT_DAMPING,
            linear_factor: Vec3::ONE,
            angular_factor: Vec3::ONE,
            collision_response: true,
            collision_filter_group: 1,
            collision_filter_mask: u32::MAX,
            allow_sleep: true,
            sleep_speed_limit: 0.1,
            sleep_time_limit: 1.0,
            material: None,
            wake_up_after_narrowphase: false,
            vlambda: Vec3::ZERO,
            wlambda: Vec3::ZERO,
            inv_mass_solve: 0.0,
            inv_inertia_world_solve: Mat3::ZERO,
        };
        body.update_mass_properties();
        body
    }

    pub fn kinematic() -> Self {
        let mut body = Self::new(0.0);
        body.set_body_type(BodyType::Kinematic);
        body
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.add_shape(shape, Vec3::ZERO, Quat::IDENTITY);
        self
    }

    pub fn with_shape_offset(mut self, shape: Shape, offset: Vec3, orientation: Quat) -> Self {
        self.add_shape(shape, offset, orientation);
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.set_position(position);
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.set_orientation(orientation);
        self
    }

    pub fn with_velocity(mut self, linear_velocity: Vec3) -> Self {
        self.linear_velocity = linear_velocity;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn set_body_type(&mut self, body_type: BodyType) {
        self.body_type = body_type;
        self.update_mass_properties();
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass.max(0.0);
        if self.body_type != BodyType::Kinematic {
            self.body_type = if self.mass > 0.0 {
                BodyType::Dynamic
            } else {
                BodyType::Static
            };
        }
        self.update_mass_properties();
    }

    pub fn fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn set_fixed_rotation(&mut self, fixed_rotation: bool) {
        self.fixed_rotation = fixed_rotation;
        self.update_mass_properties();
    }

    /// Inertia tensor about the centre of mass in body space.
    pub fn inertia(&self) -> Mat3 {
        self.inertia
    }

    pub fn inv_inertia(&self) -> Mat3 {
        self.inv_inertia
    }

    pub fn inv_inertia_world(&self) -> Mat3 {
        self.inv_inertia_world
    }

    pub fn shapes(&self) -> &[BodyShape] {
        &self.shapes
    }

    pub fn add_shape(&mut self, shape: Shape, offset: Vec3, orientation: Quat) {
        self.shapes.push(BodyShape {
            shape,
            offset,
            orientation,
        });
        self.update_mass_properties();
    }

    pub fn remove_shape(&mut self, index: usize) -> Option<BodyShape> {
        if index >= self.shapes.len() {
            return None;
        }
        let removed = self.shapes.remove(index);
        self.update_mass_properties();
        Some(removed)
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    /// Recomputes inverse mass, the combined inertia tensor and the bounding radius. The mass
    /// is split between shapes by volume.
    pub fn update_mass_properties(&mut self) {
        self.bounding_radius = self
            .shapes
            .iter()
            .map(|s| s.offset.length() + s.shape.bounding_radius())
            .fold(0.0, f32::max);

        let total_volume: f32 = self.shapes.iter().map(|s| s.shape.volume()).sum();
        let mut inertia = Mat3::ZERO;
        for s in &self.shapes {
            let share = if total_volume > 0.0 {
                self.mass * s.shape.volume() / total_volume
            } else {
                self.mass / self.shapes.len() as f32
            };
            inertia += s.shape.inertia_tensor(share).rotate_tensor(s.orientation)
                + Mat3::parallel_axis(share, s.offset);
        }
        self.inertia = inertia;

        let dynamic = self.body_type == BodyType::Dynamic;
        self.inv_mass = if dynamic && self.mass > 0.0 {
            self.mass.recip()
        } else {
            0.0
        };
        self.inv_inertia = if dynamic && !self.fixed_rotation && inertia.determinant() != 0.0 {
            inertia.inverse()
        } else {
            Mat3::ZERO
        };
        self.update_inertia_world();
        self.aabb_needs_update = true;
    }

    pub fn update_inertia_world(&mut self) {
        self.inv_inertia_world = self.inv_inertia.rotate_tensor(self.orientation);
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.previous_position = position;
        self.interpolated_position = position;
        self.aabb_needs_update = true;
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
        self.previous_orientation = orientation;
        self.interpolated_orientation = orientation;
        self.update_inertia_world();
        self.aabb_needs_update = true;
    }

    /// Flags the cached bounding box and world inertia after the pose fields were written
    /// directly.
    pub fn mark_transform_dirty(&mut self) {
        self.update_inertia_world();
        self.aabb_needs_update = true;
    }

    pub fn aabb_needs_update(&self) -> bool {
        self.aabb_needs_update
    }

    pub fn aabb(&self) -> &Bounds {
        &self.aabb
    }

    /// World bounds of all shapes at the current pose, ignoring the cached value.
    pub fn compute_aabb(&self) -> Bounds {
        let mut aabb = Bounds::new();
        for s in &self.shapes {
            let (pos, orient) = s.world_transform(self.position, self.orientation);
            aabb.expand_by_bounds(&s.shape.bounds(pos, orient));
        }
        aabb
    }

    pub fn update_aabb(&mut self) {
        self.aabb = self.compute_aabb();
        self.aabb_needs_update = false;
    }

    pub fn point_to_local_frame(&self, world_point: Vec3) -> Vec3 {
        self.orientation.conjugate() * (world_point - self.position)
    }

    pub fn point_to_world_frame(&self, local_point: Vec3) -> Vec3 {
        self.position + self.orientation * local_point
    }

    pub fn vector_to_local_frame(&self, world_vector: Vec3) -> Vec3 {
        self.orientation.conjugate() * world_vector
    }

    pub fn vector_to_world_frame(&self, local_vector: Vec3) -> Vec3 {
        self.orientation * local_vector
    }

    pub fn velocity_at_world_point(&self, world_point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(world_point - self.position)
    }

    /// Adds a force applied at `relative_point`, a world oriented offset from the centre of
    /// mass, to this step's accumulators.
    pub fn apply_force(&mut self, force: Vec3, relative_point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        if self.sleep_state == SleepState::Sleeping {
            self.wake_up();
        }
        self.force += force;
        self.torque += relative_point.cross(force);
    }

    pub fn apply_local_force(&mut self, local_force: Vec3, local_point: Vec3) {
        let force = self.vector_to_world_frame(local_force);
        let point = self.vector_to_world_frame(local_point);
        self.apply_force(force, point);
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        if self.sleep_state == SleepState::Sleeping {
            self.wake_up();
        }
        self.torque += torque;
    }

    /// Changes the velocities immediately. `relative_point` is a world oriented offset from the
    /// centre of mass.
    pub fn apply_impulse(&mut self, impulse: Vec3, relative_point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        if self.sleep_state == SleepState::Sleeping {
            self.wake_up();
        }
        self.linear_velocity += impulse * self.inv_mass * self.linear_factor;
        self.angular_velocity +=
            self.inv_inertia_world * relative_point.cross(impulse) * self.angular_factor;
    }

    pub fn apply_local_impulse(&mut self, local_impulse: Vec3, local_point: Vec3) {
        let impulse = self.vector_to_world_frame(local_impulse);
        let point = self.vector_to_world_frame(local_point);
        self.apply_impulse(impulse, point);
    }

    pub fn sleep_state(&self) -> SleepState {
        self.sleep_state
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep_state == SleepState::Sleeping
    }

    /// Returns true if the body was sleeping.
    pub fn wake_up(&mut self) -> bool {
        let was_sleeping = self.sleep_state == SleepState::Sleeping;
        self.sleep_state = SleepState::Awake;
        self.wake_up_after_narrowphase = false;
        was_sleeping
    }

    pub fn sleep(&mut self) {
        self.sleep_state = SleepState::Sleeping;
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.wake_up_after_narrowphase = false;
    }

    pub(crate) fn speed_squared(&self) -> f32 {
        self.linear_velocity.length_squared() + self.angular_velocity.length_squared()
    }

    /// Advances the sleep state machine at simulation time `time`.
    pub fn sleep_tick(&mut self, time: f32) -> Option<SleepTransition> {
        if !self.allow_sleep {
            return None;
        }
        let speed_squared = self.speed_squared();
        let limit_squared = self.sleep_speed_limit * self.sleep_speed_limit;
        match self.sleep_state {
            SleepState::Awake if speed_squared < limit_squared => {
                self.sleep_state = SleepState::Sleepy;
                self.time_last_sleepy = time;
                Some(SleepTransition::Sleepy)
            }
            SleepState::Sleepy if speed_squared > limit_squared => {
                self.wake_up();
                None
            }
            SleepState::Sleepy if time - self.time_last_sleepy > self.sleep_time_limit => {
                self.sleep();
                Some(SleepTransition::Sleep)
            }
            _ => None,
        }
    }

    /// Refreshes the mass values seen by the solver. Sleeping and kinematic bodies are frozen.
    pub(crate) fn update_solve_mass_properties(&mut self) {
        if self.sleep_state == SleepState::Sleeping || self.body_type == BodyType::Kinematic {
            self.inv_mass_solve = 0.0;
            self.inv_inertia_world_solve = Mat3::ZERO;
        } else {
            self.inv_mass_solve = self.inv_mass;
            self.inv_inertia_world_solve = self.inv_inertia_world;
        }
    }

    pub(crate) fn apply_damping(&mut self, dt: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity *= (1.0 - self.linear_damping).powf(dt);
        self.angular_velocity *= (1.0 - self.angular_damping).powf(dt);
    }

    /// Semi-implicit Euler step. Stores the pose before the step and clears the accumulators.
    pub(crate) fn integrate(&mut self, dt: f32, normalize: bool, normalize_fast: bool) {
        self.previous_position = self.position;
        self.previous_orientation = self.orientation;

        let moves = self.body_type != BodyType::Static;
        if moves && self.sleep_state != SleepState::Sleeping {
            if self.is_dynamic() {
                self.linear_velocity += self.force * self.inv_mass * dt * self.linear_factor;
                self.angular_velocity +=
                    self.inv_inertia_world * self.torque * dt * self.angular_factor;
            }

            self.position += self.linear_velocity * dt;
            self.orientation =
                self.orientation
                    .integrate(self.angular_velocity, self.angular_factor, dt);
            if normalize {
                self.orientation = if normalize_fast {
                    self.orientation.normalize_fast()
                } else {
                    self.orientation.normalize()
                };
            }
            self.aabb_needs_update = true;
            self.update_inertia_world();
        }

        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    /// Blends the previous and current pose, `t` in `[0, 1]`.
    pub(crate) fn interpolate(&mut self, t: f32) {
        self.interpolated_position = self.previous_position.lerp(self.position, t);
        self.interpolated_orientation = self.previous_orientation.slerp(self.orientation, t);
    }
}

/// Dense storage of bodies. Removing a body renumbers the handles of the bodies after it while
/// their [`BodyId`] stays the same.
#[derive(Debug, Default)]
pub struct BodyArena {
    bodies: Vec<Body>,
    index_of: FxHashMap<BodyId, u32>,
    next_id: u32,
}

impl BodyArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mut body: Body) -> BodyHandle {
        body.id = BodyId(self.next_id);
        self.next_id += 1;
        let handle = BodyHandle(self.bodies.len() as u32);
        self.index_of.insert(body.id, handle.0);
        self.bodies.push(body);
        handle
    }

    pub fn remove(&mut self, handle: BodyHandle) -> Option<Body> {
        let index = handle.0 as usize;
        if index >= self.bodies.len() {
            return None;
        }
        let body = self.bodies.remove(index);
        self.index_of.remove(&body.id);
        for (i, later) in self.bodies.iter().enumerate().skip(index) {
            self.index_of.insert(later.id, i as u32);
        }
        Some(body)
    }

    pub fn handle_of(&self, id: BodyId) -> Option<BodyHandle> {
        self.index_of.get(&id).map(|&index| BodyHandle(index))
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Body> {
        self.bodies.iter()
    }

    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Body> {
        self.bodies.iter_mut()
    }

    pub fn handles(&self) -> impl Iterator<Item = BodyHandle> {
        (0..self.bodies.len() as u32).map(BodyHandle)
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.index_of.clear();
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn get(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.0 as usize)
    }

    pub fn get_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle.0 as usize)
    }

    /// Panics if the handle is out of range.
    pub fn get_body(&self, handle: BodyHandle) -> &Body {
        &self.bodies[handle.0 as usize]
    }

    /// Panics if the handle is out of range.
    pub fn get_body_mut(&mut self, handle: BodyHandle) -> &mut Body {
        &mut self.bodies[handle.0 as usize]
    }

    /// Panics if both handles are the same or either is out of range.
    pub fn get_body_pair_mut(&mut self, a: BodyHandle, b: BodyHandle) -> (&mut Body, &mut Body) {
        let (index_a, index_b) = (a.0 as usize, b.0 as usize);
        match index_a.cmp(&index_b) {
            std::cmp::Ordering::Less => {
                let (lo, hi) = self.bodies.split_at_mut(index_b);
                (&mut lo[index_a], &mut hi[0])
            }
            std::cmp::Ordering::Greater => {
                let (lo, hi) = self.bodies.split_at_mut(index_a);
                (&mut hi[0], &mut lo[index_b])
            }
            std::cmp::Ordering::Equal => {
                panic!("get_body_pair_mut called with the same index {}", index_a)
            }
        }
    }

    pub fn as_slice(&self) -> &[Body] {
        &self.bodies
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Body] {
        &mut self.bodies
    }
}
