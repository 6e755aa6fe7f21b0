//! Raycast vehicle. Each wheel is a ray cast down from the chassis with a spring and damper
//! pushing the chassis up and friction impulses applied at the contact point. Wheels are not
//! bodies, their spin is kept only for rendering.

use crate::{
    body::{Body, BodyArena, BodyHandle, BodyId},
    ray::{raycast_closest, RayOptions},
};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

const FORWARD_FACTOR: f32 = 0.5;
const SIDE_FACTOR: f32 = 1.0;
const CONTACT_DAMPING: f32 = 0.2;
const ROTATION_DECAY: f32 = 0.99;
/// Contacts flatter than this against the suspension direction use a fixed clipping factor.
const MIN_CONTACT_DOT: f32 = -0.1;

/// Which chassis space axes point right, up and forward.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleAxes {
    pub right: usize,
    pub up: usize,
    pub forward: usize,
}

impl Default for VehicleAxes {
    fn default() -> Self {
        VehicleAxes {
            right: 0,
            up: 1,
            forward: 2,
        }
    }
}

fn unit_axis(index: usize) -> Vec3 {
    Vec3::AXES.get(index).copied().unwrap_or(Vec3::X)
}

impl VehicleAxes {
    pub fn right_unit(&self) -> Vec3 {
        unit_axis(self.right)
    }

    pub fn up_unit(&self) -> Vec3 {
        unit_axis(self.up)
    }

    pub fn forward_unit(&self) -> Vec3 {
        unit_axis(self.forward)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelOptions {
    /// Where the suspension attaches, in chassis space.
    pub chassis_connection_point: Vec3,
    /// Suspension direction in chassis space, usually down.
    pub direction: Vec3,
    /// Axle direction in chassis space. Forward is `-direction x axle`.
    pub axle: Vec3,
    pub suspension_rest_length: f32,
    pub max_suspension_travel: f32,
    pub radius: f32,
    /// Spring rate per unit of chassis mass.
    pub suspension_stiffness: f32,
    pub damping_compression: f32,
    pub damping_relaxation: f32,
    pub friction_slip: f32,
    pub forward_acceleration: f32,
    pub side_acceleration: f32,
    /// Scales the height of the side impulse point, small values reduce body roll.
    pub roll_influence: f32,
    pub max_suspension_force: f32,
    pub is_front_wheel: bool,
    pub use_custom_sliding_rotational_speed: bool,
    pub custom_sliding_rotational_speed: f32,
}

impl Default for WheelOptions {
    fn default() -> Self {
        WheelOptions {
            chassis_connection_point: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            axle: Vec3::NEG_X,
            suspension_rest_length: 1.0,
            max_suspension_travel: 1.0,
            radius: 1.0,
            suspension_stiffness: 100.0,
            damping_compression: 10.0,
            damping_relaxation: 10.0,
            friction_slip: 10.5,
            forward_acceleration: 1.0,
            side_acceleration: 1.0,
            roll_influence: 0.01,
            max_suspension_force: f32::MAX,
            is_front_wheel: true,
            use_custom_sliding_rotational_speed: false,
            custom_sliding_rotational_speed: -0.1,
        }
    }
}

/// World space results of the last wheel ray.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WheelRaycast {
    pub hard_point: Vec3,
    pub direction: Vec3,
    pub axle: Vec3,
    pub forward: Vec3,
    pub contact_point: Vec3,
    pub contact_normal: Vec3,
    pub hit_distance: f32,
    /// Valid for the step that produced it.
    pub ground: Option<BodyHandle>,
}

#[derive(Clone, Debug)]
pub struct WheelInfo {
    pub options: WheelOptions,

    pub steering: f32,
    pub engine_force: f32,
    pub brake: f32,

    pub rotation: f32,
    pub delta_rotation: f32,
    pub suspension_length: f32,
    pub suspension_force: f32,
    pub suspension_relative_velocity: f32,
    pub clipped_inv_contact_dot_suspension: f32,
    pub in_contact: bool,
    pub sliding: bool,
    pub skid_info: f32,
    pub side_impulse: f32,
    pub forward_impulse: f32,
    pub raycast: WheelRaycast,

    pub world_position: Vec3,
    pub world_orientation: Quat,
}

impl WheelInfo {
    fn new(mut options: WheelOptions) -> Self {
        options.direction = options.direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        options.axle = options.axle.try_normalize().unwrap_or(Vec3::NEG_X);
        let rest = options.suspension_rest_length;
        WheelInfo {
            options,
            steering: 0.0,
            engine_force: 0.0,
            brake: 0.0,
            rotation: 0.0,
            delta_rotation: 0.0,
            suspension_length: rest,
            suspension_force: 0.0,
            suspension_relative_velocity: 0.0,
            clipped_inv_contact_dot_suspension: 1.0,
            in_contact: false,
            sliding: false,
            skid_info: 1.0,
            side_impulse: 0.0,
            forward_impulse: 0.0,
            raycast: WheelRaycast::default(),
            world_position: Vec3::ZERO,
            world_orientation: Quat::IDENTITY,
        }
    }

    fn update_transform(&mut self, chassis: &Body) {
        let options = &self.options;
        self.raycast.hard_point = chassis.point_to_world_frame(options.chassis_connection_point);
        self.raycast.direction = chassis.vector_to_world_frame(options.direction);

        let steer = Quat::from_axis_angle(-options.direction, self.steering);
        let spin = Quat::from_axis_angle(options.axle, self.rotation);
        self.world_orientation = (chassis.orientation * steer * spin).normalize();
        self.world_position = self.raycast.hard_point + self.raycast.direction * self.suspension_length;
        self.raycast.axle = self.world_orientation * options.axle;
    }

    fn cast_ray(&mut self, chassis: &Body, bodies: &[Body], ray_options: &RayOptions) {
        let options = &self.options;
        let ray_length = options.suspension_rest_length + options.radius;
        let source = self.raycast.hard_point;
        let target = source + self.raycast.direction * ray_length;

        let Some(hit) = raycast_closest(bodies, source, target, ray_options) else {
            self.in_contact = false;
            self.raycast.ground = None;
            self.raycast.contact_point = target;
            self.raycast.contact_normal = -self.raycast.direction;
            self.raycast.hit_distance = 0.0;
            self.suspension_length = options.suspension_rest_length;
            self.suspension_relative_velocity = 0.0;
            self.clipped_inv_contact_dot_suspension = 1.0;
            return;
        };

        self.in_contact = true;
        self.raycast.ground = Some(hit.body);
        self.raycast.contact_point = hit.hit_point;
        self.raycast.contact_normal = hit.hit_normal;
        self.raycast.hit_distance = hit.distance;

        let min_length = options.suspension_rest_length - options.max_suspension_travel;
        let max_length = options.suspension_rest_length + options.max_suspension_travel;
        self.suspension_length = (hit.distance - options.radius).clamp(min_length, max_length);

        let denominator = hit.hit_normal.dot(self.raycast.direction);
        let projected_velocity = hit
            .hit_normal
            .dot(chassis.velocity_at_world_point(hit.hit_point));
        if denominator >= MIN_CONTACT_DOT {
            self.suspension_relative_velocity = 0.0;
            self.clipped_inv_contact_dot_suspension = 1.0 / -MIN_CONTACT_DOT;
        } else {
            let inv = -1.0 / denominator;
            self.suspension_relative_velocity = projected_velocity * inv;
            self.clipped_inv_contact_dot_suspension = inv;
        }
    }

    fn update_suspension(&mut self, chassis_mass: f32) {
        if !self.in_contact {
            self.suspension_force = 0.0;
            return;
        }
        let options = &self.options;
        let length_diff = options.suspension_rest_length - self.suspension_length;
        let mut force =
            options.suspension_stiffness * length_diff * self.clipped_inv_contact_dot_suspension;

        let relative_velocity = self.suspension_relative_velocity;
        let damping = if relative_velocity < 0.0 {
            options.damping_compression
        } else {
            options.damping_relaxation
        };
        force -= damping * relative_velocity;
        self.suspension_force = (force * chassis_mass).max(0.0);
    }
}

/// Scales a wheel's forward and side impulses by one common factor so that they fit inside the
/// friction circle of radius `max_impulse`. Returns the scaled impulses, the factor and whether
/// the wheel is sliding.
pub fn clamp_to_friction_circle(
    forward_impulse: f32,
    side_impulse: f32,
    max_impulse: f32,
    forward_acceleration: f32,
    side_acceleration: f32,
) -> (f32, f32, f32, bool) {
    let x = forward_impulse * FORWARD_FACTOR / forward_acceleration;
    let y = side_impulse * SIDE_FACTOR / side_acceleration;
    let impulse_squared = x * x + y * y;
    if impulse_squared > max_impulse * max_impulse {
        let factor = max_impulse.max(0.0) / impulse_squared.sqrt();
        (forward_impulse * factor, side_impulse * factor, factor, true)
    } else {
        (forward_impulse, side_impulse, 1.0, false)
    }
}

fn impulse_denominator(body: &Body, pos: Vec3, normal: Vec3) -> f32 {
    let r = pos - body.position;
    let c = r.cross(normal);
    let v = body.inv_inertia_world() * c;
    body.inv_mass() + normal.dot(v.cross(r))
}

/// Impulse along `normal` that removes the relative velocity of the two points.
fn resolve_single_bilateral(a: &Body, pos_a: Vec3, b: &Body, pos_b: Vec3, normal: Vec3) -> f32 {
    if normal.length_squared() > 1.1 {
        return 0.0;
    }
    let inv_mass_sum = a.inv_mass() + b.inv_mass();
    if inv_mass_sum <= 0.0 {
        return 0.0;
    }
    let relative = a.velocity_at_world_point(pos_a) - b.velocity_at_world_point(pos_b);
    -CONTACT_DAMPING * normal.dot(relative) / inv_mass_sum
}

fn rolling_friction(a: &Body, b: &Body, pos: Vec3, direction: Vec3, max_impulse: f32) -> f32 {
    let relative = a.velocity_at_world_point(pos) - b.velocity_at_world_point(pos);
    let denominator = impulse_denominator(a, pos, direction) + impulse_denominator(b, pos, direction);
    if denominator <= 0.0 {
        return 0.0;
    }
    (-direction.dot(relative) / denominator).clamp(-max_impulse, max_impulse)
}

#[derive(Clone, Debug)]
pub struct RaycastVehicle {
    chassis: BodyId,
    pub axes: VehicleAxes,
    wheels: Vec<WheelInfo>,
    sliding: bool,
    current_speed_km_hour: f32,
}

impl RaycastVehicle {
    pub fn new(chassis: BodyId, axes: VehicleAxes) -> Self {
        RaycastVehicle {
            chassis,
            axes,
            wheels: Vec::new(),
            sliding: false,
            current_speed_km_hour: 0.0,
        }
    }

    pub fn add_wheel(&mut self, options: WheelOptions) -> usize {
        self.wheels.push(WheelInfo::new(options));
        self.wheels.len() - 1
    }

    pub fn chassis(&self) -> BodyId {
        self.chassis
    }

    pub fn wheels(&self) -> &[WheelInfo] {
        &self.wheels
    }

    pub fn wheel(&self, index: usize) -> Option<&WheelInfo> {
        self.wheels.get(index)
    }

    pub fn num_wheels(&self) -> usize {
        self.wheels.len()
    }

    /// Returns false if there is no such wheel.
    pub fn set_steering_value(&mut self, value: f32, wheel: usize) -> bool {
        self.wheels
            .get_mut(wheel)
            .map(|w| w.steering = value)
            .is_some()
    }

    pub fn apply_engine_force(&mut self, value: f32, wheel: usize) -> bool {
        self.wheels
            .get_mut(wheel)
            .map(|w| w.engine_force = value)
            .is_some()
    }

    pub fn set_brake(&mut self, brake: f32, wheel: usize) -> bool {
        self.wheels.get_mut(wheel).map(|w| w.brake = brake).is_some()
    }

    /// Signed speed, negative when moving backwards.
    pub fn current_speed_km_hour(&self) -> f32 {
        self.current_speed_km_hour
    }

    pub fn is_sliding(&self) -> bool {
        self.sliding
    }

    /// Position and orientation of a wheel for rendering.
    pub fn wheel_transform(&self, index: usize) -> Option<(Vec3, Quat)> {
        self.wheels
            .get(index)
            .map(|w| (w.world_position, w.world_orientation))
    }

    /// Recomputes wheel transforms from the chassis pose without casting rays.
    pub fn update_wheel_transforms(&mut self, bodies: &BodyArena) {
        if let Some(chassis) = bodies.handle_of(self.chassis).map(|h| bodies.get_body(h)) {
            for wheel in &mut self.wheels {
                wheel.update_transform(chassis);
            }
        }
    }

    /// Casts the wheel rays and applies suspension and friction impulses to the chassis and the
    /// ground. Runs once per step before the broadphase.
    pub(crate) fn update(&mut self, bodies: &mut BodyArena, dt: f32) {
        let Some(chassis_handle) = bodies.handle_of(self.chassis) else {
            tracing::trace!(chassis = ?self.chassis, "vehicle chassis missing");
            return;
        };

        {
            let chassis = bodies.get_body(chassis_handle);
            for wheel in &mut self.wheels {
                wheel.update_transform(chassis);
            }

            let velocity = chassis.linear_velocity;
            let forward = chassis.vector_to_world_frame(self.axes.forward_unit());
            self.current_speed_km_hour = 3.6 * velocity.length();
            if forward.dot(velocity) < 0.0 {
                self.current_speed_km_hour = -self.current_speed_km_hour;
            }

            let ray_options = RayOptions {
                skip_backfaces: true,
                exclude: Some(chassis_handle),
                ..Default::default()
            };
            for wheel in &mut self.wheels {
                wheel.cast_ray(chassis, bodies.as_slice(), &ray_options);
            }
        }

        let chassis = bodies.get_body_mut(chassis_handle);
        let chassis_mass = chassis.mass();
        for wheel in &mut self.wheels {
            wheel.update_suspension(chassis_mass);
            if wheel.in_contact {
                let force = wheel.suspension_force.min(wheel.options.max_suspension_force);
                let impulse = wheel.raycast.contact_normal * (force * dt);
                let relative = wheel.raycast.contact_point - chassis.position;
                chassis.apply_impulse(impulse, relative);
            }
        }

        self.update_friction(bodies, chassis_handle, dt);

        let chassis = bodies.get_body(chassis_handle);
        let chassis_forward = chassis.vector_to_world_frame(self.axes.forward_unit());
        for wheel in &mut self.wheels {
            let velocity = chassis.velocity_at_world_point(wheel.raycast.hard_point);
            if wheel.in_contact {
                let normal = wheel.raycast.contact_normal;
                let forward = chassis_forward - normal * chassis_forward.dot(normal);
                wheel.delta_rotation = forward.dot(velocity) * dt / wheel.options.radius;
            }
            if (wheel.sliding || !wheel.in_contact)
                && wheel.engine_force != 0.0
                && wheel.options.use_custom_sliding_rotational_speed
            {
                wheel.delta_rotation = wheel.engine_force.signum()
                    * wheel.options.custom_sliding_rotational_speed
                    * dt;
            }
            // locked wheels do not spin
            if wheel.brake.abs() > wheel.engine_force.abs() {
                wheel.delta_rotation = 0.0;
            }
            wheel.rotation += wheel.delta_rotation;
            wheel.delta_rotation *= ROTATION_DECAY;
        }
    }

    fn update_friction(&mut self, bodies: &mut BodyArena, chassis_handle: BodyHandle, dt: f32) {
        for wheel in &mut self.wheels {
            wheel.side_impulse = 0.0;
            wheel.forward_impulse = 0.0;
            wheel.skid_info = 1.0;
            wheel.sliding = false;
            let Some(ground) = wheel.raycast.ground.filter(|_| wheel.in_contact) else {
                continue;
            };
            let chassis = bodies.get_body(chassis_handle);
            let ground_body = bodies.get_body(ground);

            let normal = wheel.raycast.contact_normal;
            let mut axle = wheel.raycast.axle;
            axle -= normal * axle.dot(normal);
            let Some(axle) = axle.try_normalize() else {
                continue;
            };
            let forward = normal.cross(axle).normalize_or_zero();
            wheel.raycast.axle = axle;
            wheel.raycast.forward = forward;

            let point = wheel.raycast.contact_point;
            wheel.side_impulse = resolve_single_bilateral(chassis, point, ground_body, point, axle);

            let rolling = if wheel.engine_force != 0.0 {
                wheel.engine_force * dt
            } else {
                rolling_friction(chassis, ground_body, point, forward, wheel.brake.abs())
            };

            let max_impulse = wheel.suspension_force * dt * wheel.options.friction_slip;
            let (forward_impulse, side_impulse, skid, sliding) = clamp_to_friction_circle(
                rolling,
                wheel.side_impulse,
                max_impulse,
                wheel.options.forward_acceleration,
                wheel.options.side_acceleration,
            );
            wheel.forward_impulse = forward_impulse;
            wheel.side_impulse = side_impulse;
            wheel.skid_info = skid;
            wheel.sliding = sliding;
        }
        self.sliding = self.wheels.iter().any(|w| w.sliding);

        let up = self.axes.up_unit();
        for wheel in &self.wheels {
            let Some(ground) = wheel.raycast.ground.filter(|_| wheel.in_contact) else {
                continue;
            };
            let (chassis, ground_body) = bodies.get_body_pair_mut(chassis_handle, ground);
            let point = wheel.raycast.contact_point;
            let relative = point - chassis.position;

            if wheel.forward_impulse != 0.0 {
                chassis.apply_impulse(wheel.raycast.forward * wheel.forward_impulse, relative);
            }
            if wheel.side_impulse != 0.0 {
                let side = wheel.raycast.axle * wheel.side_impulse;

                // lower the application point towards the centre of mass to reduce roll
                let mut local = chassis.vector_to_local_frame(relative);
                local -= up * (local.dot(up) * (1.0 - wheel.options.roll_influence));
                let rolled = chassis.vector_to_world_frame(local);
                chassis.apply_impulse(side, rolled);

                let ground_relative = point - ground_body.position;
                ground_body.apply_impulse(-side, ground_relative);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Shape;

    #[test]
    fn test_friction_circle_scales_proportionally() {
        // braking hard while turning sharply
        let (forward, side) = (-12.0, 9.0);
        let (f, s, factor, sliding) = clamp_to_friction_circle(forward, side, 4.0, 1.0, 1.0);
        assert!(sliding);
        assert!(factor < 1.0);
        assert!((f / forward - s / side).abs() < 1e-6);
        let x = f * 0.5;
        assert!(((x * x + s * s).sqrt() - 4.0).abs() < 1e-4);

        let (f, s, factor, sliding) = clamp_to_friction_circle(1.0, 1.0, 4.0, 1.0, 1.0);
        assert!(!sliding);
        assert_eq!((f, s, factor), (1.0, 1.0, 1.0));
    }

    fn car() -> (BodyArena, RaycastVehicle) {
        let mut bodies = BodyArena::new();
        bodies.add(Body::new(0.0).with_shape(Shape::make_plane()));
        let chassis = bodies.add(
            Body::new(150.0)
                .with_shape(Shape::make_box(Vec3::new(1.0, 0.5, 2.0)))
                .with_position(Vec3::new(0.0, 0.65, 0.0)),
        );
        let mut vehicle = RaycastVehicle::new(bodies.get_body(chassis).id(), VehicleAxes::default());
        for (x, z) in [(1.0, 1.5), (-1.0, 1.5), (1.0, -1.5), (-1.0, -1.5)] {
            vehicle.add_wheel(WheelOptions {
                chassis_connection_point: Vec3::new(x, 0.0, z),
                radius: 0.4,
                suspension_rest_length: 0.3,
                suspension_stiffness: 30.0,
                max_suspension_travel: 0.3,
                ..Default::default()
            });
        }
        (bodies, vehicle)
    }

    #[test]
    fn test_compressed_suspension_pushes_up() {
        let (mut bodies, mut vehicle) = car();
        vehicle.update(&mut bodies, 1.0 / 60.0);
        for wheel in vehicle.wheels() {
            assert!(wheel.in_contact);
            assert!((wheel.suspension_length - 0.25).abs() < 1e-4);
            assert!(wheel.suspension_force > 0.0);
            assert_eq!(wheel.raycast.ground, Some(BodyHandle(0)));
        }
        let chassis = bodies.get_body(BodyHandle(1));
        assert!(chassis.linear_velocity.y > 0.0);
        // four symmetric wheels do not tip the chassis
        assert!(chassis.angular_velocity.length() < 1e-4);
    }

    #[test]
    fn test_controls_and_speed() {
        let (mut bodies, mut vehicle) = car();
        assert!(vehicle.apply_engine_force(100.0, 2));
        assert!(vehicle.set_steering_value(0.3, 0));
        assert!(vehicle.set_brake(1.0, 1));
        assert!(!vehicle.set_brake(1.0, 4));

        bodies.get_body_mut(BodyHandle(1)).linear_velocity = Vec3::new(0.0, 0.0, -10.0);
        vehicle.update(&mut bodies, 1.0 / 60.0);
        assert!(vehicle.current_speed_km_hour() < -35.0);
        // the steered wheel turns about the up axis
        let (_, orientation) = vehicle.wheel_transform(0).unwrap();
        let forward = orientation * Vec3::Z;
        assert!(forward.x > 0.2);
        assert!(vehicle.wheel_transform(4).is_none());
    }

    #[test]
    fn test_airborne_wheels() {
        let (mut bodies, mut vehicle) = car();
        bodies.get_body_mut(BodyHandle(1)).set_position(Vec3::new(0.0, 5.0, 0.0));
        vehicle.update(&mut bodies, 1.0 / 60.0);
        for wheel in vehicle.wheels() {
            assert!(!wheel.in_contact);
            assert_eq!(wheel.suspension_force, 0.0);
            assert_eq!(wheel.suspension_length, 0.3);
        }
        assert_eq!(bodies.get_body(BodyHandle(1)).linear_velocity, Vec3::ZERO);
    }
}
