mod config;
mod telemetry;

use anyhow::{Context, Result};
use config::{CarConfig, DemoConfig};
use glam::{Quat, Vec3};
use physics::{
    material::{ContactMaterial, Material, MaterialId},
    shapes::{load_convex_shape, Shape, ShapeConvex},
    vehicle::{RaycastVehicle, VehicleAxes, WheelOptions},
    world::VehicleHandle,
    Body, BodyHandle, World,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::{path::PathBuf, sync::Arc};
use telemetry::Telemetry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const GROUND_MATERIAL: u32 = 1;
const CRATE_MATERIAL: u32 = 2;

/// Chassis tilt past which the car is put back on its wheels.
const FLIPPED_UP_DOT: f32 = 0.1;

struct Scene {
    world: World,
    vehicle: VehicleHandle,
    chassis: BodyHandle,
    spawn_position: Vec3,
}

impl Scene {
    fn build(config: &DemoConfig) -> Result<Self> {
        let mut world = World::new(config.world.clone());
        let ground = Material::new(GROUND_MATERIAL, 0.5, 0.1);
        let crate_material = Material::new(CRATE_MATERIAL, 0.4, 0.2);
        world.add_contact_material(
            MaterialId(GROUND_MATERIAL),
            MaterialId(CRATE_MATERIAL),
            ContactMaterial {
                friction: 0.6,
                restitution: 0.05,
                ..Default::default()
            },
        );

        world.add_body(
            Body::new(0.0)
                .with_shape(Shape::make_plane())
                .with_material(ground),
        );

        let (vehicle, chassis) = add_car(&mut world, &config.car);

        let hull = match &config.hull_path {
            Some(path) => Some(Arc::new(
                load_convex_shape(path)
                    .with_context(|| format!("loading hull {}", path.display()))?,
            )),
            None => None,
        };

        let mut rng = Pcg32::seed_from_u64(config.seed);
        let spread = config.crate_spread.max(1.0);
        for i in 0..config.crates {
            let shape = match i % 4 {
                0 => Shape::make_box(Vec3::splat(rng.gen_range(0.3..0.8))),
                1 => Shape::make_sphere(rng.gen_range(0.3..0.7)),
                2 => Shape::make_cylinder(0.4, 0.4, 1.0, 10),
                _ => match &hull {
                    Some(hull) => Shape::make_convex(hull.clone()),
                    None => Shape::make_convex(Arc::new(random_rock(&mut rng)?)),
                },
            };
            // keep the car's lane clear
            let mut x = rng.gen_range(-spread..spread);
            if x.abs() < 3.0 {
                x += 6.0_f32.copysign(x);
            }
            let position = Vec3::new(x, rng.gen_range(1.0..4.0), rng.gen_range(0.0..spread * 2.0));
            let orientation = Quat::from_euler(
                glam::EulerRot::XYZ,
                rng.gen_range(0.0..std::f32::consts::TAU),
                rng.gen_range(0.0..std::f32::consts::TAU),
                0.0,
            );
            world.add_body(
                Body::new(rng.gen_range(5.0..20.0))
                    .with_shape(shape)
                    .with_position(config.car.spawn_position + position)
                    .with_orientation(orientation)
                    .with_material(crate_material),
            );
        }

        tracing::info!(
            bodies = world.bodies().len(),
            crates = config.crates,
            seed = config.seed,
            "scene built"
        );

        Ok(Scene {
            world,
            vehicle,
            chassis,
            spawn_position: config.car.spawn_position,
        })
    }

    /// Puts the car back at the spawn point if it has rolled over.
    fn reset_if_flipped(&mut self) {
        let Some(chassis) = self.world.body_mut(self.chassis) else {
            return;
        };
        let up = chassis.vector_to_world_frame(Vec3::Y);
        if up.y > FLIPPED_UP_DOT {
            return;
        }
        tracing::info!(position = ?chassis.position, "car flipped, resetting");
        chassis.set_position(self.spawn_position);
        chassis.set_orientation(Quat::IDENTITY);
        chassis.linear_velocity = Vec3::ZERO;
        chassis.angular_velocity = Vec3::ZERO;
        chassis.wake_up();
    }
}

fn add_car(world: &mut World, car: &CarConfig) -> (VehicleHandle, BodyHandle) {
    let mut chassis = Body::new(car.chassis_mass)
        .with_shape(Shape::make_box(car.chassis_half_extents))
        .with_position(car.spawn_position);
    chassis.allow_sleep = false;
    let chassis = world.add_body(chassis);

    let chassis_id = world.body(chassis).map(|b| b.id()).unwrap_or_default();
    let mut vehicle = RaycastVehicle::new(chassis_id, VehicleAxes::default());
    for &position in &car.wheel_positions {
        vehicle.add_wheel(WheelOptions {
            chassis_connection_point: position,
            is_front_wheel: position.z > 0.0,
            ..car.wheel.clone()
        });
    }
    (world.add_vehicle(vehicle), chassis)
}

/// A random lump of rock, the hull of a jittered point cloud.
fn random_rock(rng: &mut Pcg32) -> Result<ShapeConvex> {
    let points: Vec<Vec3> = (0..16)
        .map(|_| {
            let dir = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
            .try_normalize()
            .unwrap_or(Vec3::Y);
            dir * rng.gen_range(0.4..0.7)
        })
        .collect();
    Ok(ShapeConvex::from_points(&points)?)
}

/// Scripted inputs: full throttle while weaving, then a hard stop.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Controls {
    throttle: f32,
    steering: f32,
    brake: f32,
}

fn scripted_controls(time: f32, duration: f32) -> Controls {
    if time < duration * 0.75 {
        Controls {
            throttle: 1.0,
            steering: (time * 0.5).sin(),
            brake: 0.0,
        }
    } else {
        Controls {
            throttle: 0.0,
            steering: 0.0,
            brake: 1.0,
        }
    }
}

fn apply_controls(vehicle: &mut RaycastVehicle, car: &CarConfig, controls: Controls) {
    for wheel in 0..vehicle.num_wheels() {
        let is_front = vehicle.wheel(wheel).is_some_and(|w| w.options.is_front_wheel);
        if is_front {
            vehicle.set_steering_value(controls.steering * car.max_steering, wheel);
        } else {
            vehicle.apply_engine_force(controls.throttle * car.engine_force, wheel);
        }
        vehicle.set_brake(controls.brake * car.brake_force, wheel);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => DemoConfig::load(&path)?,
        None => DemoConfig::default(),
    };

    let mut scene = Scene::build(&config)?;
    let mut telemetry = Telemetry::new(1.0);
    let duration = config.frames as f32 * config.frame_time;

    for _ in 0..config.frames {
        let controls = scripted_controls(scene.world.time(), duration);
        if let Some(vehicle) = scene.world.vehicle_mut(scene.vehicle) {
            apply_controls(vehicle, &config.car, controls);
        }

        scene.world.step_with_accumulator(
            config.fixed_time_step,
            config.frame_time,
            config.max_substeps,
        );
        telemetry.observe(scene.world.events());
        scene.world.drain_events();

        telemetry.report(&scene.world, scene.vehicle);
        scene.reset_if_flipped();
    }

    let chassis = scene
        .world
        .body(scene.chassis)
        .context("chassis was removed")?;
    tracing::info!(
        time = scene.world.time(),
        steps = scene.world.step_number(),
        distance = (chassis.position - scene.spawn_position).length(),
        "run complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_controls() {
        let drive = scripted_controls(1.0, 10.0);
        assert_eq!(drive.throttle, 1.0);
        assert_eq!(drive.brake, 0.0);
        let stop = scripted_controls(9.0, 10.0);
        assert_eq!(stop.throttle, 0.0);
        assert_eq!(stop.brake, 1.0);
    }

    #[test]
    fn test_scene_runs() {
        let config = DemoConfig {
            crates: 8,
            ..Default::default()
        };
        let mut scene = Scene::build(&config).unwrap();
        assert_eq!(scene.world.bodies().len(), 10);
        assert_eq!(scene.world.vehicle(scene.vehicle).unwrap().num_wheels(), 4);

        for _ in 0..120 {
            scene.world.step(config.fixed_time_step);
            scene.reset_if_flipped();
        }
        let chassis = scene.world.body(scene.chassis).unwrap();
        assert!(chassis.position.is_finite());
        assert!(chassis.position.y > 0.0);
    }

    #[test]
    fn test_controls_reach_wheels() {
        let config = DemoConfig {
            crates: 0,
            ..Default::default()
        };
        let mut scene = Scene::build(&config).unwrap();
        let vehicle = scene.world.vehicle_mut(scene.vehicle).unwrap();
        apply_controls(vehicle, &config.car, scripted_controls(0.0, 10.0));
        let vehicle = scene.world.vehicle(scene.vehicle).unwrap();
        for wheel in vehicle.wheels() {
            if wheel.options.is_front_wheel {
                assert_eq!(wheel.engine_force, 0.0);
            } else {
                assert_eq!(wheel.engine_force, config.car.engine_force);
            }
        }
    }
}
