use glam::{Quat, Vec3};
use racer_physics::{
    body::{Body, BodyHandle, SleepState},
    broadphase::BroadphaseKind,
    material::ContactMaterial,
    shapes::Shape,
    vehicle::{RaycastVehicle, VehicleAxes, WheelOptions},
    world::VehicleHandle,
    World, WorldConfig, WorldEvent,
};
use rand::{Rng, SeedableRng};

const DT: f32 = 1.0 / 60.0;
const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

fn ground_and_ball(restitution: f32) -> (World, BodyHandle) {
    let mut world = World::new(WorldConfig {
        gravity: GRAVITY,
        default_contact_material: ContactMaterial {
            restitution,
            ..Default::default()
        },
        ..Default::default()
    });
    world.add_body(Body::new(0.0).with_shape(Shape::make_plane()));
    let ball = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::make_sphere(1.0))
            .with_position(Vec3::new(0.0, 5.0, 0.0)),
    );
    (world, ball)
}

/// Steps until the ball first touches the ground. Returns the elapsed time and the downward
/// speed just before the contact step.
fn fall_until_contact(world: &mut World, ball: BodyHandle) -> (f32, f32) {
    for _ in 0..600 {
        let time = world.time();
        let speed = -world.body(ball).unwrap().linear_velocity.y;
        world.step(DT);
        let collided = world
            .drain_events()
            .any(|e| matches!(e, WorldEvent::Collide { .. }));
        if collided {
            return (time, speed);
        }
    }
    panic!("ball never reached the ground");
}

#[test]
fn test_free_fall_onto_plane() {
    let (mut world, ball) = ground_and_ball(0.3);
    let (time, speed) = fall_until_contact(&mut world, ball);

    let expected_time = (2.0 * 4.0 / 9.81_f32).sqrt();
    assert!((time - expected_time).abs() < 0.05 * expected_time, "{}", time);
    assert!((speed - 9.81 * time).abs() < 0.05 * 9.81 * time, "{}", speed);
    assert!((speed - 9.81 * expected_time).abs() < 0.05 * 9.81 * expected_time);
}

#[test]
fn test_restitution_rebound() {
    let (mut world, ball) = ground_and_ball(0.5);
    let (_, impact_speed) = fall_until_contact(&mut world, ball);
    let rebound = world.body(ball).unwrap().linear_velocity.y;
    let expected = 0.5 * impact_speed;
    assert!((rebound - expected).abs() < 0.15 * expected, "{} {}", rebound, expected);
}

#[test]
fn test_no_restitution_comes_to_rest() {
    let (mut world, ball) = ground_and_ball(0.0);
    fall_until_contact(&mut world, ball);
    for _ in 0..120 {
        world.step(DT);
        // never bounces back above its resting height
        assert!(world.body(ball).unwrap().position.y < 1.01);
    }
    let body = world.body(ball).unwrap();
    assert!((body.position.y - 1.0).abs() < 0.01);
    assert!(body.linear_velocity.length() < 1e-2);
}

#[test]
fn test_overlapping_boxes_pushed_apart_equally() {
    let mut world = World::default();
    let a = world.add_body(Body::new(1.0).with_shape(Shape::make_box(Vec3::ONE)));
    let b = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::make_box(Vec3::ONE))
            .with_position(Vec3::new(1.9, 0.0, 0.0)),
    );
    world.step(DT);

    assert_eq!(world.last_step_stats().contacts, 4);
    let va = world.body(a).unwrap().linear_velocity;
    let vb = world.body(b).unwrap().linear_velocity;
    assert!(va.x < 0.0 && vb.x > 0.0);
    assert!((va.x + vb.x).abs() < 1e-5);
}

#[test]
fn test_overlap_resolves() {
    let mut world = World::new(WorldConfig {
        broadphase: BroadphaseKind::Naive,
        ..Default::default()
    });
    let a = world.add_body(Body::new(2.0).with_shape(Shape::make_box(Vec3::ONE)));
    let b = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::make_box(Vec3::ONE))
            .with_position(Vec3::new(0.0, 1.8, 0.0)),
    );
    for _ in 0..60 {
        world.step(DT);
    }
    let gap = world.body(b).unwrap().position.y - world.body(a).unwrap().position.y;
    assert!(gap > 2.0 - 1e-3, "{}", gap);
}

#[test]
fn test_momentum_conserved_without_contacts() {
    let mut rng = rand_pcg::Pcg32::seed_from_u64(11);
    let mut world = World::default();
    for i in 0..16 {
        let shape = if i % 2 == 0 {
            Shape::make_sphere(rng.gen_range(0.2..1.0))
        } else {
            Shape::make_box(Vec3::splat(rng.gen_range(0.2..0.7)))
        };
        let mut body = Body::new(rng.gen_range(0.5..4.0))
            .with_shape(shape)
            .with_position(Vec3::new((i % 4) as f32 * 10.0, 0.0, (i / 4) as f32 * 10.0))
            .with_velocity(Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ));
        body.angular_velocity = Vec3::new(
            rng.gen_range(-2.0..2.0),
            rng.gen_range(-2.0..2.0),
            rng.gen_range(-2.0..2.0),
        );
        body.linear_damping = 0.0;
        body.angular_damping = 0.0;
        world.add_body(body);
    }

    let momentum = |world: &World| -> (Vec3, Vec3) {
        world.bodies().iter().fold((Vec3::ZERO, Vec3::ZERO), |(p, l), body| {
            let linear = body.linear_velocity * body.mass();
            // spheres and cubes have isotropic inertia
            let spin = body.inertia() * body.angular_velocity;
            (p + linear, l + body.position.cross(linear) + spin)
        })
    };

    let (p0, l0) = momentum(&world);
    for _ in 0..60 {
        world.step(DT);
    }
    assert_eq!(world.last_step_stats().contacts, 0);
    let (p1, l1) = momentum(&world);
    assert!(p1.abs_diff_eq(p0, 1e-4), "{} {}", p0, p1);
    assert!(l1.abs_diff_eq(l0, 1e-2), "{} {}", l0, l1);
}

#[test]
fn test_sleep_and_wake_by_contact() {
    let mut world = World::new(WorldConfig {
        allow_sleep: true,
        broadphase: BroadphaseKind::Naive,
        ..Default::default()
    });
    let sleeper = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::make_sphere(1.0))
            .with_velocity(Vec3::new(0.05, 0.0, 0.0)),
    );
    let striker = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::make_sphere(1.0))
            .with_position(Vec3::new(3.0, 0.0, 0.0)),
    );
    let sleeper_id = world.body(sleeper).unwrap().id();

    for _ in 0..90 {
        world.step(DT);
    }
    let events: Vec<_> = world.drain_events().collect();
    assert!(events.contains(&WorldEvent::Sleepy { body: sleeper_id }));
    assert!(events.contains(&WorldEvent::Sleep { body: sleeper_id }));
    let body = world.body(sleeper).unwrap();
    assert_eq!(body.sleep_state(), SleepState::Sleeping);
    assert_eq!(body.linear_velocity, Vec3::ZERO);

    {
        let striker = world.body_mut(striker).unwrap();
        striker.wake_up();
        striker.linear_velocity = Vec3::new(-5.0, 0.0, 0.0);
    }
    let mut woke = false;
    for _ in 0..30 {
        world.step(DT);
        if world
            .drain_events()
            .any(|e| e == WorldEvent::WakeUp { body: sleeper_id })
        {
            woke = true;
            break;
        }
    }
    assert!(woke);
    let body = world.body(sleeper).unwrap();
    assert_eq!(body.sleep_state(), SleepState::Awake);
    assert!(body.linear_velocity.x < 0.0);
}

#[test]
fn test_contact_events_begin_and_end() {
    let mut world = World::default();
    let a = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::make_sphere(1.0))
            .with_velocity(Vec3::new(1.0, 0.0, 0.0)),
    );
    let b = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::make_sphere(1.0))
            .with_position(Vec3::new(2.05, 0.0, 0.0))
            .with_velocity(Vec3::new(-1.0, 0.0, 0.0)),
    );
    let (ida, idb) = (world.body(a).unwrap().id(), world.body(b).unwrap().id());

    let mut events = Vec::new();
    for _ in 0..60 {
        world.step(DT);
        events.extend(world.drain_events());
    }
    let begin = events
        .iter()
        .position(|e| *e == WorldEvent::BeginContact { body_a: ida, body_b: idb });
    let end = events
        .iter()
        .position(|e| *e == WorldEvent::EndContact { body_a: ida, body_b: idb });
    assert!(begin.is_some());
    assert!(end.is_some());
    assert!(begin < end);
    assert!(events.contains(&WorldEvent::BeginShapeContact {
        body_a: ida,
        shape_a: 0,
        body_b: idb,
        shape_b: 0
    }));
}

#[test]
fn test_vehicle_accelerates_forward() {
    let mut world = World::new(WorldConfig {
        gravity: GRAVITY,
        ..Default::default()
    });
    world.add_body(Body::new(0.0).with_shape(Shape::make_plane()));
    let chassis = world.add_body(
        Body::new(150.0)
            .with_shape(Shape::make_box(Vec3::new(1.0, 0.5, 2.0)))
            .with_position(Vec3::new(0.0, 0.65, 0.0))
            .with_orientation(Quat::IDENTITY),
    );
    let mut vehicle = RaycastVehicle::new(world.body(chassis).unwrap().id(), VehicleAxes::default());
    for (x, z) in [(1.0, 1.5), (-1.0, 1.5), (1.0, -1.5), (-1.0, -1.5)] {
        vehicle.add_wheel(WheelOptions {
            chassis_connection_point: Vec3::new(x, 0.0, z),
            radius: 0.4,
            suspension_rest_length: 0.3,
            suspension_stiffness: 30.0,
            damping_compression: 4.4,
            damping_relaxation: 2.3,
            friction_slip: 5.0,
            max_suspension_travel: 0.3,
            is_front_wheel: z > 0.0,
            ..Default::default()
        });
    }
    let handle = world.add_vehicle(vehicle);

    for _ in 0..60 {
        world.step(DT);
    }
    let settled = world.body(chassis).unwrap();
    assert!(settled.position.y > 0.5 && settled.position.y < 0.7);
    assert!(settled.linear_velocity.z.abs() < 1e-3);

    let vehicle = world.vehicle_mut(handle).unwrap();
    assert!(vehicle.wheels().iter().all(|w| w.in_contact));
    vehicle.apply_engine_force(300.0, 2);
    vehicle.apply_engine_force(300.0, 3);

    let mut last = world.body(chassis).unwrap().linear_velocity.z;
    for _ in 0..120 {
        world.step(DT);
        let speed = world.body(chassis).unwrap().linear_velocity.z;
        assert!(speed >= last - 1e-3, "{} < {}", speed, last);
        last = speed;
    }
    assert!(last > 1.0);
    assert!(world.vehicle(handle).unwrap().current_speed_km_hour() > 3.6);

    let bodies = world.bodies().len();
    assert!(world.remove_vehicle(handle).is_some());
    assert!(world.vehicle(handle).is_none());
    assert!(world.body(chassis).is_none());
    assert_eq!(world.bodies().len(), bodies - 1);
}

fn add_car(world: &mut World, position: Vec3) -> (BodyHandle, VehicleHandle) {
    let chassis = world.add_body(
        Body::new(150.0)
            .with_shape(Shape::make_box(Vec3::new(1.0, 0.5, 2.0)))
            .with_position(position),
    );
    let mut vehicle = RaycastVehicle::new(world.body(chassis).unwrap().id(), VehicleAxes::default());
    for (x, z) in [(1.0, 1.5), (-1.0, 1.5), (1.0, -1.5), (-1.0, -1.5)] {
        vehicle.add_wheel(WheelOptions {
            chassis_connection_point: Vec3::new(x, 0.0, z),
            radius: 0.4,
            suspension_rest_length: 0.3,
            is_front_wheel: z > 0.0,
            ..Default::default()
        });
    }
    (chassis, world.add_vehicle(vehicle))
}

#[test]
fn test_remove_vehicle_removes_chassis() {
    let mut world = World::default();
    world.add_body(Body::new(0.0).with_shape(Shape::make_plane()));
    let (chassis, handle) = add_car(&mut world, Vec3::new(0.0, 1.0, 0.0));
    let chassis_id = world.body(chassis).unwrap().id();
    world.step(DT);
    assert_eq!(world.bodies().len(), 2);

    let vehicle = world.remove_vehicle(handle).unwrap();
    assert_eq!(vehicle.chassis(), chassis_id);
    assert!(world.vehicle(handle).is_none());
    assert_eq!(world.bodies().len(), 1);
    assert!(world.body(chassis).is_none());
    assert!(world.handle_of(chassis_id).is_none());
    assert!(world.remove_vehicle(handle).is_none());

    // the world keeps stepping without the vehicle
    world.step(DT);
    assert_eq!(world.bodies().len(), 1);
}

#[test]
fn test_wheel_transforms_follow_integrated_chassis() {
    let mut world = World::new(WorldConfig {
        gravity: GRAVITY,
        ..Default::default()
    });
    let (chassis, handle) = add_car(&mut world, Vec3::new(0.0, 10.0, 0.0));
    world.body_mut(chassis).unwrap().angular_velocity = Vec3::new(0.0, 1.0, 0.5);

    for _ in 0..30 {
        world.step(DT);
        let body = world.body(chassis).unwrap();
        let vehicle = world.vehicle(handle).unwrap();
        for (index, wheel) in vehicle.wheels().iter().enumerate() {
            let expected = body.point_to_world_frame(wheel.options.chassis_connection_point)
                + body.vector_to_world_frame(wheel.options.direction) * wheel.suspension_length;
            let (position, orientation) = vehicle.wheel_transform(index).unwrap();
            assert!(position.abs_diff_eq(expected, 1e-4), "{} {}", position, expected);
            assert!(orientation.is_normalized());
        }
    }
    assert!(world.vehicle(handle).unwrap().wheels().iter().all(|w| !w.in_contact));
}
