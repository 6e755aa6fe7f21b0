use physics::{world::VehicleHandle, World, WorldEvent};

/// Event counts gathered between two reports.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EventTally {
    pub contacts_begun: u32,
    pub contacts_ended: u32,
    pub collisions: u32,
    pub max_impact_velocity: f32,
    pub sleeps: u32,
    pub wake_ups: u32,
}

impl EventTally {
    pub fn observe(&mut self, event: &WorldEvent) {
        match *event {
            WorldEvent::BeginContact { .. } => self.contacts_begun += 1,
            WorldEvent::EndContact { .. } => self.contacts_ended += 1,
            WorldEvent::Collide {
                impact_velocity, ..
            } => {
                self.collisions += 1;
                self.max_impact_velocity = self.max_impact_velocity.max(impact_velocity);
            }
            WorldEvent::Sleep { .. } => self.sleeps += 1,
            WorldEvent::WakeUp { .. } => self.wake_ups += 1,
            _ => {}
        }
    }
}

/// Logs one summary line per `interval` seconds of simulated time.
#[derive(Debug)]
pub struct Telemetry {
    interval: f32,
    next_report: f32,
    tally: EventTally,
    reports: u32,
}

impl Telemetry {
    pub fn new(interval: f32) -> Self {
        Telemetry {
            interval,
            next_report: interval,
            tally: EventTally::default(),
            reports: 0,
        }
    }

    pub fn observe<'a>(&mut self, events: impl IntoIterator<Item = &'a WorldEvent>) {
        for event in events {
            self.tally.observe(event);
        }
    }

    pub fn tally(&self) -> &EventTally {
        &self.tally
    }

    pub fn reports(&self) -> u32 {
        self.reports
    }

    /// Logs a line if the world clock passed the next report time. Returns true if it did.
    pub fn report(&mut self, world: &World, vehicle: VehicleHandle) -> bool {
        let time = world.time();
        if time < self.next_report {
            return false;
        }
        while self.next_report <= time {
            self.next_report += self.interval;
        }

        let stats = world.last_step_stats();
        let sleeping = world.bodies().iter().filter(|b| b.is_sleeping()).count();
        let (speed, sliding, chassis) = match world.vehicle(vehicle) {
            Some(vehicle) => (
                vehicle.current_speed_km_hour(),
                vehicle.is_sliding(),
                world
                    .handle_of(vehicle.chassis())
                    .and_then(|handle| world.body(handle))
                    .map(|body| body.interpolated_position),
            ),
            None => (0.0, false, None),
        };

        tracing::info!(
            time,
            step = world.step_number(),
            speed_kmh = speed,
            sliding,
            chassis = ?chassis,
            pairs = stats.pairs,
            contacts = stats.contacts,
            equations = stats.equations,
            sleeping,
            collisions = self.tally.collisions,
            max_impact = self.tally.max_impact_velocity,
            wake_ups = self.tally.wake_ups,
            "telemetry"
        );

        self.tally = EventTally::default();
        self.reports += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physics::BodyId;

    #[test]
    fn test_tally() {
        let (a, b) = (BodyId(0), BodyId(1));
        let mut tally = EventTally::default();
        for event in [
            WorldEvent::BeginContact { body_a: a, body_b: b },
            WorldEvent::Collide {
                body_a: a,
                body_b: b,
                impact_velocity: 3.0,
            },
            WorldEvent::Collide {
                body_a: a,
                body_b: b,
                impact_velocity: 1.0,
            },
            WorldEvent::PostStep,
            WorldEvent::Sleep { body: a },
        ] {
            tally.observe(&event);
        }
        assert_eq!(tally.contacts_begun, 1);
        assert_eq!(tally.collisions, 2);
        assert_eq!(tally.max_impact_velocity, 3.0);
        assert_eq!(tally.sleeps, 1);
        assert_eq!(tally.wake_ups, 0);
    }

    #[test]
    fn test_reports_once_per_interval() {
        let mut world = World::default();
        let mut telemetry = Telemetry::new(0.5);
        let missing = VehicleHandle(7);
        let mut reported = 0;
        for _ in 0..61 {
            world.step(1.0 / 60.0);
            if telemetry.report(&world, missing) {
                reported += 1;
            }
        }
        assert_eq!(reported, 2);
        assert_eq!(telemetry.reports(), 2);
    }
}
