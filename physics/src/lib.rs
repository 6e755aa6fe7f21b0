pub mod body;
pub mod bounds;
pub mod broadphase;
pub mod constraints;
pub mod convex;
pub mod equations;
pub mod events;
pub mod material;
pub mod math;
pub mod narrowphase;
pub mod ray;
pub mod shapes;
pub mod solver;
pub mod time_accumulator;
pub mod vehicle;
pub mod world;

pub use body::{Body, BodyHandle, BodyId, BodyType, SleepState};
pub use events::WorldEvent;
pub use world::{World, WorldConfig};
